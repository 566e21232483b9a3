// 播放器核心模块

pub mod audio_output;
pub mod codec_data;
pub mod container;
pub mod custom_io;
pub mod decoder;
pub mod demuxer;
pub mod demuxer_source; // Demuxer 抽象接口
pub mod demuxer_thread; // 播放线程
pub mod encoding;
pub mod manager;
pub mod output;
pub mod rtmp;

#[cfg(test)]
pub(crate) mod testing;

pub use audio_output::PcmSpeakerSink;
pub use container::{Container, FfmpegContainer, CAPABILITIES};
pub use demuxer::{ffmpeg_init, FfmpegDemuxer, InputInfo};
pub use demuxer_source::{DemuxerSource, MediaPacket};
pub use demuxer_thread::{DemuxCommand, PlaybackState, PlaybackThread};
pub use encoding::TrackEncoding;
pub use manager::{Managers, TrackManager};
pub use output::{AvSink, EsFileSink, JsonSubtitleSink, NullSink, Output, SharedOutput, SubtitleSink};
