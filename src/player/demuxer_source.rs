use crate::core::{Result, Track};
use crate::player::decoder::PcmDecoder;
use crate::player::demuxer::InputInfo;
use ffmpeg_next as ffmpeg;
use ffmpeg::{Packet, Rational};

/// 媒体包（可跨线程传递）
pub struct MediaPacket {
    pub packet: Packet,
    /// Input the packet was read from.
    pub av_idx: usize,
    pub stream_index: usize,
    /// Matches `Track::id`.
    pub stream_id: i32,
    pub time_base: Rational,
}

// 实现 Send，允许跨线程传递
unsafe impl Send for MediaPacket {}

/// Demuxer 数据源抽象接口
///
/// The playback loop only talks to the inputs through this trait, so it can
/// be driven by a scripted source in tests.
pub trait DemuxerSource: Send {
    /// Number of open inputs (1 or 2).
    fn input_count(&self) -> usize;

    /// 读取下一个媒体包
    ///
    /// 返回：
    /// - Ok(Some(packet)): 成功读取一个包
    /// - Ok(None): 到达文件末尾
    /// - Err(e): 读取错误
    fn read_packet(&mut self, av_idx: usize) -> Result<Option<MediaPacket>>;

    /// Time seek (microseconds) anywhere in `min..=max`, aiming at `target`.
    fn seek_window(&mut self, av_idx: usize, min: i64, target: i64, max: i64) -> Result<()>;

    /// Time seek (microseconds) with an unbounded window.
    fn seek_time(&mut self, av_idx: usize, target: i64) -> Result<()> {
        self.seek_window(av_idx, i64::MIN, target, i64::MAX)
    }

    /// Byte seek on the first input.
    fn seek_bytes(&mut self, pos: i64) -> Result<()>;

    /// Byte position of the first input, -1 when unknown.
    fn byte_position(&self) -> i64;

    fn info(&self, av_idx: usize) -> Option<&InputInfo>;

    /// Decoder for a PCM-injected audio track.
    fn open_pcm_decoder(&mut self, track: &Track) -> Result<Box<dyn PcmDecoder>>;

    /// 获取描述信息（用于调试）
    fn description(&self) -> String;
}
