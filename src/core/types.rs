use ffmpeg_next::Rational;
use serde::Serialize;
use std::path::PathBuf;

/// 媒体源类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaSource {
    /// 本地文件路径 (bare path or `file://`)
    LocalFile(PathBuf),

    /// 网络流 URL
    NetworkStream {
        url: String,
        protocol: StreamProtocol,
    },
}

impl MediaSource {
    /// 从 URL 字符串解析媒体源
    pub fn from_url(url: &str) -> Self {
        if let Some(path) = url.strip_prefix("file://") {
            return MediaSource::LocalFile(PathBuf::from(path));
        }
        if !url.contains("://") {
            return MediaSource::LocalFile(PathBuf::from(url));
        }

        let protocol = if url.starts_with("rtmp") || url.starts_with("ffrtmp") {
            StreamProtocol::Rtmp
        } else if url.starts_with("rtsp://") {
            StreamProtocol::Rtsp
        } else if url.starts_with("http://") || url.starts_with("https://") {
            if url.contains(".m3u8") {
                StreamProtocol::Hls
            } else {
                StreamProtocol::Http
            }
        } else {
            StreamProtocol::Other
        };

        MediaSource::NetworkStream {
            url: url.to_string(),
            protocol,
        }
    }

    /// 判断是否走自定义文件 IO
    pub fn is_local(&self) -> bool {
        matches!(self, MediaSource::LocalFile(_))
    }
}

/// 流媒体协议类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamProtocol {
    Rtmp,
    Rtsp,
    Hls,
    Http,
    Other,
}

impl StreamProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamProtocol::Rtmp => "RTMP",
            StreamProtocol::Rtsp => "RTSP",
            StreamProtocol::Hls => "HLS",
            StreamProtocol::Http => "HTTP",
            StreamProtocol::Other => "OTHER",
        }
    }
}

/// Files handed to the container on init. The second one is an optional
/// separate audio input.
#[derive(Debug, Clone, Default)]
pub struct PlayFiles {
    pub first: String,
    pub second: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Video,
    Audio,
    Subtitle,
}

impl TrackKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackKind::Video => "video",
            TrackKind::Audio => "audio",
            TrackKind::Subtitle => "subtitle",
        }
    }
}

/// 轨道信息
#[derive(Debug, Clone)]
pub struct Track {
    pub kind: TrackKind,
    pub name: String,
    pub encoding: crate::player::encoding::TrackEncoding,
    /// Stream id, or the stream index when the container has no ids.
    pub id: i32,
    /// Index of the input this track belongs to.
    pub av_idx: usize,
    pub stream_index: usize,
    pub version: i32,
    pub width: u32,
    pub height: u32,
    pub aspect_ratio_num: i32,
    pub aspect_ratio_den: i32,
    pub extradata: Vec<u8>,
    /// Frames per 1000 seconds.
    pub frame_rate: u32,
    pub time_scale: u32,
    pub duration_ms: i64,
    pub time_base: Rational,
    /// Codec header sent in place of the stream extradata.
    pub aac_header: Option<Vec<u8>>,
    pub inject_as_pcm: bool,
    pub inject_raw_pcm: bool,
}

impl Track {
    pub fn new(kind: TrackKind, encoding: crate::player::encoding::TrackEncoding) -> Self {
        Self {
            kind,
            name: "und".to_string(),
            encoding,
            id: 0,
            av_idx: 0,
            stream_index: 0,
            version: 0,
            width: 0,
            height: 0,
            aspect_ratio_num: 0,
            aspect_ratio_den: 0,
            extradata: Vec::new(),
            frame_rate: 0,
            time_scale: 0,
            duration_ms: 0,
            time_base: Rational::new(1, 90000),
            aac_header: None,
            inject_as_pcm: false,
            inject_raw_pcm: false,
        }
    }
}

/// Parameters describing injected PCM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmPrivateData {
    pub channels: u32,
    pub bits_per_coded_sample: u32,
    pub sample_rate: u32,
    pub bit_rate: i64,
    pub codec_id: ffmpeg_next::codec::Id,
    pub restart_resampling: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Extradata<'a> {
    None,
    Raw(&'a [u8]),
    Pcm(PcmPrivateData),
}

/// One unit pushed to an audio or video sink.
#[derive(Debug, Clone)]
pub struct AvOut<'a> {
    pub kind: TrackKind,
    pub data: &'a [u8],
    pub pts: i64,
    pub dts: i64,
    pub extradata: Extradata<'a>,
    pub frame_rate: u32,
    pub time_scale: u32,
    pub width: u32,
    pub height: u32,
    /// 1 = transport stream container.
    pub info_flags: u32,
}

impl<'a> AvOut<'a> {
    pub fn audio(data: &'a [u8], pts: i64, extradata: Extradata<'a>) -> Self {
        Self {
            kind: TrackKind::Audio,
            data,
            pts,
            dts: crate::core::INVALID_PTS,
            extradata,
            frame_rate: 0,
            time_scale: 0,
            width: 0,
            height: 0,
            info_flags: 0,
        }
    }
}

/// 字幕输出
#[derive(Debug, Clone, PartialEq)]
pub struct SubtitleOut<'a> {
    pub track_id: i32,
    pub data: &'a [u8],
    pub pts: i64,
    pub duration_ms: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_source_from_url() {
        assert_eq!(
            MediaSource::from_url("/media/hdd/movie.mkv"),
            MediaSource::LocalFile(PathBuf::from("/media/hdd/movie.mkv"))
        );
        assert_eq!(
            MediaSource::from_url("file:///tmp/a.ts"),
            MediaSource::LocalFile(PathBuf::from("/tmp/a.ts"))
        );
        assert!(matches!(
            MediaSource::from_url("ffrtmp://host/app"),
            MediaSource::NetworkStream { protocol: StreamProtocol::Rtmp, .. }
        ));
        assert!(matches!(
            MediaSource::from_url("http://host/live/index.m3u8"),
            MediaSource::NetworkStream { protocol: StreamProtocol::Hls, .. }
        ));
        assert!(!MediaSource::from_url("https://host/a.mp4").is_local());
    }
}
