use crate::core::{ContainerError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Which RTMP protocol implementation to ask the engine for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RtmpImpl {
    #[default]
    Auto,
    Native,
    Librtmp,
}

/// 解码相关配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderOptions {
    pub wma_software_decode: bool,
    pub aac_software_decode: bool,
    pub aac_latm_software_decode: bool,
    pub ac3_software_decode: bool,
    pub eac3_software_decode: bool,
    pub dts_software_decode: bool,
    pub mp3_software_decode: bool,
    /// Decode and resample raw PCM instead of passing it through.
    pub pcm_resampling: bool,
    /// Downmix software decoded audio with more than two channels.
    pub stereo_software_decoder: bool,
    pub insert_pcm_as_lpcm: bool,
    pub flv2mpeg4_converter: bool,
    pub rtmp_impl: RtmpImpl,
    /// Program to play in multi-program streams, -1 = pick automatically.
    pub selected_program_id: i32,
    /// Local file may still be growing while it is played.
    pub progressive_playback: bool,
    /// Seek transport streams by byte offset.
    pub ts_bytes_seeking: bool,
    /// Network read buffer in bytes, 0 = engine default.
    pub buffer_size: usize,
    /// Extra options handed to the engine when opening an input.
    pub av_options: BTreeMap<String, String>,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        Self {
            wma_software_decode: false,
            aac_software_decode: false,
            aac_latm_software_decode: false,
            ac3_software_decode: false,
            eac3_software_decode: false,
            dts_software_decode: false,
            mp3_software_decode: false,
            pcm_resampling: true,
            stereo_software_decoder: false,
            insert_pcm_as_lpcm: false,
            flv2mpeg4_converter: false,
            rtmp_impl: RtmpImpl::Auto,
            selected_program_id: -1,
            progressive_playback: false,
            ts_bytes_seeking: false,
            buffer_size: 0,
            av_options: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackOptions {
    /// Live transport stream: drop duplicated packets, restart on EOF.
    pub ts_live_mode: bool,
    pub loop_mode: bool,
    /// Minimal stream probing.
    pub noprobe: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputOptions {
    pub video_device: Option<PathBuf>,
    pub audio_device: Option<PathBuf>,
    /// Play PCM injected audio on the default sound card.
    pub pcm_to_speaker: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformOptions {
    pub enable: bool,
    pub input_dir: PathBuf,
    pub input_fifo: PathBuf,
}

impl Default for PlatformOptions {
    fn default() -> Self {
        Self {
            enable: false,
            input_dir: PathBuf::from("/dev/input"),
            input_fifo: PathBuf::from("/tmp/neutrino.input"),
        }
    }
}

/// 播放器配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub decoder: DecoderOptions,
    pub playback: PlaybackOptions,
    pub output: OutputOptions,
    pub platform: PlatformOptions,
}

impl PlayerConfig {
    /// 从 JSON 文件加载配置
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| ContainerError::InvalidFile(format!("config: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = PlayerConfig::default();
        assert!(cfg.decoder.pcm_resampling);
        assert_eq!(cfg.decoder.selected_program_id, -1);
        assert_eq!(cfg.decoder.rtmp_impl, RtmpImpl::Auto);
        assert_eq!(cfg.platform.input_fifo, PathBuf::from("/tmp/neutrino.input"));
    }

    #[test]
    fn test_partial_json() {
        let cfg = PlayerConfig::from_json(
            r#"{"decoder":{"aac_software_decode":true,"rtmp_impl":"librtmp",
                "av_options":{"user_agent":"stb"}},
                "playback":{"loop_mode":true}}"#,
        )
        .unwrap();
        assert!(cfg.decoder.aac_software_decode);
        assert!(cfg.decoder.pcm_resampling);
        assert_eq!(cfg.decoder.rtmp_impl, RtmpImpl::Librtmp);
        assert_eq!(cfg.decoder.av_options["user_agent"], "stb");
        assert!(cfg.playback.loop_mode);
        assert!(!cfg.playback.ts_live_mode);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stbplay.json");
        std::fs::write(&path, r#"{"output":{"pcm_to_speaker":true}}"#).unwrap();
        let cfg = PlayerConfig::load(&path).unwrap();
        assert!(cfg.output.pcm_to_speaker);

        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            PlayerConfig::load(&path),
            Err(ContainerError::InvalidFile(_))
        ));
    }
}
