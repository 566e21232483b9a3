//! Command line arguments and the stdin control protocol.

use crate::config::{PlayerConfig, RtmpImpl};
use crate::core::{ContainerError, Result};
use crate::player::{Container, FfmpegContainer};
use clap::Parser;
use serde_json::{json, Value};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "stbplay", version, about = "FFmpeg based media player for set-top boxes")]
pub struct Args {
    /// Media file or URL
    pub url: String,

    /// Second file played alongside the first (separate audio)
    #[arg(short = 'x', long)]
    pub second: Option<String>,

    /// JSON configuration file
    #[arg(long, env = "STBPLAY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Software decode WMA
    #[arg(long)]
    pub wma: bool,
    /// Software decode AAC
    #[arg(long)]
    pub aac: bool,
    /// Software decode AAC LATM
    #[arg(long)]
    pub latm: bool,
    /// Software decode AC3
    #[arg(long)]
    pub ac3: bool,
    /// Software decode E-AC3
    #[arg(long)]
    pub eac3: bool,
    /// Software decode DTS
    #[arg(long)]
    pub dts: bool,
    /// Software decode MP3
    #[arg(long)]
    pub mp3: bool,
    /// Pass raw PCM through without resampling
    #[arg(long)]
    pub no_pcm_resampling: bool,
    /// Downmix software decoded audio to stereo
    #[arg(long)]
    pub stereo: bool,
    /// Insert decoded PCM as LPCM
    #[arg(long)]
    pub lpcm: bool,
    /// Seek transport streams by byte offset
    #[arg(long)]
    pub ts_bytes: bool,
    /// Local file is still growing
    #[arg(long)]
    pub progressive: bool,

    /// RTMP implementation: auto, native or librtmp
    #[arg(long, value_parser = parse_rtmp)]
    pub rtmp: Option<RtmpImpl>,

    /// Program id in multi-program streams
    #[arg(long, allow_negative_numbers = true)]
    pub program: Option<i32>,

    /// Live transport stream
    #[arg(long)]
    pub live: bool,

    /// Restart from the beginning at the end
    #[arg(long = "loop")]
    pub loop_mode: bool,

    /// Minimal stream probing
    #[arg(long)]
    pub noprobe: bool,

    /// Network buffer size in bytes
    #[arg(long)]
    pub buffer_size: Option<usize>,

    /// Write the video elementary stream here
    #[arg(long)]
    pub video_out: Option<PathBuf>,

    /// Write the audio elementary stream here
    #[arg(long)]
    pub audio_out: Option<PathBuf>,

    /// Play PCM injected audio on the sound card
    #[arg(long)]
    pub speaker: bool,

    /// Start the keyboard forwarder and OSD surface
    #[arg(long)]
    pub platform: bool,
}

fn parse_rtmp(s: &str) -> std::result::Result<RtmpImpl, String> {
    match s {
        "auto" => Ok(RtmpImpl::Auto),
        "native" => Ok(RtmpImpl::Native),
        "librtmp" => Ok(RtmpImpl::Librtmp),
        _ => Err(format!("unknown rtmp implementation '{}'", s)),
    }
}

impl Args {
    /// Applies the command line on top of a loaded configuration.
    pub fn apply(&self, cfg: &mut PlayerConfig) {
        let d = &mut cfg.decoder;
        d.wma_software_decode |= self.wma;
        d.aac_software_decode |= self.aac;
        d.aac_latm_software_decode |= self.latm;
        d.ac3_software_decode |= self.ac3;
        d.eac3_software_decode |= self.eac3;
        d.dts_software_decode |= self.dts;
        d.mp3_software_decode |= self.mp3;
        if self.no_pcm_resampling {
            d.pcm_resampling = false;
        }
        d.stereo_software_decoder |= self.stereo;
        d.insert_pcm_as_lpcm |= self.lpcm;
        d.ts_bytes_seeking |= self.ts_bytes;
        d.progressive_playback |= self.progressive;
        if let Some(rtmp) = self.rtmp {
            d.rtmp_impl = rtmp;
        }
        if let Some(program) = self.program {
            d.selected_program_id = program;
        }
        if let Some(size) = self.buffer_size {
            d.buffer_size = size;
        }

        let p = &mut cfg.playback;
        p.ts_live_mode |= self.live;
        p.loop_mode |= self.loop_mode;
        p.noprobe |= self.noprobe;

        let o = &mut cfg.output;
        if self.video_out.is_some() {
            o.video_device = self.video_out.clone();
        }
        if self.audio_out.is_some() {
            o.audio_device = self.audio_out.clone();
        }
        o.pcm_to_speaker |= self.speaker;

        cfg.platform.enable |= self.platform;
    }
}

/// One line of the stdin control protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    Quit,
    Pause,
    Continue,
    SeekRelative(i64),
    SeekAbsolute(i64),
    Length,
    LastPts,
    Info(String),
    Metadata,
    SwitchAudio(i32),
    SwitchSubtitle(i32),
    Tracks,
    BufferSize(usize),
}

impl ControlCommand {
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        let mut chars = line.chars();
        let cmd = chars.next()?;
        let arg = chars.as_str().trim();

        let cmd = match cmd {
            'q' => Self::Quit,
            'p' => Self::Pause,
            'c' => Self::Continue,
            'k' => Self::SeekRelative(arg.parse().ok()?),
            'g' => Self::SeekAbsolute(arg.parse().ok()?),
            'l' => Self::Length,
            'j' => Self::LastPts,
            'i' if !arg.is_empty() => Self::Info(arg.to_string()),
            'm' => Self::Metadata,
            'a' => Self::SwitchAudio(arg.parse().ok()?),
            's' => Self::SwitchSubtitle(arg.parse().ok()?),
            't' => Self::Tracks,
            'b' => Self::BufferSize(arg.parse().ok()?),
            _ => return None,
        };
        Some(cmd)
    }
}

fn reply(key: &str, body: Value, res: &Result<()>) -> Value {
    let mut body = body;
    if let Value::Object(map) = &mut body {
        map.insert(
            "sts".to_string(),
            json!(res.as_ref().err().map_or(0, ContainerError::code)),
        );
    }
    let mut out = serde_json::Map::new();
    out.insert(key.to_string(), body);
    Value::Object(out)
}

/// Runs one command and builds the JSON reply line. `Quit` is left to the
/// caller.
pub fn execute(container: &mut FfmpegContainer, cmd: &ControlCommand) -> Option<Value> {
    let value = match cmd {
        ControlCommand::Quit => return None,
        ControlCommand::Pause => {
            let res = container.pause();
            reply("PLAYBACK_PAUSE", json!({}), &res)
        }
        ControlCommand::Continue => {
            let res = container.resume();
            reply("PLAYBACK_CONTINUE", json!({}), &res)
        }
        ControlCommand::SeekRelative(sec) => {
            let res = container.seek(*sec, false);
            reply("PLAYBACK_SEEK", json!({ "sec": sec, "absolute": false }), &res)
        }
        ControlCommand::SeekAbsolute(sec) => {
            let res = container.seek(*sec, true);
            reply("PLAYBACK_SEEK", json!({ "sec": sec, "absolute": true }), &res)
        }
        ControlCommand::Length => match container.length() {
            Ok(length) => reply("PLAYBACK_LENGTH", json!({ "length": length }), &Ok(())),
            Err(e) => reply("PLAYBACK_LENGTH", json!({ "length": 0 }), &Err(e)),
        },
        ControlCommand::LastPts => match container.last_pts() {
            Ok(pts) => reply("J", json!({ "ms": pts / 90 }), &Ok(())),
            Err(e) => reply("J", json!({ "ms": 0 }), &Err(e)),
        },
        ControlCommand::Info(tag) => match Container::info(container, tag) {
            Ok(value) => reply("PLAYBACK_INFO", json!({ "tag": tag, "value": value }), &Ok(())),
            Err(e) => reply("PLAYBACK_INFO", json!({ "tag": tag }), &Err(e)),
        },
        ControlCommand::Metadata => match container.metadata() {
            Ok(all) => {
                let map: serde_json::Map<String, Value> =
                    all.into_iter().map(|(k, v)| (k, Value::String(v))).collect();
                reply("PLAYBACK_METADATA", Value::Object(map), &Ok(()))
            }
            Err(e) => reply("PLAYBACK_METADATA", json!({}), &Err(e)),
        },
        ControlCommand::SwitchAudio(id) => {
            let res = container.switch_audio(*id);
            reply("A_S", json!({ "id": id }), &res)
        }
        ControlCommand::SwitchSubtitle(id) => {
            let res = container.switch_subtitle(*id);
            reply("S_S", json!({ "id": id }), &res)
        }
        ControlCommand::Tracks => {
            let (video, audio, subtitle) = container.tracks();
            json!({ "v_l": video, "a_l": audio, "s_l": subtitle })
        }
        ControlCommand::BufferSize(size) => {
            container.set_buffer_size(*size);
            reply("PLAYBACK_BUFFER", json!({ "size": container.buffer_size() }), &Ok(()))
        }
    };
    Some(value)
}
