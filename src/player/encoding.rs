//! Mapping of engine codec ids to the encoding tags understood by the
//! output sinks.

use crate::config::DecoderOptions;
use ffmpeg_next::codec::Id;
use ffmpeg_next::media;
use log::{debug, warn};
use serde::Serialize;
use std::fmt;

/// 轨道编码类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackEncoding {
    VideoMpeg1,
    VideoH263,
    VideoFlv,
    VideoVp6,
    VideoVp8,
    VideoVp9,
    VideoRmv,
    VideoMpeg4,
    VideoDivx3,
    VideoWmv,
    VideoVc1,
    VideoH264,
    VideoHevc,
    VideoAvs,
    AudioMpegL3,
    AudioMp3,
    AudioAac,
    AudioAacLatm,
    AudioAc3,
    AudioEac3,
    AudioDts,
    AudioWma,
    AudioWmaPro,
    /// Decoded in software and injected as PCM.
    AudioIpcm,
    AudioLpcm,
    /// Raw PCM passed through untouched.
    AudioPcm,
    SubtitleAss,
    SubtitleUtf8,
    SubtitleSrt,
    SubtitleSubrip,
}

impl TrackEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackEncoding::VideoMpeg1 => "V_MPEG1",
            TrackEncoding::VideoH263 => "V_H263",
            TrackEncoding::VideoFlv => "V_FLV",
            TrackEncoding::VideoVp6 => "V_VP6",
            TrackEncoding::VideoVp8 => "V_VP8",
            TrackEncoding::VideoVp9 => "V_VP9",
            TrackEncoding::VideoRmv => "V_RMV",
            TrackEncoding::VideoMpeg4 => "V_MPEG4",
            TrackEncoding::VideoDivx3 => "V_DIVX3",
            TrackEncoding::VideoWmv => "V_WMV",
            TrackEncoding::VideoVc1 => "V_VC1",
            TrackEncoding::VideoH264 => "V_MPEG4/ISO/AVC",
            TrackEncoding::VideoHevc => "V_HEVC",
            TrackEncoding::VideoAvs => "V_AVS",
            TrackEncoding::AudioMpegL3 => "A_MPEG/L3",
            TrackEncoding::AudioMp3 => "A_MP3",
            TrackEncoding::AudioAac => "A_AAC",
            TrackEncoding::AudioAacLatm => "A_AAC_LATM",
            TrackEncoding::AudioAc3 => "A_AC3",
            TrackEncoding::AudioEac3 => "A_EAC3",
            TrackEncoding::AudioDts => "A_DTS",
            TrackEncoding::AudioWma => "A_WMA",
            TrackEncoding::AudioWmaPro => "A_WMA/PRO",
            TrackEncoding::AudioIpcm => "A_IPCM",
            TrackEncoding::AudioLpcm => "A_LPCM",
            TrackEncoding::AudioPcm => "A_PCM",
            TrackEncoding::SubtitleAss => "S_TEXT/ASS",
            TrackEncoding::SubtitleUtf8 => "S_TEXT/UTF-8",
            TrackEncoding::SubtitleSrt => "S_TEXT/SRT",
            TrackEncoding::SubtitleSubrip => "S_TEXT/SUBRIP",
        }
    }

    /// Audio that goes through the software decoder.
    pub fn is_injected_pcm(&self) -> bool {
        matches!(self, TrackEncoding::AudioIpcm | TrackEncoding::AudioLpcm)
    }
}

impl fmt::Display for TrackEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for TrackEncoding {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str(self.as_str())
    }
}

/// Parsed MPEG-4 AudioSpecificConfig.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mpeg4AudioConfig {
    /// Base audio object type (SBR/PS signalling resolved).
    pub object_type: u32,
    pub sampling_index: u32,
    pub sample_rate: u32,
    pub chan_config: u32,
    /// Set when explicit SBR/PS signalling was present.
    pub ext_object_type: Option<u32>,
}

const SAMPLE_RATES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn read(&mut self, bits: u32) -> Option<u32> {
        let mut v = 0u32;
        for _ in 0..bits {
            let byte = *self.data.get(self.pos / 8)?;
            let bit = (byte >> (7 - (self.pos % 8))) & 1;
            v = (v << 1) | bit as u32;
            self.pos += 1;
        }
        Some(v)
    }

    fn object_type(&mut self) -> Option<u32> {
        let ot = self.read(5)?;
        if ot == 31 {
            Some(32 + self.read(6)?)
        } else {
            Some(ot)
        }
    }

    fn sample_rate(&mut self) -> Option<(u32, u32)> {
        let index = self.read(4)?;
        if index == 0x0f {
            Some((index, self.read(24)?))
        } else {
            Some((index, SAMPLE_RATES.get(index as usize).copied().unwrap_or(0)))
        }
    }
}

const AOT_SBR: u32 = 5;
const AOT_ER_BSAC: u32 = 22;
const AOT_PS: u32 = 29;

/// Parse an AudioSpecificConfig. `None` when the data is too short.
pub fn parse_audio_specific_config(data: &[u8]) -> Option<Mpeg4AudioConfig> {
    let mut br = BitReader::new(data);
    let mut object_type = br.object_type()?;
    let (sampling_index, sample_rate) = br.sample_rate()?;
    let chan_config = br.read(4)?;
    let mut ext_object_type = None;

    if object_type == AOT_SBR || object_type == AOT_PS {
        ext_object_type = Some(object_type);
        // explicit hierarchical signalling: extension rate, then the base type
        let (ext_index, ext_rate) = br.sample_rate()?;
        object_type = br.object_type()?;
        if object_type == AOT_ER_BSAC {
            br.read(4)?;
        }
        debug!(
            "aac explicit sbr/ps: core rate {} (index {}), ext rate {} (index {})",
            sample_rate, sampling_index, ext_rate, ext_index
        );
    }

    Some(Mpeg4AudioConfig {
        object_type,
        sampling_index,
        sample_rate,
        chan_config,
        ext_object_type,
    })
}

fn sw(flag: bool, hw: TrackEncoding) -> TrackEncoding {
    if flag {
        TrackEncoding::AudioIpcm
    } else {
        hw
    }
}

/// 编解码器 ID → 编码标签
///
/// Returns the encoding plus the codec version (only set for WMV). `None`
/// for codecs that cannot be played.
pub fn codec_to_encoding(
    codec_id: Id,
    medium: media::Type,
    extradata: &[u8],
    opts: &DecoderOptions,
) -> Option<(TrackEncoding, i32)> {
    use TrackEncoding::*;

    let encoding = match codec_id {
        Id::MPEG1VIDEO | Id::MPEG2VIDEO => VideoMpeg1,
        Id::H263 | Id::H263P | Id::H263I => VideoH263,
        Id::FLV1 => {
            if opts.flv2mpeg4_converter {
                VideoMpeg4
            } else {
                VideoFlv
            }
        }
        Id::VP5 | Id::VP6 | Id::VP6F => VideoVp6,
        Id::VP8 => VideoVp8,
        Id::VP9 => VideoVp9,
        Id::RV10 | Id::RV20 => VideoRmv,
        Id::MPEG4 => VideoMpeg4,
        Id::MSMPEG4V1 | Id::MSMPEG4V2 | Id::MSMPEG4V3 => VideoDivx3,
        Id::WMV1 => return Some((VideoWmv, 1)),
        Id::WMV2 => return Some((VideoWmv, 2)),
        Id::WMV3 => return Some((VideoWmv, 3)),
        Id::VC1 => VideoVc1,
        Id::H264 => VideoH264,
        Id::HEVC => VideoHevc,
        Id::AVS => VideoAvs,

        Id::MP2 => AudioMpegL3,
        Id::MP3 => sw(opts.mp3_software_decode, AudioMp3),
        Id::AAC => {
            if extradata.len() >= 2 {
                match parse_audio_specific_config(extradata) {
                    Some(cfg) if cfg.object_type == 2 => {}
                    other => {
                        debug!("aac object type {:?} needs the software decoder", other);
                        return Some((pcm_alias(AudioIpcm, opts), 0));
                    }
                }
            }
            sw(opts.aac_software_decode, AudioAac)
        }
        Id::AAC_LATM => sw(opts.aac_latm_software_decode, AudioAacLatm),
        Id::AC3 => sw(opts.ac3_software_decode, AudioAc3),
        Id::EAC3 => sw(opts.eac3_software_decode, AudioEac3),
        Id::DTS => sw(opts.dts_software_decode, AudioDts),
        Id::WMAV1 | Id::WMAV2 => sw(opts.wma_software_decode, AudioWma),
        Id::WMAPRO => sw(opts.wma_software_decode, AudioWmaPro),
        Id::WMALOSSLESS
        | Id::MLP
        | Id::RA_144
        | Id::RA_288
        | Id::VORBIS
        | Id::FLAC
        | Id::AMR_NB => AudioIpcm,
        Id::PCM_S8
        | Id::PCM_U8
        | Id::PCM_S16LE
        | Id::PCM_S16BE
        | Id::PCM_U16LE
        | Id::PCM_U16BE
        | Id::PCM_S24LE
        | Id::PCM_S24BE
        | Id::PCM_U24LE
        | Id::PCM_U24BE
        | Id::PCM_S32LE
        | Id::PCM_S32BE
        | Id::PCM_U32LE
        | Id::PCM_U32BE => {
            if opts.pcm_resampling {
                AudioIpcm
            } else {
                AudioPcm
            }
        }

        Id::SSA | Id::ASS => SubtitleAss,
        Id::DVD_SUBTITLE
        | Id::DVB_SUBTITLE
        | Id::XSUB
        | Id::MOV_TEXT
        | Id::HDMV_PGS_SUBTITLE
        | Id::DVB_TELETEXT
        | Id::TEXT => SubtitleUtf8,
        Id::SRT => SubtitleSrt,
        Id::SUBRIP => SubtitleSubrip,

        other => {
            if medium == media::Type::Audio {
                // unknown audio still plays through the software decoder
                debug!("codec {:?} not mapped, using injected pcm", other);
                AudioIpcm
            } else {
                warn!("codec {:?} not found", other);
                return None;
            }
        }
    };

    Some((pcm_alias(encoding, opts), 0))
}

fn pcm_alias(encoding: TrackEncoding, opts: &DecoderOptions) -> TrackEncoding {
    if encoding == TrackEncoding::AudioIpcm && opts.insert_pcm_as_lpcm {
        TrackEncoding::AudioLpcm
    } else {
        encoding
    }
}

/// Subtitle codecs the subtitle sink can render.
pub fn is_supported_text_subtitle(codec_id: Id) -> bool {
    matches!(
        codec_id,
        Id::SSA | Id::ASS | Id::SUBRIP | Id::TEXT | Id::SRT
    )
}
