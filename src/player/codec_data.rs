//! Codec headers for streams whose extradata the output sinks cannot use
//! directly.

use crate::player::encoding::parse_audio_specific_config;
use ffmpeg_next::codec::Id;

/// Length of an ADTS header without CRC.
pub const AAC_HEADER_LENGTH: usize = 7;

/// AAC-LATM: headers travel in-band.
pub const LATM_MARKER: &[u8] = b"LATM\0";
/// AAC in transport streams: every frame already carries ADTS.
pub const ADTS_MARKER: &[u8] = b"ADTS\0";

const AAC_SAMPLE_RATES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

/// ADTS sampling frequency index for `rate`, rounding down to the nearest
/// table entry.
pub fn aac_sample_rate_index(rate: u32) -> u8 {
    AAC_SAMPLE_RATES
        .iter()
        .position(|&r| rate >= r)
        .unwrap_or(AAC_SAMPLE_RATES.len() - 1) as u8
}

/// ADTS header template; the frame length field is filled by the sink.
pub fn adts_header(object_type: u32, sample_index: u8, chan_config: u32) -> [u8; AAC_HEADER_LENGTH] {
    // ADTS profile is the MPEG-4 audio object type minus one
    let profile = object_type.wrapping_sub(1);
    [
        0xFF,
        0xF1,
        (((profile & 0x03) << 6) as u8) | ((sample_index & 0x0f) << 2) | ((chan_config >> 2) & 0x01) as u8,
        ((chan_config & 0x03) << 6) as u8,
        0x00,
        0x1F,
        0xFC,
    ]
}

/// ADTS template for an AAC stream in a non-TS container.
///
/// Starts from LC with the parameters' rate and channel count and lets a
/// parsable AudioSpecificConfig override them.
pub fn aac_adts_template(sample_rate: u32, channels: u32, extradata: &[u8]) -> [u8; AAC_HEADER_LENGTH] {
    let mut object_type = 2;
    let mut sample_index = aac_sample_rate_index(sample_rate);
    let mut chan_config = channels.saturating_sub(1);

    if extradata.len() >= 2 {
        if let Some(cfg) = parse_audio_specific_config(extradata) {
            object_type = cfg.object_type;
            sample_index = if cfg.sampling_index == 0x0f {
                aac_sample_rate_index(cfg.sample_rate)
            } else {
                cfg.sampling_index as u8
            };
            chan_config = cfg.chan_config;
        }
    }

    adts_header(object_type, sample_index, chan_config)
}

/// Containers that deliver AAC with in-band ADTS headers.
pub fn aac_has_inband_adts(format_name: &str) -> bool {
    format_name.starts_with("mpegts") || format_name.starts_with("hls,")
}

/// WAVEFORMATEX format tag for the WMA family.
pub fn wma_format_tag(codec_id: Id) -> Option<u16> {
    match codec_id {
        Id::WMAV1 => Some(0x160),
        Id::WMAV2 => Some(0x161),
        Id::WMAPRO => Some(0x162),
        Id::WMALOSSLESS => Some(0x163),
        _ => None,
    }
}

/// 18-byte little-endian WMA header followed by the codec extradata.
pub fn wma_extradata(
    format_tag: u16,
    channels: u16,
    sample_rate: u32,
    bit_rate: u32,
    block_align: u16,
    bits_per_sample: u16,
    codec_data: &[u8],
) -> Vec<u8> {
    let mut out = Vec::with_capacity(18 + codec_data.len());
    out.extend_from_slice(&format_tag.to_le_bytes());
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&(bit_rate / 8).to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&bits_per_sample.to_le_bytes());
    out.extend_from_slice(&(codec_data.len() as u16).to_le_bytes());
    out.extend_from_slice(codec_data);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_rate_index() {
        assert_eq!(aac_sample_rate_index(96000), 0);
        assert_eq!(aac_sample_rate_index(192000), 0);
        assert_eq!(aac_sample_rate_index(48000), 3);
        assert_eq!(aac_sample_rate_index(44100), 4);
        assert_eq!(aac_sample_rate_index(46000), 4);
        assert_eq!(aac_sample_rate_index(7350), 12);
        assert_eq!(aac_sample_rate_index(100), 12);
    }

    #[test]
    fn test_adts_header_lc_stereo_48k() {
        assert_eq!(
            adts_header(2, 3, 2),
            [0xFF, 0xF1, 0x4C, 0x80, 0x00, 0x1F, 0xFC]
        );
        // 6 channels sets the high channel bit in byte 2
        assert_eq!(adts_header(2, 4, 6)[2], 0x51);
        assert_eq!(adts_header(2, 4, 6)[3], 0x80);
    }

    #[test]
    fn test_adts_template_prefers_audio_specific_config() {
        // params say 44.1 kHz mono, the config says 48 kHz stereo
        let header = aac_adts_template(44100, 1, &[0x11, 0x90]);
        assert_eq!(header, adts_header(2, 3, 2));
        // no config: parameters are used
        assert_eq!(aac_adts_template(44100, 2, &[]), adts_header(2, 4, 1));
        // escape index resolved through the table
        let header = aac_adts_template(8000, 1, &[0x17, 0x80, 0x56, 0x22, 0x10]);
        assert_eq!(header, adts_header(2, 4, 2));
    }

    #[test]
    fn test_adts_template_uses_channels_minus_one() {
        // 48 kHz stereo from the parameters alone
        assert_eq!(
            aac_adts_template(48000, 2, &[]),
            [0xFF, 0xF1, 0x4C, 0x40, 0x00, 0x1F, 0xFC]
        );
    }

    #[test]
    fn test_inband_adts_containers() {
        assert!(aac_has_inband_adts("mpegts"));
        assert!(aac_has_inband_adts("hls,applehttp"));
        assert!(!aac_has_inband_adts("mov,mp4,m4a,3gp,3g2,mj2"));
    }

    #[test]
    fn test_wma_extradata_layout() {
        let tag = wma_format_tag(Id::WMAV2).unwrap();
        let out = wma_extradata(tag, 2, 44100, 128_000, 0x0b91, 16, &[0xaa, 0xbb]);
        assert_eq!(out.len(), 20);
        assert_eq!(&out[0..2], &[0x61, 0x01]);
        assert_eq!(&out[2..4], &[0x02, 0x00]);
        assert_eq!(&out[4..8], &44100u32.to_le_bytes());
        assert_eq!(&out[8..12], &16000u32.to_le_bytes());
        assert_eq!(&out[12..14], &[0x91, 0x0b]);
        assert_eq!(&out[14..16], &[0x10, 0x00]);
        assert_eq!(&out[16..18], &[0x02, 0x00]);
        assert_eq!(&out[18..], &[0xaa, 0xbb]);
        assert_eq!(wma_format_tag(Id::AAC), None);
    }
}
