use crate::core::{calc_pts, PcmPrivateData, Result};
use ffmpeg_next as ffmpeg;
use ffmpeg_next::{codec, software, util, Rational};
use log::{debug, warn};

/// Software decoded audio, packed S16.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmChunk {
    pub data: Vec<u8>,
    /// 90 kHz
    pub pts: i64,
    pub params: PcmPrivateData,
}

/// Audio decoder feeding PCM injection.
pub trait PcmDecoder {
    fn decode(&mut self, packet: &ffmpeg::Packet) -> Result<Vec<PcmChunk>>;

    /// Drop the resampler; the next chunk carries the restart flag.
    fn restart(&mut self);

    /// Drop buffered frames after a seek.
    fn flush(&mut self);
}

const OUTPUT_RATES: [u32; 6] = [48000, 96000, 192000, 44100, 88200, 176400];

/// Output rate for PCM injection: a table rate that is an integer multiple
/// or divisor of the input rate, 44100 when none is.
pub fn choose_output_rate(in_rate: u32, lpcm: bool) -> u32 {
    if lpcm {
        return 48000;
    }
    if in_rate == 0 {
        return 44100;
    }
    OUTPUT_RATES
        .iter()
        .copied()
        .find(|&r| (r / in_rate) * in_rate == r || (in_rate / r) * r == in_rate)
        .unwrap_or(44100)
}

/// Options of the PCM injection path.
#[derive(Debug, Clone, Copy, Default)]
pub struct PcmOptions {
    pub lpcm: bool,
    pub stereo_downmix: bool,
}

struct Resampler {
    context: software::resampling::Context,
    out_rate: u32,
    out_channels: u32,
}

/// 音频解码器 - FFmpeg decoder plus resampler to packed S16
pub struct FfmpegPcmDecoder {
    decoder: codec::decoder::Audio,
    resampler: Option<Resampler>,
    time_base: Rational,
    start_time: Option<i64>,
    options: PcmOptions,
    restart_pending: bool,
    bit_rate: i64,
}

impl FfmpegPcmDecoder {
    pub fn new(
        parameters: codec::Parameters,
        time_base: Rational,
        start_time: Option<i64>,
        options: PcmOptions,
    ) -> Result<Self> {
        let context = codec::context::Context::from_parameters(parameters)?;
        let decoder = context.decoder().audio()?;

        debug!(
            "🔊 pcm decoder: {:?} {} Hz, {} channels, {:?}",
            decoder.id(),
            decoder.rate(),
            decoder.channels(),
            decoder.format()
        );

        let bit_rate = decoder.bit_rate() as i64;
        Ok(Self {
            decoder,
            resampler: None,
            time_base,
            start_time,
            options,
            restart_pending: false,
            bit_rate,
        })
    }

    fn convert_frame(&mut self, mut frame: util::frame::Audio) -> Result<Option<PcmChunk>> {
        if frame.samples() == 0 {
            return Ok(None);
        }
        if frame.channel_layout().is_empty() {
            frame.set_channel_layout(util::channel_layout::ChannelLayout::default(
                frame.channels() as i32,
            ));
        }

        if self.resampler.is_none() {
            let in_layout = frame.channel_layout();
            let in_channels = in_layout.channels() as u32;
            let out_rate = choose_output_rate(frame.rate(), self.options.lpcm);
            let (out_layout, out_channels) = if self.options.stereo_downmix && in_channels > 2 {
                (util::channel_layout::ChannelLayout::STEREO_DOWNMIX, 2)
            } else {
                (in_layout, in_channels)
            };

            debug!(
                "🔧 pcm resampler: {} Hz/{} ch {:?} -> {} Hz/{} ch s16",
                frame.rate(),
                in_channels,
                frame.format(),
                out_rate,
                out_channels
            );

            let context = software::resampling::Context::get(
                frame.format(),
                in_layout,
                frame.rate(),
                util::format::Sample::I16(util::format::sample::Type::Packed),
                out_layout,
                out_rate,
            )?;
            self.resampler = Some(Resampler {
                context,
                out_rate,
                out_channels,
            });
        }

        let Some(resampler) = self.resampler.as_mut() else {
            return Ok(None);
        };
        let mut resampled = util::frame::Audio::empty();
        resampler.context.run(&frame, &mut resampled)?;

        let len = resampled.samples() * resampler.out_channels as usize * 2;
        let plane = resampled.data(0);
        let data = plane[..len.min(plane.len())].to_vec();

        let pts = calc_pts(frame.timestamp(), self.time_base, self.start_time);

        let params = PcmPrivateData {
            channels: resampler.out_channels,
            bits_per_coded_sample: 16,
            sample_rate: resampler.out_rate,
            bit_rate: self.bit_rate,
            // the resampler output is always native endian
            codec_id: if cfg!(target_endian = "big") {
                codec::Id::PCM_S16BE
            } else {
                codec::Id::PCM_S16LE
            },
            restart_resampling: std::mem::take(&mut self.restart_pending),
        };

        Ok(Some(PcmChunk { data, pts, params }))
    }
}

impl PcmDecoder for FfmpegPcmDecoder {
    fn decode(&mut self, packet: &ffmpeg::Packet) -> Result<Vec<PcmChunk>> {
        let mut chunks = Vec::new();

        match self.decoder.send_packet(packet) {
            Ok(()) => {}
            Err(ffmpeg::Error::Eof) | Err(ffmpeg::Error::Other { errno: 11 }) => {}
            Err(e) => {
                warn!("❌ audio decode failed: {}", e);
                self.restart();
                return Ok(chunks);
            }
        }

        loop {
            let mut decoded_frame = util::frame::Audio::empty();
            match self.decoder.receive_frame(&mut decoded_frame) {
                Ok(_) => {
                    if let Some(chunk) = self.convert_frame(decoded_frame)? {
                        chunks.push(chunk);
                    }
                }
                Err(ffmpeg::Error::Other { errno: 11 }) => break, // EAGAIN
                Err(ffmpeg::Error::Eof) => break,
                Err(e) => {
                    warn!("❌ audio frame receive failed: {}", e);
                    self.restart();
                    break;
                }
            }
        }

        Ok(chunks)
    }

    fn restart(&mut self) {
        self.resampler = None;
        self.restart_pending = true;
    }

    fn flush(&mut self) {
        self.decoder.flush();
    }
}
