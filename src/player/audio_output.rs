use crate::core::{AvOut, ContainerError, Extradata, PlaybackClock, Result, INVALID_PTS, PTS_CLOCK};
use crate::player::output::AvSink;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig, SupportedStreamConfigRange};
use crossbeam::queue::SegQueue;
use log::{debug, info, warn};
use std::sync::Arc;

/// 音频输出 - plays PCM injected audio on the default sound card via cpal
pub struct PcmSpeakerSink {
    device: Device,
    stream: Option<Stream>,
    /// Rate and channel count of the open stream.
    config: Option<(u32, u16)>,
    buffer: Arc<SegQueue<f32>>,
    clock: PlaybackClock,
    clock_started: bool,
    paused: bool,
}

// cpal::Stream is not Send. The sink is built on the caller's thread,
// written by the playback thread and paused/resumed/cleared by the
// container from the caller's thread; every access holds the output mutex.
unsafe impl Send for PcmSpeakerSink {}

impl PcmSpeakerSink {
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| ContainerError::Init("no audio output device".to_string()))?;

        info!("🔈 pcm speaker: {}", device.name().unwrap_or_default());

        Ok(Self {
            device,
            stream: None,
            config: None,
            buffer: Arc::new(SegQueue::new()),
            clock: PlaybackClock::new(),
            clock_started: false,
            paused: false,
        })
    }

    fn is_config_compatible(config: &StreamConfig, supported: &SupportedStreamConfigRange) -> bool {
        let rate_in_range = config.sample_rate.0 >= supported.min_sample_rate().0
            && config.sample_rate.0 <= supported.max_sample_rate().0;

        rate_in_range && config.channels == supported.channels()
    }

    /// (Re)open the output stream for `rate`/`channels`.
    fn open_stream(&mut self, rate: u32, channels: u16) -> Result<()> {
        self.stream.take();
        self.clear_buffer();

        let config = StreamConfig {
            channels,
            sample_rate: cpal::SampleRate(rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let supported = self
            .device
            .supported_output_configs()
            .map_err(|e| ContainerError::Init(format!("audio configs: {}", e)))?
            .any(|s| Self::is_config_compatible(&config, &s));
        if !supported {
            warn!("⚠️  audio device may not support {} Hz, {} channels", rate, channels);
        }

        let buffer = self.buffer.clone();
        let stream = self
            .device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    for sample in data.iter_mut() {
                        *sample = buffer.pop().unwrap_or(0.0);
                    }
                },
                move |err| {
                    warn!("audio stream error: {}", err);
                },
                None,
            )
            .map_err(|e| ContainerError::Init(format!("build audio stream: {}", e)))?;

        if !self.paused {
            stream
                .play()
                .map_err(|e| ContainerError::Init(format!("start audio stream: {}", e)))?;
        }

        debug!("audio stream opened: {} Hz, {} channels", rate, channels);
        self.stream = Some(stream);
        self.config = Some((rate, channels));
        Ok(())
    }

    fn clear_buffer(&self) {
        while self.buffer.pop().is_some() {}
    }
}

impl AvSink for PcmSpeakerSink {
    fn write(&mut self, out: &AvOut<'_>) -> Result<()> {
        let Extradata::Pcm(params) = out.extradata else {
            debug!("speaker sink got non-pcm audio, dropped");
            return Ok(());
        };
        if params.bits_per_coded_sample != 16 {
            return Err(ContainerError::NotSupported(format!(
                "{} bit pcm",
                params.bits_per_coded_sample
            )));
        }

        let wanted = (params.sample_rate, params.channels as u16);
        if self.config != Some(wanted) {
            self.open_stream(wanted.0, wanted.1)?;
        }

        let big_endian = params.codec_id == ffmpeg_next::codec::Id::PCM_S16BE;
        for pair in out.data.chunks_exact(2) {
            let raw = [pair[0], pair[1]];
            let v = if big_endian {
                i16::from_be_bytes(raw)
            } else {
                i16::from_le_bytes(raw)
            };
            self.buffer.push(v as f32 / 32768.0);
        }

        if !self.clock_started && out.pts != INVALID_PTS {
            // the clock follows the first chunk of the buffered audio
            let buffered = self.buffer.len() as i64 - (out.data.len() / 2) as i64;
            let per_second = params.sample_rate as i64 * params.channels.max(1) as i64;
            let lead = if per_second > 0 { buffered * PTS_CLOCK / per_second } else { 0 };
            self.clock.set_time((out.pts - lead).max(0));
            if !self.paused {
                self.clock.play();
            }
            self.clock_started = true;
        }
        Ok(())
    }

    fn clear(&mut self) {
        self.clear_buffer();
        self.clock.pause();
        self.clock_started = false;
    }

    fn play(&mut self) {
        self.paused = false;
        if let Some(stream) = &self.stream {
            if let Err(e) = stream.play() {
                warn!("audio stream resume failed: {}", e);
            }
        }
        if self.clock_started {
            self.clock.play();
        }
    }

    fn pause(&mut self) {
        self.paused = true;
        if let Some(stream) = &self.stream {
            if let Err(e) = stream.pause() {
                warn!("audio stream pause failed: {}", e);
            }
        }
        self.clock.pause();
    }

    fn play_pts(&self) -> i64 {
        if self.clock_started {
            self.clock.now()
        } else {
            INVALID_PTS
        }
    }
}

impl Drop for PcmSpeakerSink {
    fn drop(&mut self) {
        if self.stream.take().is_some() {
            info!("audio output stopped");
        }
    }
}
