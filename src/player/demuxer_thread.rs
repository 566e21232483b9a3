use crate::core::{
    calc_pts, rescale, AvOut, ContainerError, Extradata, FinishTimer, PcmPrivateData, Result,
    SubtitleOut, Track, TrackKind, INVALID_PTS, PTS_CLOCK, TIME_BASE,
};
use crate::player::decoder::PcmDecoder;
use crate::player::demuxer_source::{DemuxerSource, MediaPacket};
use crate::player::manager::Managers;
use crate::player::output::SharedOutput;
use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, error, info, warn};
use serde_json::json;
use std::process;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub(crate) fn log_ctx() -> String {
    format!("[pid:{} tid:{:?}]", process::id(), thread::current().id())
}

const IDLE_SLEEP: Duration = Duration::from_millis(10);
const FINISH_TICK: Duration = Duration::from_millis(100);

/// 播放状态 - shared between the container and the playback thread.
pub struct PlaybackState {
    pub playing: AtomicBool,
    pub paused: AtomicBool,
    pub seeking: AtomicBool,
    /// Also polled by the FFmpeg interrupt callback and the custom IO.
    pub abort: Arc<AtomicBool>,
    pub backward: AtomicBool,
    pub terminating: AtomicBool,
    pub ts_live: AtomicBool,
    pub loop_mode: AtomicBool,
    pub noprobe: AtomicBool,
    /// Largest pts seen since the last seek (90 kHz).
    pub latest_pts: AtomicI64,
    pub current_video_pts: AtomicI64,
    pub current_audio_pts: AtomicI64,
    /// Byte position of the first input after the last read.
    pub byte_position: AtomicI64,
    pub thread_started: AtomicBool,
}

impl PlaybackState {
    pub fn new() -> Self {
        Self {
            playing: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            seeking: AtomicBool::new(false),
            abort: Arc::new(AtomicBool::new(false)),
            backward: AtomicBool::new(false),
            terminating: AtomicBool::new(false),
            ts_live: AtomicBool::new(false),
            loop_mode: AtomicBool::new(false),
            noprobe: AtomicBool::new(false),
            latest_pts: AtomicI64::new(0),
            current_video_pts: AtomicI64::new(0),
            current_audio_pts: AtomicI64::new(0),
            byte_position: AtomicI64::new(-1),
            thread_started: AtomicBool::new(false),
        }
    }

    pub fn abort_flag(&self) -> Arc<AtomicBool> {
        self.abort.clone()
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    fn reset_positions(&self) {
        self.current_video_pts.store(0, Ordering::SeqCst);
        self.current_audio_pts.store(0, Ordering::SeqCst);
        self.latest_pts.store(0, Ordering::SeqCst);
    }

    fn raise_latest_pts(&self, pts: i64) {
        if pts != INVALID_PTS {
            self.latest_pts.fetch_max(pts, Ordering::SeqCst);
        }
    }
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self::new()
    }
}

/// 播放线程命令
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemuxCommand {
    /// Absolute time, microseconds from the container start.
    SeekTime(i64),
    /// Byte offset in the first input.
    SeekBytes(i64),
}

/// Everything the playback loop works on.
pub struct PlaybackContext {
    pub source: Box<dyn DemuxerSource>,
    pub managers: Managers,
    pub output: SharedOutput,
    pub state: Arc<PlaybackState>,
    /// Byte seek transport streams when looping.
    pub ts_bytes_seeking: bool,
}

/// 播放线程管理器
pub struct PlaybackThread {
    handle: Option<JoinHandle<Box<dyn DemuxerSource>>>,
    command_tx: Sender<DemuxCommand>,
}

impl PlaybackThread {
    /// Start the playback loop. The source is handed back by `join`.
    pub fn spawn(ctx: PlaybackContext) -> Result<Self> {
        let (command_tx, command_rx) = unbounded::<DemuxCommand>();
        let state = ctx.state.clone();
        state.playing.store(true, Ordering::SeqCst);
        state.thread_started.store(true, Ordering::SeqCst);

        let handle = thread::Builder::new()
            .name("ffmpeg:play".to_string())
            .spawn(move || PlaybackLoop::new(ctx, command_rx).run())
            .map_err(|e| {
                state.playing.store(false, Ordering::SeqCst);
                state.thread_started.store(false, Ordering::SeqCst);
                ContainerError::Init(format!("spawn playback thread: {}", e))
            })?;

        Ok(Self {
            handle: Some(handle),
            command_tx,
        })
    }

    pub fn send(&self, cmd: DemuxCommand) -> Result<()> {
        self.command_tx
            .send(cmd)
            .map_err(|e| ContainerError::Other(format!("发送 Seek 命令失败: {}", e)))
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// Wait for the loop to end and take the source back.
    pub fn join(mut self) -> Option<Box<dyn DemuxerSource>> {
        let handle = self.handle.take()?;
        match handle.join() {
            Ok(source) => Some(source),
            Err(_) => {
                error!("{} ❌ playback thread panicked", log_ctx());
                None
            }
        }
    }
}

impl Drop for PlaybackThread {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            warn!("{} ⚠ PlaybackThread 被 drop，但未 join，正在等待退出", log_ctx());
            let _ = handle.join();
        }
    }
}

/// PCM decoder of the current audio track.
struct ActiveDecoder {
    key: (usize, usize),
    decoder: Box<dyn PcmDecoder>,
}

struct PlaybackLoop {
    source: Box<dyn DemuxerSource>,
    managers: Managers,
    output: SharedOutput,
    state: Arc<PlaybackState>,
    commands: Receiver<DemuxCommand>,
    ts_bytes_seeking: bool,

    finish: FinishTimer,
    waiting_for_finish: bool,
    /// Second input still has to follow a time seek.
    resync_second_input: bool,
    /// Next raw PCM unit carries the restart flag.
    restart_pcm: bool,
    decoder: Option<ActiveDecoder>,
    last_video_dts: i64,
    last_audio_dts: i64,
    packet_count: usize,
}

impl PlaybackLoop {
    fn new(ctx: PlaybackContext, commands: Receiver<DemuxCommand>) -> Self {
        Self {
            source: ctx.source,
            managers: ctx.managers,
            output: ctx.output,
            state: ctx.state,
            commands,
            ts_bytes_seeking: ctx.ts_bytes_seeking,
            finish: FinishTimer::new(),
            waiting_for_finish: false,
            resync_second_input: false,
            restart_pcm: false,
            decoder: None,
            last_video_dts: INVALID_PTS,
            last_audio_dts: INVALID_PTS,
            packet_count: 0,
        }
    }

    fn run(mut self) -> Box<dyn DemuxerSource> {
        info!("{} 🎬 播放线程启动: {}", log_ctx(), self.source.description());
        let state = self.state.clone();

        while state.is_playing() {
            if state.paused.load(Ordering::SeqCst) || state.seeking.load(Ordering::SeqCst) {
                thread::sleep(IDLE_SLEEP);
                continue;
            }

            if let Some(cmd) = self.latest_command() {
                self.apply_seek(cmd);
            }

            if self.waiting_for_finish {
                if !self.end_of_input() {
                    break;
                }
                continue;
            }

            let av_idx = self.choose_input();
            if av_idx == 1 && self.resync_second_input {
                self.resync_second_input = false;
                self.resync_to_video();
            }

            match self.source.read_packet(av_idx) {
                Ok(Some(packet)) => {
                    if av_idx == 0 {
                        state
                            .byte_position
                            .store(self.source.byte_position(), Ordering::SeqCst);
                    }
                    self.packet_count += 1;
                    self.dispatch(packet);
                }
                Ok(None) => self.hit_end("End of file"),
                Err(e) => self.hit_end(&e.to_string()),
            }
        }

        state.playing.store(false, Ordering::SeqCst);
        state.thread_started.store(false, Ordering::SeqCst);
        info!("{} 🛑 播放线程退出（共读取 {} 个包）", log_ctx(), self.packet_count);
        self.source
    }

    /// Drain the command queue, only the newest seek matters.
    fn latest_command(&self) -> Option<DemuxCommand> {
        self.commands.try_iter().last()
    }

    fn apply_seek(&mut self, cmd: DemuxCommand) {
        info!("{} ⏩ seek {:?}", log_ctx(), cmd);
        match cmd {
            DemuxCommand::SeekBytes(pos) => {
                if let Err(e) = self.source.seek_bytes(pos) {
                    error!("{} ❌ byte seek failed: {}", log_ctx(), e);
                }
            }
            DemuxCommand::SeekTime(target) => {
                for av_idx in 0..self.source.input_count() {
                    let start = self
                        .source
                        .info(av_idx)
                        .and_then(|i| i.start_time)
                        .unwrap_or(0);
                    if let Err(e) = self.source.seek_time(av_idx, target + start) {
                        error!("{} ❌ seek input {} to {}us failed: {}", log_ctx(), av_idx, target, e);
                    }
                }
                self.resync_second_input = self.source.input_count() > 1;
            }
        }

        self.state.reset_positions();
        self.last_video_dts = INVALID_PTS;
        self.last_audio_dts = INVALID_PTS;
        self.restart_pcm = true;
        if let Some(active) = self.decoder.as_mut() {
            active.decoder.restart();
            active.decoder.flush();
        }
        self.waiting_for_finish = false;
        self.finish.reset();
    }

    /// With a separate audio input, read whichever side is behind.
    fn choose_input(&self) -> usize {
        if self.source.input_count() < 2 {
            return 0;
        }
        let video = self.state.current_video_pts.load(Ordering::SeqCst);
        let audio = self.state.current_audio_pts.load(Ordering::SeqCst);
        if video <= audio {
            0
        } else {
            1
        }
    }

    fn resync_to_video(&mut self) {
        let video_pts = self.state.current_video_pts.load(Ordering::SeqCst);
        let target = rescale(video_pts, TIME_BASE, PTS_CLOCK);
        debug!("{} resync second input to {}us", log_ctx(), target);
        if let Err(e) = self
            .source
            .seek_window(1, target - TIME_BASE, target, target + TIME_BASE)
        {
            warn!("{} second input resync failed: {}", log_ctx(), e);
        }
    }

    fn hit_end(&mut self, reason: &str) {
        println!("{}", json!({ "log": format!("Frame read error: '{}'", reason) }));
        info!(
            "{} 📄 end of input after {} packets: {}",
            log_ctx(),
            self.packet_count,
            reason
        );
        self.waiting_for_finish = true;
    }

    /// One tick after the input ended. Returns false when playback is over.
    fn end_of_input(&mut self) -> bool {
        let ts_live = self.state.ts_live.load(Ordering::SeqCst);
        let play_pts = self.output.lock().play_pts();
        self.finish.update(play_pts);

        if !self.finish.is_finished() && !ts_live {
            thread::sleep(FINISH_TICK);
            return true;
        }

        if ts_live {
            info!("{} 📡 live stream ended, restart from byte 0", log_ctx());
            self.apply_seek(DemuxCommand::SeekBytes(0));
            return true;
        }

        let length_ms = self.length_ms();
        if self.state.loop_mode.load(Ordering::SeqCst)
            && length_ms > 0
            && play_pts != INVALID_PTS
            && play_pts > 0
        {
            let ts = self.source.info(0).map_or(false, |i| i.ts_discont);
            let cmd = if ts && self.ts_bytes_seeking {
                DemuxCommand::SeekBytes(0)
            } else {
                DemuxCommand::SeekTime(0)
            };
            self.apply_seek(cmd);
            {
                let mut output = self.output.lock();
                output.clear();
                output.play();
            }
            println!("{}", json!({ "log": "Loop mode: jump to the start." }));
            return true;
        }

        false
    }

    fn length_ms(&self) -> i64 {
        match self
            .managers
            .video
            .current()
            .or_else(|| self.managers.audio.current())
        {
            Some(track) => track.duration_ms,
            None => self.source.info(0).map_or(0, |i| i.duration / 1000),
        }
    }

    fn start_time(&self, av_idx: usize) -> Option<i64> {
        self.source.info(av_idx).and_then(|i| i.start_time)
    }

    fn dispatch(&mut self, packet: MediaPacket) {
        let matches = |t: &Track| t.av_idx == packet.av_idx && t.id == packet.stream_id;

        if let Some(track) = self.managers.video.current().filter(matches) {
            self.write_video(&track, &packet);
        } else if let Some(track) = self.managers.audio.current().filter(matches) {
            self.write_audio(&track, &packet);
        } else if let Some(track) = self
            .managers
            .subtitle
            .current()
            .filter(|t| t.id == packet.stream_id)
        {
            self.write_subtitle(&track, &packet);
        }
    }

    fn write_video(&mut self, track: &Track, p: &MediaPacket) {
        let start = self.start_time(p.av_idx);
        let pts = calc_pts(p.packet.pts(), p.time_base, start);
        let dts = calc_pts(p.packet.dts(), p.time_base, start);
        self.state.raise_latest_pts(pts);

        if self.state.ts_live.load(Ordering::SeqCst) {
            if dts == INVALID_PTS || (self.last_video_dts != INVALID_PTS && dts <= self.last_video_dts) {
                debug!("skip video packet dts={}", dts);
                return;
            }
            self.last_video_dts = dts;
        }

        if pts != INVALID_PTS {
            self.state.current_video_pts.store(pts, Ordering::SeqCst);
        }
        self.finish.update_max_injected_pts(pts);

        let ts = self.source.info(p.av_idx).map_or(false, |i| i.ts_discont);
        let out = AvOut {
            kind: TrackKind::Video,
            data: p.packet.data().unwrap_or(&[]),
            pts,
            dts,
            extradata: Extradata::Raw(&track.extradata),
            frame_rate: track.frame_rate,
            time_scale: track.time_scale,
            width: track.width,
            height: track.height,
            info_flags: ts as u32,
        };
        if let Err(e) = self.output.lock().video.write(&out) {
            warn!("{} video write failed: {}", log_ctx(), e);
        }
    }

    fn write_audio(&mut self, track: &Track, p: &MediaPacket) {
        let start = self.start_time(p.av_idx);
        let pts = calc_pts(p.packet.pts(), p.time_base, start);
        let dts = calc_pts(p.packet.dts(), p.time_base, start);
        if !self.managers.video.has_current() {
            self.state.raise_latest_pts(pts);
        }

        if self.state.ts_live.load(Ordering::SeqCst) {
            if dts == INVALID_PTS || (self.last_audio_dts != INVALID_PTS && dts <= self.last_audio_dts) {
                debug!("skip audio packet dts={}", dts);
                return;
            }
            self.last_audio_dts = dts;
        }

        // decoded tracks take the position from the chunks
        if pts != INVALID_PTS && !track.inject_as_pcm {
            self.state.current_audio_pts.store(pts, Ordering::SeqCst);
        }

        let restart = std::mem::take(&mut self.restart_pcm);
        let backward = self.state.backward.load(Ordering::SeqCst);
        let data = p.packet.data().unwrap_or(&[]);

        if track.inject_raw_pcm {
            let Some(params) = self.raw_pcm_params(p, restart) else {
                return;
            };
            self.finish.update_max_injected_pts(pts);
            let out = AvOut::audio(data, pts, Extradata::Pcm(params));
            if let Err(e) = self.output.lock().audio.write(&out) {
                warn!("{} pcm write failed: {}", log_ctx(), e);
            }
        } else if track.inject_as_pcm {
            let chunks = match self.pcm_decoder(track) {
                Some(decoder) => match decoder.decode(&p.packet) {
                    Ok(chunks) => chunks,
                    Err(e) => {
                        warn!("{} ❌ audio decode failed: {}", log_ctx(), e);
                        decoder.restart();
                        return;
                    }
                },
                None => return,
            };
            if backward {
                return;
            }
            let mut output = self.output.lock();
            for chunk in &chunks {
                self.finish.update_max_injected_pts(chunk.pts);
                let out = AvOut::audio(&chunk.data, chunk.pts, Extradata::Pcm(chunk.params));
                if let Err(e) = output.audio.write(&out) {
                    warn!("{} pcm write failed: {}", log_ctx(), e);
                }
            }
            if let Some(last) = chunks.iter().rev().find(|c| c.pts != INVALID_PTS) {
                self.state.current_audio_pts.store(last.pts, Ordering::SeqCst);
            }
        } else {
            if backward {
                return;
            }
            let extradata = match &track.aac_header {
                Some(header) => Extradata::Raw(header),
                None => Extradata::Raw(&track.extradata),
            };
            self.finish.update_max_injected_pts(pts);
            let mut out = AvOut::audio(data, pts, extradata);
            out.dts = dts;
            if let Err(e) = self.output.lock().audio.write(&out) {
                warn!("{} audio write failed: {}", log_ctx(), e);
            }
        }
    }

    fn raw_pcm_params(&self, p: &MediaPacket, restart: bool) -> Option<PcmPrivateData> {
        let stream = self.source.info(p.av_idx)?.stream(p.stream_index)?;
        Some(PcmPrivateData {
            channels: stream.channels,
            bits_per_coded_sample: stream.bits_per_coded_sample,
            sample_rate: stream.sample_rate,
            bit_rate: stream.bit_rate,
            codec_id: stream.codec_id,
            restart_resampling: restart,
        })
    }

    /// Decoder for `track`, opened on first use and on track change.
    fn pcm_decoder(&mut self, track: &Track) -> Option<&mut Box<dyn PcmDecoder>> {
        let key = (track.av_idx, track.stream_index);
        if self.decoder.as_ref().map(|d| d.key) != Some(key) {
            self.decoder = None;
            match self.source.open_pcm_decoder(track) {
                Ok(decoder) => {
                    info!("{} 🔊 pcm injection for track {} ({})", log_ctx(), track.id, track.encoding);
                    self.decoder = Some(ActiveDecoder { key, decoder });
                }
                Err(e) => {
                    error!("{} ❌ open audio decoder failed: {}", log_ctx(), e);
                    return None;
                }
            }
        }
        self.decoder.as_mut().map(|d| &mut d.decoder)
    }

    fn write_subtitle(&mut self, track: &Track, p: &MediaPacket) {
        let pts = calc_pts(p.packet.pts(), p.time_base, self.start_time(p.av_idx));
        let duration_ms = rescale(
            p.packet.duration(),
            p.time_base.numerator() as i64 * 1000,
            p.time_base.denominator() as i64,
        );
        if duration_ms <= 0 {
            return;
        }
        let out = SubtitleOut {
            track_id: track.id,
            data: p.packet.data().unwrap_or(&[]),
            pts,
            duration_ms,
        };
        if let Err(e) = self.output.lock().subtitle.write(&out) {
            warn!("{} subtitle write failed: {}", log_ctx(), e);
        }
    }
}
