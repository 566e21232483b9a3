use crate::config::{DecoderOptions, PlaybackOptions};
use crate::core::{ContainerError, PlayFiles, Result, TrackKind, INVALID_PTS, PTS_CLOCK, TIME_BASE};
use crate::player::demuxer::{open_input, FfmpegDemuxer, InputInfo};
use crate::player::demuxer_source::DemuxerSource;
use crate::player::demuxer_thread::{log_ctx, DemuxCommand, PlaybackContext, PlaybackState, PlaybackThread};
use crate::player::manager::{Managers, TrackEntry};
use crate::player::output::SharedOutput;
use log::{debug, error, info, warn};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// File extensions the FFmpeg container claims.
pub const CAPABILITIES: &[&str] = &[
    "aac", "avi", "mkv", "mp4", "ts", "mov", "flv", "flac", "mp3", "mpg", "m2ts", "vob", "evo",
    "wmv", "wma", "asf", "mp2", "m4v", "m4a", "fla", "divx", "dat", "mpeg", "trp", "mts", "vdr",
    "ogg", "wav", "wtv", "asx", "mvi", "png", "jpg", "ra", "ram", "rm", "3gp", "amr", "webm",
    "m3u8", "mpd",
];

/// Caller tags understood by `info`, with the FFmpeg metadata key.
const METADATA_MAP: &[(&str, &str)] = &[
    ("Title", "title"),
    ("Artist", "artist"),
    ("Album", "album"),
    ("Year", "date"),
    ("Genre", "genre"),
    ("Comment", "comment"),
    ("Track", "track"),
    ("Copyright", "copyright"),
    ("Composer", "composer"),
    ("Publisher", "publisher"),
    ("Performer", "performer"),
    ("Language", "language"),
    ("Encoder", "encoder"),
];

/// Bytes per second assumed for TS byte seeking without a bit rate.
const TS_DEFAULT_BYTE_RATE: i64 = 180_000;
const STOP_WAIT_TICKS: u32 = 50;
const STOP_WAIT_TICK: Duration = Duration::from_millis(100);
/// Relative seek issued after a track switch.
const SWITCH_SEEK_SEC: i64 = -5;

/// Command surface of a container adapter.
pub trait Container {
    fn name(&self) -> &'static str;

    fn capabilities(&self) -> &'static [&'static str];

    fn init(&mut self, files: &PlayFiles) -> Result<()>;

    fn update_tracks(&mut self, initial: bool) -> Result<()>;

    fn play(&mut self) -> Result<()>;

    fn stop(&mut self) -> Result<()>;

    /// Seek to `sec`, or by `sec` relative to the play position.
    fn seek(&mut self, sec: i64, absolute: bool) -> Result<()>;

    /// Seek `sec` away from a byte position / pts; -1 means "current".
    /// Returns the byte target on the byte seeking path, else 0.
    fn seek_rel(&mut self, pos: i64, pts: i64, sec: i64) -> Result<i64>;

    /// Length in seconds.
    fn length(&self) -> Result<i64>;

    fn switch_audio(&mut self, id: i32) -> Result<()>;

    fn switch_subtitle(&mut self, id: i32) -> Result<()>;

    fn info(&self, tag: &str) -> Result<String>;

    fn metadata(&self) -> Result<Vec<(String, String)>>;

    /// Whether the playback thread is running.
    fn status(&self) -> bool;

    fn last_pts(&self) -> Result<i64>;

    fn set_buffer_size(&mut self, size: usize);

    fn buffer_size(&self) -> usize;
}

/// Opens the inputs of one playback.
pub trait SourceOpener: Send {
    fn open(
        &self,
        files: &PlayFiles,
        opts: &DecoderOptions,
        state: &Arc<PlaybackState>,
    ) -> Result<Box<dyn DemuxerSource>>;
}

/// Opens the files with FFmpeg.
#[derive(Debug, Default, Clone, Copy)]
pub struct FfmpegOpener;

impl SourceOpener for FfmpegOpener {
    fn open(
        &self,
        files: &PlayFiles,
        opts: &DecoderOptions,
        state: &Arc<PlaybackState>,
    ) -> Result<Box<dyn DemuxerSource>> {
        let mut inputs = vec![open_input(&files.first, 0, opts, state)?];
        if let Some(second) = &files.second {
            info!("🎧 second input: {}", second);
            inputs.push(open_input(second, 1, opts, state)?);
        }
        Ok(Box::new(FfmpegDemuxer::new(inputs, opts, files.first.clone())))
    }
}

/// 容器 - FFmpeg backed container adapter
pub struct FfmpegContainer {
    decoder: DecoderOptions,
    playback: PlaybackOptions,
    opener: Box<dyn SourceOpener>,
    managers: Managers,
    output: SharedOutput,
    state: Arc<PlaybackState>,
    /// Held here while no playback thread owns it.
    source: Option<Box<dyn DemuxerSource>>,
    inputs: Vec<InputInfo>,
    thread: Option<PlaybackThread>,
    /// Seek requested before the thread was started.
    pending_seek: Option<DemuxCommand>,
    running: bool,
}

impl FfmpegContainer {
    pub fn new(decoder: DecoderOptions, playback: PlaybackOptions, output: SharedOutput) -> Self {
        Self::with_opener(decoder, playback, output, Box::new(FfmpegOpener))
    }

    pub fn with_opener(
        decoder: DecoderOptions,
        playback: PlaybackOptions,
        output: SharedOutput,
        opener: Box<dyn SourceOpener>,
    ) -> Self {
        Self {
            decoder,
            playback,
            opener,
            managers: Managers::new(),
            output,
            state: Arc::new(PlaybackState::new()),
            source: None,
            inputs: Vec::new(),
            thread: None,
            pending_seek: None,
            running: false,
        }
    }

    pub fn managers(&self) -> &Managers {
        &self.managers
    }

    pub fn state(&self) -> &Arc<PlaybackState> {
        &self.state
    }

    /// Track lists as reported to the caller.
    pub fn tracks(&self) -> (Vec<TrackEntry>, Vec<TrackEntry>, Vec<TrackEntry>) {
        (
            self.managers.video.list(),
            self.managers.audio.list(),
            self.managers.subtitle.list(),
        )
    }

    pub fn pause(&mut self) -> Result<()> {
        self.require_open()?;
        self.state.paused.store(true, Ordering::SeqCst);
        self.output.lock().pause();
        info!("⏸ paused");
        Ok(())
    }

    pub fn resume(&mut self) -> Result<()> {
        self.require_open()?;
        self.state.paused.store(false, Ordering::SeqCst);
        self.output.lock().play();
        info!("▶ resumed");
        Ok(())
    }

    fn require_open(&self) -> Result<()> {
        if self.running {
            Ok(())
        } else {
            Err(ContainerError::Other("no input open".to_string()))
        }
    }

    fn is_ts_byte_seeking(&self) -> bool {
        self.decoder.ts_bytes_seeking && self.inputs.first().map_or(false, |i| i.ts_discont)
    }

    fn ts_byte_rate(&self) -> i64 {
        match self.inputs.first().map_or(0, |i| i.bit_rate) {
            0 => TS_DEFAULT_BYTE_RATE,
            bit_rate => bit_rate / 8,
        }
    }

    fn has_av_track(&self) -> bool {
        self.managers.video.has_current() || self.managers.audio.has_current()
    }

    fn queue_seek(&mut self, cmd: DemuxCommand) -> Result<()> {
        match &self.thread {
            Some(thread) if !thread.is_finished() => thread.send(cmd),
            _ => {
                debug!("{} seek {:?} queued until play", log_ctx(), cmd);
                self.pending_seek = Some(cmd);
                Ok(())
            }
        }
    }

    /// Metadata of the stream behind the current video or audio track.
    fn track_metadata(&self, video: bool) -> Option<&[(String, String)]> {
        let manager = if video {
            &self.managers.video
        } else {
            &self.managers.audio
        };
        let track = manager.current()?;
        let stream = self.inputs.get(track.av_idx)?.stream(track.stream_index)?;
        Some(&stream.metadata)
    }

    fn take_back_source(&mut self) {
        if let Some(thread) = self.thread.take() {
            if let Some(source) = thread.join() {
                self.source = Some(source);
            }
        }
    }
}

/// Polls until the playback thread has exited, sleeping at most `ticks`
/// times.
fn wait_for_thread(state: &PlaybackState, mut ticks: u32, mut sleep: impl FnMut()) -> bool {
    while state.thread_started.load(Ordering::SeqCst) {
        if ticks == 0 {
            return false;
        }
        ticks -= 1;
        debug!("waiting for playback thread, {} more tries", ticks);
        sleep();
    }
    true
}

fn search_meta<'a>(metadata: &'a [(String, String)], key: &str) -> Option<&'a str> {
    metadata
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

impl Container for FfmpegContainer {
    fn name(&self) -> &'static str {
        "FFMPEG"
    }

    fn capabilities(&self) -> &'static [&'static str] {
        CAPABILITIES
    }

    fn init(&mut self, files: &PlayFiles) -> Result<()> {
        if files.first.is_empty() {
            return Err(ContainerError::Null("first file"));
        }
        if self.running {
            error!("{} container already running", log_ctx());
            return Err(ContainerError::Running);
        }
        info!("{} 📂 init: {}", log_ctx(), files.first);

        let state = &self.state;
        state.abort.store(false, Ordering::SeqCst);
        state.terminating.store(false, Ordering::SeqCst);
        state.paused.store(false, Ordering::SeqCst);
        state.backward.store(false, Ordering::SeqCst);
        state.ts_live.store(self.playback.ts_live_mode, Ordering::SeqCst);
        state.loop_mode.store(self.playback.loop_mode, Ordering::SeqCst);
        state.noprobe.store(self.playback.noprobe, Ordering::SeqCst);
        state.latest_pts.store(0, Ordering::SeqCst);

        let source = self.opener.open(files, &self.decoder, &self.state)?;
        self.inputs = (0..source.input_count())
            .filter_map(|i| source.info(i).cloned())
            .collect();
        self.source = Some(source);
        self.pending_seek = None;
        self.running = true;
        self.update_tracks(true)
    }

    fn update_tracks(&mut self, initial: bool) -> Result<()> {
        if self.state.terminating.load(Ordering::SeqCst) {
            debug!("update_tracks while terminating, ignored");
            return Ok(());
        }
        self.require_open()?;

        self.managers.video.init_update();
        self.managers.audio.init_update();

        for (av_idx, input) in self.inputs.iter().enumerate() {
            for track in input.tracks(av_idx, &self.decoder, initial) {
                let manager = match track.kind {
                    TrackKind::Video => &self.managers.video,
                    TrackKind::Audio => &self.managers.audio,
                    TrackKind::Subtitle => &self.managers.subtitle,
                };
                manager.add(track);
            }
        }

        info!(
            "📋 tracks: {} video, {} audio, {} subtitle",
            self.managers.video.len(),
            self.managers.audio.len(),
            self.managers.subtitle.len()
        );
        Ok(())
    }

    fn play(&mut self) -> Result<()> {
        self.require_open()?;
        if self.state.thread_started.load(Ordering::SeqCst) {
            warn!("{} a playback thread already exists", log_ctx());
            return Err(ContainerError::Other("playback thread already started".to_string()));
        }
        // a thread that ran to the end still owns the source
        self.take_back_source();

        let source = self
            .source
            .take()
            .ok_or_else(|| ContainerError::Other("input lost".to_string()))?;
        let thread = PlaybackThread::spawn(PlaybackContext {
            source,
            managers: self.managers.clone(),
            output: self.output.clone(),
            state: self.state.clone(),
            ts_bytes_seeking: self.decoder.ts_bytes_seeking,
        })?;
        if let Some(cmd) = self.pending_seek.take() {
            thread.send(cmd)?;
        }
        self.thread = Some(thread);
        self.output.lock().play();
        info!("{} ▶ playback started", log_ctx());
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if !self.running {
            error!("{} container not running", log_ctx());
            return Err(ContainerError::Other("container not running".to_string()));
        }
        self.state.playing.store(false, Ordering::SeqCst);
        self.state.abort.store(true, Ordering::SeqCst);

        if !wait_for_thread(&self.state, STOP_WAIT_TICKS, || thread::sleep(STOP_WAIT_TICK)) {
            // still running, stop may be retried
            warn!("{} ⚠️ timeout waiting for playback thread", log_ctx());
            return Err(ContainerError::Other("timeout waiting for thread".to_string()));
        }

        self.state.terminating.store(true, Ordering::SeqCst);
        self.take_back_source();
        self.source = None;
        self.inputs.clear();
        self.pending_seek = None;
        self.managers.video.clear();
        self.managers.audio.clear();
        self.managers.subtitle.clear();
        self.output.lock().clear();
        self.running = false;
        info!("{} ⏹ container stopped", log_ctx());
        Ok(())
    }

    fn seek(&mut self, mut sec: i64, absolute: bool) -> Result<()> {
        self.require_open()?;
        if !absolute {
            if sec == 0 {
                return Err(ContainerError::Other("relative seek by 0".to_string()));
            }
            let play_pts = self.output.lock().play_pts();
            if play_pts == INVALID_PTS {
                return Err(ContainerError::Other("fail to get current PTS".to_string()));
            }
            sec += play_pts / PTS_CLOCK;
        }
        let sec = sec.max(0);
        info!("{} ⏩ goto {} sec", log_ctx(), sec);

        if !self.has_av_track() {
            return Err(ContainerError::Other("no track available to seek".to_string()));
        }
        if !self.state.is_playing() {
            return Ok(());
        }

        let cmd = if self.is_ts_byte_seeking() {
            DemuxCommand::SeekBytes((sec * self.ts_byte_rate()).max(0))
        } else {
            DemuxCommand::SeekTime(sec * TIME_BASE)
        };
        self.queue_seek(cmd)
    }

    fn seek_rel(&mut self, pos: i64, pts: i64, sec: i64) -> Result<i64> {
        self.require_open()?;
        let video = self.managers.video.has_current();
        if !video && !self.managers.audio.has_current() {
            return Err(ContainerError::Other("no track available to seek".to_string()));
        }

        let pos = if pos == -1 {
            self.state.byte_position.load(Ordering::SeqCst)
        } else {
            pos
        };
        let pts = if pts == -1 {
            if video {
                self.state.current_video_pts.load(Ordering::SeqCst)
            } else {
                self.state.current_audio_pts.load(Ordering::SeqCst)
            }
        } else {
            pts
        };

        if self.is_ts_byte_seeking() {
            let target = pos + sec * self.ts_byte_rate();
            if target < 0 {
                error!("{} end of file reached", log_ctx());
                return Err(ContainerError::EndOfFile);
            }
            self.queue_seek(DemuxCommand::SeekBytes(target))?;
            return Ok(target);
        }

        let sec = (sec + pts / PTS_CLOCK).max(0);
        self.queue_seek(DemuxCommand::SeekTime(sec * TIME_BASE))?;
        Ok(0)
    }

    fn length(&self) -> Result<i64> {
        self.require_open()?;
        let current = self
            .managers
            .video
            .current()
            .or_else(|| self.managers.audio.current());
        match current {
            Some(track) if track.duration_ms == 0 => {
                Err(ContainerError::Other("track has no duration".to_string()))
            }
            Some(track) => Ok(track.duration_ms / 1000),
            None => self
                .inputs
                .first()
                .map(|i| i.duration / TIME_BASE)
                .ok_or_else(|| ContainerError::Other("no track nor input".to_string())),
        }
    }

    fn switch_audio(&mut self, id: i32) -> Result<()> {
        self.require_open()?;
        if !self.managers.audio.set_current(id) {
            return Err(ContainerError::Stream(format!("no audio track {}", id)));
        }
        if let Err(e) = self.seek(SWITCH_SEEK_SEC, false) {
            debug!("seek after audio switch: {}", e);
        }
        Ok(())
    }

    fn switch_subtitle(&mut self, id: i32) -> Result<()> {
        self.require_open()?;
        if !self.managers.subtitle.set_current(id) {
            return Err(ContainerError::Stream(format!("no subtitle track {}", id)));
        }
        // packets already read past were dropped, read them again
        if let Err(e) = self.seek(SWITCH_SEEK_SEC, false) {
            debug!("seek after subtitle switch: {}", e);
        }
        Ok(())
    }

    fn info(&self, tag: &str) -> Result<String> {
        self.require_open()?;
        let Some(&(_, key)) = METADATA_MAP.iter().find(|(t, _)| *t == tag) else {
            return Ok("not found".to_string());
        };
        let found = self
            .inputs
            .first()
            .and_then(|i| search_meta(&i.metadata, key))
            .or_else(|| self.track_metadata(false).and_then(|m| search_meta(m, key)))
            .or_else(|| self.track_metadata(true).and_then(|m| search_meta(m, key)));
        match found {
            Some(value) => Ok(value.to_string()),
            None => {
                debug!("no metadata found for \"{}\"", tag);
                Ok("not found".to_string())
            }
        }
    }

    fn metadata(&self) -> Result<Vec<(String, String)>> {
        self.require_open()?;
        let mut all = Vec::new();
        if let Some(input) = self.inputs.first() {
            all.extend(input.metadata.iter().cloned());
        }
        for video in [true, false] {
            if let Some(m) = self.track_metadata(video) {
                all.extend(m.iter().cloned());
            }
        }
        Ok(all)
    }

    fn status(&self) -> bool {
        self.state.thread_started.load(Ordering::SeqCst)
    }

    fn last_pts(&self) -> Result<i64> {
        self.require_open()?;
        Ok(self.state.latest_pts.load(Ordering::SeqCst))
    }

    fn set_buffer_size(&mut self, size: usize) {
        info!("buffer size {} bytes", size);
        self.decoder.buffer_size = size;
    }

    fn buffer_size(&self) -> usize {
        self.decoder.buffer_size
    }
}

impl Drop for FfmpegContainer {
    fn drop(&mut self) {
        if self.running {
            if let Err(e) = self.stop() {
                warn!("stop on drop: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::output::{NullSink, Output};
    use crate::player::testing::*;
    use parking_lot::Mutex;
    use std::time::Instant;

    struct ScriptOpener {
        script: Mutex<Option<ScriptedSource>>,
    }

    impl SourceOpener for ScriptOpener {
        fn open(
            &self,
            _files: &PlayFiles,
            _opts: &DecoderOptions,
            _state: &Arc<PlaybackState>,
        ) -> Result<Box<dyn DemuxerSource>> {
            match self.script.lock().take() {
                Some(source) => Ok(Box::new(source)),
                None => Err(ContainerError::OpenError("gone".to_string())),
            }
        }
    }

    fn files() -> PlayFiles {
        PlayFiles {
            first: "/media/hdd/movie.ts".to_string(),
            second: None,
        }
    }

    fn container_with(
        decoder: DecoderOptions,
        input: crate::player::demuxer::InputInfo,
        packets: Vec<Pkt>,
    ) -> (FfmpegContainer, Recorder) {
        let (source, _) = ScriptedSource::new(vec![(input, packets)]);
        let video = Recorder::default();
        let output = Output::new(Box::new(video.clone()), Box::new(NullSink::new()), Box::new(NullSink::new()));
        let container = FfmpegContainer::with_opener(
            decoder,
            PlaybackOptions::default(),
            output.shared(),
            Box::new(ScriptOpener {
                script: Mutex::new(Some(source)),
            }),
        );
        (container, video)
    }

    fn wait_until(mut cond: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(Instant::now() < deadline, "timed out");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_commands_need_an_open_input() {
        let (mut c, _) = container_with(DecoderOptions::default(), ts_input(), vec![]);
        assert!(c.length().is_err());
        assert!(c.play().is_err());
        assert!(c.stop().is_err());
        assert!(c.seek(10, true).is_err());
        assert!(c.info("Title").is_err());
        assert!(!c.status());
        c.set_buffer_size(1 << 20);
        assert_eq!(c.buffer_size(), 1 << 20);
        assert!(c.capabilities().contains(&"mkv"));
        assert_eq!(c.name(), "FFMPEG");
    }

    #[test]
    fn test_init_builds_tracks_and_refuses_second_init() {
        let (mut c, _) = container_with(DecoderOptions::default(), ts_input(), vec![]);
        assert!(matches!(
            c.init(&PlayFiles::default()),
            Err(ContainerError::Null(_))
        ));
        c.init(&files()).unwrap();
        assert!(matches!(c.init(&files()), Err(ContainerError::Running)));

        let (video, audio, subs) = c.tracks();
        assert_eq!(video.len(), 1);
        assert_eq!(video[0].e, "V_MPEG4/ISO/AVC");
        assert_eq!(audio.len(), 2);
        assert_eq!(subs.len(), 1);
        // duration taken from the container: 10 s
        assert_eq!(c.length().unwrap(), 10);
    }

    #[test]
    fn test_update_tracks_keeps_audio_selection() {
        let (mut c, _) = container_with(DecoderOptions::default(), ts_input(), vec![]);
        c.init(&files()).unwrap();
        assert!(c.managers().audio.set_current(3));
        c.update_tracks(false).unwrap();
        assert_eq!(c.managers().audio.current().map(|t| t.id), Some(3));
        assert_eq!(c.managers().subtitle.len(), 1);
        assert!(c.switch_audio(77).is_err());
    }

    #[test]
    fn test_info_and_metadata() {
        let mut input = ts_input();
        input.metadata = vec![("title".into(), "News".into())];
        input.streams[1].metadata = vec![("language".into(), "deu".into())];
        let (mut c, _) = container_with(DecoderOptions::default(), input, vec![]);
        c.init(&files()).unwrap();
        assert_eq!(c.info("Title").unwrap(), "News");
        assert_eq!(c.info("Language").unwrap(), "deu");
        assert_eq!(c.info("Album").unwrap(), "not found");
        assert_eq!(c.info("Nonsense").unwrap(), "not found");
        let all = c.metadata().unwrap();
        assert!(all.contains(&("title".to_string(), "News".to_string())));
        assert!(all.contains(&("language".to_string(), "deu".to_string())));
    }

    #[test]
    fn test_seek_rel_byte_targets_on_ts() {
        let decoder = DecoderOptions {
            ts_bytes_seeking: true,
            ..DecoderOptions::default()
        };
        let (mut c, _) = container_with(decoder, ts_input(), vec![]);
        c.init(&files()).unwrap();
        assert_eq!(c.seek_rel(1000, 0, 2).unwrap(), 1000 + 2 * TS_DEFAULT_BYTE_RATE);
        assert!(matches!(c.seek_rel(0, 0, -1), Err(ContainerError::EndOfFile)));
        // time path when byte seeking is off
        c.decoder.ts_bytes_seeking = false;
        assert_eq!(c.seek_rel(-1, 90000 * 30, -10).unwrap(), 0);
        assert_eq!(c.pending_seek, Some(DemuxCommand::SeekTime(20 * TIME_BASE)));
    }

    #[test]
    fn test_relative_seek_needs_a_position() {
        let (mut c, _) = container_with(DecoderOptions::default(), ts_input(), vec![]);
        c.init(&files()).unwrap();
        assert!(c.seek(0, false).is_err());
        // nothing written yet, so there is no play position
        assert!(c.seek(5, false).is_err());
        // not playing: accepted and ignored
        c.seek(5, true).unwrap();
        assert_eq!(c.pending_seek, None);
    }

    #[test]
    fn test_play_runs_to_end_and_stop_closes() {
        let packets = vec![pkt(0, 0, b"V1", 3600), pkt(0, 0, b"V2", 7200)];
        let (mut c, video) = container_with(DecoderOptions::default(), ts_input(), packets);
        c.init(&files()).unwrap();
        c.play().unwrap();
        wait_until(|| !c.status());
        assert_eq!(video.writes().len(), 2);
        assert_eq!(c.last_pts().unwrap(), 7200);

        c.stop().unwrap();
        assert!(c.length().is_err());
        assert!(c.managers().video.is_empty());
        assert!(c.stop().is_err());
    }

    #[test]
    fn test_wait_for_thread_ticks() {
        let state = PlaybackState::new();
        let mut sleeps = 0;
        assert!(wait_for_thread(&state, STOP_WAIT_TICKS, || sleeps += 1));
        assert_eq!(sleeps, 0);

        state.thread_started.store(true, Ordering::SeqCst);
        let mut sleeps = 0;
        assert!(!wait_for_thread(&state, STOP_WAIT_TICKS, || sleeps += 1));
        assert_eq!(sleeps, STOP_WAIT_TICKS);

        // thread exits after the third tick
        let mut sleeps = 0;
        assert!(wait_for_thread(&state, STOP_WAIT_TICKS, || {
            sleeps += 1;
            if sleeps == 3 {
                state.thread_started.store(false, Ordering::SeqCst);
            }
        }));
        assert_eq!(sleeps, 3);
    }

    #[test]
    fn test_relative_seek_with_null_outputs() {
        let (source, _) = ScriptedSource::new(vec![(
            ts_input(),
            vec![pkt(0, 0, b"V1", 3600), pkt(0, 0, b"V2", 7200)],
        )]);
        let mut c = FfmpegContainer::with_opener(
            DecoderOptions::default(),
            PlaybackOptions::default(),
            Output::null().shared(),
            Box::new(ScriptOpener {
                script: Mutex::new(Some(source)),
            }),
        );
        c.init(&files()).unwrap();
        assert!(c.seek(5, false).is_err());

        c.play().unwrap();
        // the null sinks report the last written pts, so the loop can finish
        wait_until(|| !c.status());
        assert_eq!(c.output.lock().play_pts(), 7200);
        c.seek(5, false).unwrap();
        c.stop().unwrap();
    }

    #[test]
    fn test_play_twice_while_running_fails() {
        let packets = vec![pkt(0, 0, b"V1", 3600)];
        let (mut c, _) = container_with(DecoderOptions::default(), ts_input(), packets);
        c.init(&files()).unwrap();
        c.state().paused.store(true, Ordering::SeqCst);
        c.play().unwrap();
        assert!(c.status());
        assert!(c.play().is_err());
        c.resume().unwrap();
        c.stop().unwrap();
        assert!(!c.status());
    }
}
