use ffmpeg_next::Rational;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;

/// Marker for an unknown 90 kHz timestamp.
pub const INVALID_PTS: i64 = 0x2_0000_0000;

pub const PTS_CLOCK: i64 = 90_000;

/// FFmpeg `AV_TIME_BASE` (microseconds).
pub const TIME_BASE: i64 = 1_000_000;

/// `a * b / c` rounded to nearest, computed without overflow.
pub fn rescale(a: i64, b: i64, c: i64) -> i64 {
    if c <= 0 {
        return 0;
    }
    let prod = a as i128 * b as i128;
    let c = c as i128;
    let r = c / 2;
    let v = if prod < 0 { -((-prod + r) / c) } else { (prod + r) / c };
    v as i64
}

/// Convert a stream timestamp to 90 kHz, relative to the container start.
pub fn calc_pts(pts: Option<i64>, time_base: Rational, start_time: Option<i64>) -> i64 {
    let Some(mut pts) = pts else {
        return INVALID_PTS;
    };
    if time_base.denominator() > 0 {
        pts = rescale(
            pts,
            time_base.numerator() as i64 * PTS_CLOCK,
            time_base.denominator() as i64,
        );
    }
    if let Some(start) = start_time {
        pts -= PTS_CLOCK * start / TIME_BASE;
    }
    if pts < 0 {
        INVALID_PTS
    } else {
        pts
    }
}

/// 播放时钟 - 90 kHz
#[derive(Clone)]
pub struct PlaybackClock {
    inner: Arc<Mutex<ClockInner>>,
}

struct ClockInner {
    base_pts: i64,
    base_instant: Instant,
    paused: bool,
    paused_at: i64,
}

impl ClockInner {
    fn now(&self) -> i64 {
        if self.paused {
            self.paused_at
        } else {
            let elapsed = self.base_instant.elapsed().as_micros() as i64;
            self.base_pts + rescale(elapsed, PTS_CLOCK, TIME_BASE)
        }
    }
}

impl PlaybackClock {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(ClockInner {
                base_pts: 0,
                base_instant: Instant::now(),
                paused: true,
                paused_at: 0,
            })),
        }
    }

    /// 获取当前播放时间（90 kHz）
    pub fn now(&self) -> i64 {
        self.inner.lock().now()
    }

    /// 设置播放位置
    pub fn set_time(&self, pts: i64) {
        let mut inner = self.inner.lock();
        inner.base_pts = pts;
        inner.base_instant = Instant::now();
        inner.paused_at = pts;
    }

    /// 开始播放
    pub fn play(&self) {
        let mut inner = self.inner.lock();
        if inner.paused {
            inner.base_pts = inner.paused_at;
            inner.base_instant = Instant::now();
            inner.paused = false;
        }
    }

    /// 暂停播放
    pub fn pause(&self) {
        let mut inner = self.inner.lock();
        if !inner.paused {
            inner.paused_at = inner.now();
            inner.paused = true;
        }
    }

    pub fn is_paused(&self) -> bool {
        self.inner.lock().paused
    }
}

impl Default for PlaybackClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Decides when the sinks have drained after the demuxer hit end of input.
#[derive(Debug, Clone)]
pub struct FinishTimer {
    max_injected_pts: i64,
    last_play_pts: i64,
    stalled_ticks: u32,
    finished: bool,
}

impl FinishTimer {
    /// Ticks (100 ms each) without play progress before giving up.
    pub const MAX_STALLED_TICKS: u32 = 20;
    /// Tolerance below the last injected pts counted as "played out".
    const END_MARGIN: i64 = PTS_CLOCK / 5;

    pub fn new() -> Self {
        Self {
            max_injected_pts: INVALID_PTS,
            last_play_pts: INVALID_PTS,
            stalled_ticks: 0,
            finished: false,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn update_max_injected_pts(&mut self, pts: i64) {
        if pts == INVALID_PTS {
            return;
        }
        if self.max_injected_pts == INVALID_PTS || pts > self.max_injected_pts {
            self.max_injected_pts = pts;
        }
    }

    pub fn max_injected_pts(&self) -> i64 {
        self.max_injected_pts
    }

    pub fn update(&mut self, play_pts: i64) {
        if self.finished {
            return;
        }
        if self.max_injected_pts == INVALID_PTS {
            // nothing was injected, nothing to wait for
            self.finished = true;
            return;
        }
        if play_pts != INVALID_PTS && play_pts + Self::END_MARGIN >= self.max_injected_pts {
            self.finished = true;
            return;
        }
        if play_pts == INVALID_PTS || play_pts == self.last_play_pts {
            self.stalled_ticks += 1;
        } else {
            self.stalled_ticks = 0;
        }
        self.last_play_pts = play_pts;
        if self.stalled_ticks >= Self::MAX_STALLED_TICKS {
            self.finished = true;
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl Default for FinishTimer {
    fn default() -> Self {
        Self::new()
    }
}
