use std::time::{Duration, Instant};

/// Wall-clock delta source for the frame loop.
///
/// Deltas are clamped so a debugger pause or a minimized window does not
/// fast-forward every engine clock.
#[derive(Debug, Clone)]
pub struct FrameClock {
    last: Instant,
    frames: u64,
    dt_min: Duration,
    dt_max: Duration,
}

impl FrameClock {
    pub const DEFAULT_MIN: Duration = Duration::from_micros(100);
    pub const DEFAULT_MAX: Duration = Duration::from_millis(250);

    pub fn new() -> Self {
        Self::with_clamps(Self::DEFAULT_MIN, Self::DEFAULT_MAX)
    }

    pub fn with_clamps(dt_min: Duration, dt_max: Duration) -> Self {
        debug_assert!(dt_min <= dt_max);
        Self {
            last: Instant::now(),
            frames: 0,
            dt_min,
            dt_max,
        }
    }

    /// Restarts the baseline, e.g. after the window regains focus.
    pub fn reset(&mut self) {
        self.last = Instant::now();
    }

    /// Number of ticks so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Returns the clamped time since the previous tick, in seconds.
    pub fn tick(&mut self) -> f32 {
        let now = Instant::now();
        let dt = self.clamp(now.saturating_duration_since(self.last));
        self.last = now;
        self.frames = self.frames.wrapping_add(1);
        dt.as_secs_f32()
    }

    fn clamp(&self, dt: Duration) -> Duration {
        dt.clamp(self.dt_min, self.dt_max)
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}
