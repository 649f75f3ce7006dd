// src/time.rs
//! Scene-time interval timer used to pace periodic maintenance (shape-cache compaction).

/// Repeating timer driven by explicit `tick(dt)` calls, so it follows scene time
/// rather than the wall clock.
#[derive(Debug, Clone, Copy)]
pub struct IntervalTimer {
    interval: f32,
    elapsed: f32,
}

impl IntervalTimer {
    /// `interval <= 0` fires on every tick.
    #[inline(always)]
    pub fn new(interval: f32) -> Self {
        Self { interval: interval.max(0.0), elapsed: 0.0 }
    }

    /// Advances by `dt` seconds. Returns `true` once per elapsed interval; missed
    /// intervals collapse into a single firing.
    #[inline(always)]
    pub fn tick(&mut self, dt: f32) -> bool {
        if dt.is_finite() && dt > 0.0 {
            self.elapsed += dt;
        }
        if self.elapsed < self.interval {
            return false;
        }
        self.elapsed = if self.interval > 0.0 { self.elapsed % self.interval } else { 0.0 };
        true
    }

    /// Seconds until the next firing.
    #[inline(always)]
    pub fn remaining(&self) -> f32 {
        (self.interval - self.elapsed).max(0.0)
    }
}
