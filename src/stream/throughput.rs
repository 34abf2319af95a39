use std::time::Duration;

use crate::clock::Clock;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThroughputSample {
    pub rows_per_sec: f64,
    pub window: Duration,
    pub total_inserted: u64,
}

/// Windowed insert rate. Reads the authoritative running total and never
/// modifies it; only the window bookkeeping resets after each sample.
#[derive(Debug)]
pub struct ThroughputSampler<C: Clock> {
    clock: C,
    interval: Duration,
    window_start: u64,
    window_base: u64,
}

impl<C: Clock> ThroughputSampler<C> {
    pub fn new(clock: C, interval: Duration) -> Self {
        let window_start = clock.now();
        Self {
            clock,
            interval,
            window_start,
            window_base: 0,
        }
    }

    /// A sample once at least one interval has passed since the last one.
    pub fn sample(&mut self, total_inserted: u64) -> Option<ThroughputSample> {
        let window = self.clock.since(self.window_start);
        if window < self.interval {
            return None;
        }
        let delta = total_inserted.saturating_sub(self.window_base);
        let secs = window.as_secs_f64();
        let rows_per_sec = if secs > 0.0 { delta as f64 / secs } else { 0.0 };

        self.window_start = self.clock.now();
        self.window_base = total_inserted;
        Some(ThroughputSample {
            rows_per_sec,
            window,
            total_inserted,
        })
    }
}
