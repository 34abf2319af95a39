use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A source of nanosecond readings.
///
/// Throughput sampling only compares two readings of the same clock, so any
/// monotonic origin works.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> u64;

    /// Time elapsed since an earlier reading of this clock.
    fn since(&self, earlier: u64) -> Duration {
        Duration::from_nanos(self.now().saturating_sub(earlier))
    }
}

/// Nanoseconds since the clock was created, read through `quanta`.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    source: quanta::Clock,
    origin: quanta::Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        let source = quanta::Clock::new();
        let origin = source.now();
        Self { source, origin }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> u64 {
        let elapsed = self.source.now().duration_since(self.origin);
        u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX)
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now_ns: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.now_ns.fetch_add(by.as_nanos() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.now_ns.load(Ordering::SeqCst)
    }
}
