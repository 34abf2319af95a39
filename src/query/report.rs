use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use hdrhistogram::Histogram;

use crate::Error;

/// Outcome of one hour's count query.
#[derive(Debug)]
pub struct HourResult {
    pub hour: u8,
    pub count: Result<u64, Error>,
    pub elapsed: Duration,
}

impl fmt::Display for HourResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ms = self.elapsed.as_secs_f64() * 1000.0;
        match &self.count {
            Ok(count) => write!(f, "Hour {}: {count} records ({ms:.2} ms)", self.hour),
            Err(err) => write!(f, "Hour {}: error: {err} ({ms:.2} ms)", self.hour),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencySummary {
    pub p50: Duration,
    pub p99: Duration,
    pub max: Duration,
}

/// Per-hour counts of one table, keyed and rendered in ascending hour order
/// whatever order the queries finished in.
#[derive(Debug)]
pub struct QueryReport {
    pub table: String,
    pub workers: usize,
    pub results: BTreeMap<u8, HourResult>,
    pub elapsed: Duration,
}

impl QueryReport {
    pub fn new(
        table: String,
        workers: usize,
        results: impl IntoIterator<Item = HourResult>,
        elapsed: Duration,
    ) -> Self {
        let results = results.into_iter().map(|r| (r.hour, r)).collect();
        Self {
            table,
            workers,
            results,
            elapsed,
        }
    }

    /// Sum of the successful counts.
    pub fn total(&self) -> u64 {
        self.results
            .values()
            .filter_map(|r| r.count.as_ref().ok())
            .sum()
    }

    pub fn error_count(&self) -> usize {
        self.results.values().filter(|r| r.count.is_err()).count()
    }

    pub fn is_success(&self) -> bool {
        self.error_count() == 0
    }

    pub fn count(&self, hour: u8) -> Option<u64> {
        self.results
            .get(&hour)
            .and_then(|r| r.count.as_ref().ok().copied())
    }

    /// Query latency percentiles across every hour, errors included.
    pub fn latency(&self) -> Option<LatencySummary> {
        if self.results.is_empty() {
            return None;
        }
        let mut histogram = Histogram::<u64>::new(3).ok()?;
        for result in self.results.values() {
            histogram.record(result.elapsed.as_micros() as u64).ok()?;
        }
        Some(LatencySummary {
            p50: Duration::from_micros(histogram.value_at_quantile(0.50)),
            p99: Duration::from_micros(histogram.value_at_quantile(0.99)),
            max: Duration::from_micros(histogram.max()),
        })
    }
}

const RULE: &str = "-----------------------------------";

impl fmt::Display for QueryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f)?;
        writeln!(f, "{:<8} {:<15} {:<12}", "Hour", "Count", "Status")?;
        writeln!(f, "{RULE}")?;
        for result in self.results.values() {
            match &result.count {
                Ok(count) => writeln!(f, "{:<8} {:<15} {:<12}", result.hour, count, "OK")?,
                Err(err) => writeln!(f, "{:<8} {:<15} {:<12}", result.hour, "ERROR", err)?,
            }
        }
        writeln!(f, "{RULE}")?;
        writeln!(f, "Total records: {}", self.total())?;
        writeln!(f, "Total time: {:.2} seconds", self.elapsed.as_secs_f64())?;
        writeln!(f, "Errors: {}", self.error_count())?;
        if let Some(latency) = self.latency() {
            writeln!(
                f,
                "Query latency: p50 {:.2} ms, p99 {:.2} ms, max {:.2} ms",
                latency.p50.as_secs_f64() * 1000.0,
                latency.p99.as_secs_f64() * 1000.0,
                latency.max.as_secs_f64() * 1000.0
            )?;
        }
        Ok(())
    }
}
