//! Pipeline events and the sinks that receive them.
//!
//! Components report what happened through an injected [`Observer`] instead
//! of logging on their own. Binaries plug in [`LogObserver`]; tests use
//! [`VecObserver`].

use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use log::{info, warn};

/// Something worth reporting. Counters carried here are informational and
/// never feed back into pipeline decisions.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    SourceSelected {
        path: PathBuf,
        reason: String,
    },
    LineSkipped {
        line: u64,
        reason: String,
    },
    BatchPublished {
        size: usize,
        total_produced: u64,
        lines_processed: u64,
    },
    PartitionRouted {
        sensor_type: String,
        day: String,
        table: String,
    },
    MessageSkipped {
        ordinal: u64,
        reason: String,
    },
    ReadInterrupted {
        ordinal: u64,
        reason: String,
    },
    BatchFlushed {
        size: usize,
        total_inserted: u64,
        messages_consumed: u64,
    },
    ThroughputSample {
        rows_per_sec: f64,
        window: Duration,
        total_inserted: u64,
    },
    /// `count` carries the storage error text when the hour failed.
    QueryCompleted {
        hour: u8,
        count: Result<u64, String>,
        elapsed: Duration,
    },
}

pub trait Observer: Send + Sync {
    fn observe(&self, event: PipelineEvent);
}

impl<O: Observer + ?Sized> Observer for &O {
    fn observe(&self, event: PipelineEvent) {
        (**self).observe(event)
    }
}

/// Drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl Observer for NullObserver {
    fn observe(&self, _event: PipelineEvent) {}
}

/// Renders events through the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl Observer for LogObserver {
    fn observe(&self, event: PipelineEvent) {
        match event {
            PipelineEvent::SourceSelected { path, reason } => {
                info!("Reading source {} ({reason})", path.display());
            }
            PipelineEvent::LineSkipped { line, reason } => {
                warn!("Failed to parse line {line}: {reason}");
            }
            PipelineEvent::BatchPublished {
                size,
                total_produced,
                lines_processed,
            } => {
                info!(
                    "Produced {size} messages (total: {total_produced}, processed lines: {lines_processed})"
                );
            }
            PipelineEvent::PartitionRouted {
                sensor_type,
                day,
                table,
            } => {
                info!("Detected sensor_type={sensor_type}, day={day}, routing to table {table}");
            }
            PipelineEvent::MessageSkipped { ordinal, reason } => {
                warn!("Failed to decode message {ordinal}: {reason}");
            }
            PipelineEvent::ReadInterrupted { ordinal, reason } => {
                warn!("Read stopped after message {ordinal}: {reason}");
            }
            PipelineEvent::BatchFlushed {
                size,
                total_inserted,
                messages_consumed,
            } => {
                info!(
                    "Inserted {size} records (total: {total_inserted}, consumed messages: {messages_consumed})"
                );
            }
            PipelineEvent::ThroughputSample {
                rows_per_sec,
                window,
                total_inserted,
            } => {
                info!(
                    "Throughput: {rows_per_sec:.2} records/s over {:.1}s (total inserted: {total_inserted})",
                    window.as_secs_f64()
                );
            }
            PipelineEvent::QueryCompleted {
                hour,
                count,
                elapsed,
            } => match count {
                Ok(count) => info!(
                    "Hour {hour}: {count} records ({:.2} ms)",
                    elapsed.as_secs_f64() * 1000.0
                ),
                Err(error) => warn!("Hour {hour}: query failed: {error}"),
            },
        }
    }
}

/// Collects events in memory.
#[derive(Debug, Default)]
pub struct VecObserver {
    events: Mutex<Vec<PipelineEvent>>,
}

impl VecObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Events for which `pick` returns `Some`, in arrival order.
    pub fn filter_map<T>(&self, pick: impl Fn(&PipelineEvent) -> Option<T>) -> Vec<T> {
        self.events().iter().filter_map(pick).collect()
    }
}

impl Observer for VecObserver {
    fn observe(&self, event: PipelineEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
