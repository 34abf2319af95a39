//! Batch publisher: source lines to keyed channel messages.

use std::time::{Duration, Instant};

use crate::bus::{ChannelMessage, Publish};
use crate::config::PipelineConfig;
use crate::ingest::source::SourceLine;
use crate::observe::{Observer, PipelineEvent};
use crate::record::Measurement;
use crate::Result;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PublishStats {
    /// Data lines read from the source, malformed ones included.
    pub lines: u64,
    pub produced: u64,
    pub batches: u64,
    pub skipped: u64,
    pub duration: Duration,
}

impl PublishStats {
    pub fn throughput(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.produced as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }
}

/// Groups measurements into bounded batches and hands each full batch to the
/// channel in one call. Messages are keyed by sensor id.
pub struct BatchPublisher<P: Publish, O: Observer> {
    channel: P,
    observer: O,
    batch_size: usize,
    batch: Vec<ChannelMessage>,
    stats: PublishStats,
}

impl<P: Publish, O: Observer> BatchPublisher<P, O> {
    pub fn new(channel: P, config: &PipelineConfig, observer: O) -> Self {
        let batch_size = config.publish_batch_size.max(1);
        Self {
            channel,
            observer,
            batch_size,
            batch: Vec::with_capacity(batch_size),
            stats: PublishStats::default(),
        }
    }

    /// Publish every line of `source`. Bad lines are skipped; a failed read
    /// or a failed publish aborts the run.
    pub fn run<I>(mut self, source: I) -> Result<PublishStats>
    where
        I: IntoIterator<Item = Result<SourceLine>>,
    {
        let start = Instant::now();
        for line in source {
            let SourceLine { line, record } = line?;
            self.stats.lines += 1;
            match record {
                Ok(measurement) => self.push(line, &measurement)?,
                Err(err) => self.skip(line, err.to_string()),
            }
        }
        self.flush()?;
        self.stats.duration = start.elapsed();
        Ok(self.stats)
    }

    /// Queue one measurement, flushing when the batch is full.
    pub fn push(&mut self, line: u64, measurement: &Measurement) -> Result<()> {
        let value = match serde_json::to_vec(measurement) {
            Ok(value) => value,
            Err(err) => {
                self.skip(line, format!("serialize: {err}"));
                return Ok(());
            }
        };
        self.batch
            .push(ChannelMessage::new(measurement.channel_key(), value));
        if self.batch.len() >= self.batch_size {
            self.flush()?;
        }
        Ok(())
    }

    pub fn stats(&self) -> &PublishStats {
        &self.stats
    }

    fn skip(&mut self, line: u64, reason: String) {
        self.stats.skipped += 1;
        self.observer
            .observe(PipelineEvent::LineSkipped { line, reason });
    }

    fn flush(&mut self) -> Result<()> {
        if self.batch.is_empty() {
            return Ok(());
        }
        self.channel.publish(&self.batch)?;
        let size = self.batch.len();
        self.stats.produced += size as u64;
        self.stats.batches += 1;
        self.batch.clear();
        self.observer.observe(PipelineEvent::BatchPublished {
            size,
            total_produced: self.stats.produced,
            lines_processed: self.stats.lines,
        });
        Ok(())
    }
}
