//! Stream consumer and partition router.
//!
//! The first decodable message fixes the run's [`PartitionKey`]; its table
//! is created once and every later message is written there, whatever its
//! own sensor type or day. Rows are flushed in batches of
//! `write_batch_size` and once more when the channel runs dry.

use std::time::{Duration, Instant};

use crate::bus::{ChannelMessage, Subscribe};
use crate::clock::{Clock, MonotonicClock};
use crate::config::PipelineConfig;
use crate::observe::{Observer, PipelineEvent};
use crate::record::Measurement;
use crate::storage::Storage;
use crate::stream::throughput::ThroughputSampler;
use crate::table::PartitionKey;
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
enum RouterState {
    Uninitialized,
    Routed { key: PartitionKey, table: String },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConsumeStats {
    /// Messages read from the channel, undecodable ones included.
    pub consumed: u64,
    pub inserted: u64,
    pub batches: u64,
    pub skipped: u64,
    /// Table written to, if any message was routed.
    pub table: Option<String>,
    pub duration: Duration,
}

impl ConsumeStats {
    pub fn throughput(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.inserted as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }
}

/// Decode a channel message into a measurement that can be placed in an
/// hour partition.
pub fn decode_message(msg: &ChannelMessage) -> Result<Measurement> {
    let measurement: Measurement = serde_json::from_slice(&msg.value)
        .map_err(|err| Error::MalformedMessage(err.to_string()))?;
    if measurement.hour().is_none() {
        return Err(Error::MalformedMessage(format!(
            "timestamp {:?} has no hour of day",
            measurement.timestamp
        )));
    }
    Ok(measurement)
}

pub struct StreamRouter<S, T, O, C = MonotonicClock>
where
    S: Subscribe,
    T: Storage,
    O: Observer,
    C: Clock,
{
    channel: S,
    storage: T,
    observer: O,
    sampler: ThroughputSampler<C>,
    batch_size: usize,
    state: RouterState,
    batch: Vec<Measurement>,
    stats: ConsumeStats,
}

impl<S: Subscribe, T: Storage, O: Observer> StreamRouter<S, T, O, MonotonicClock> {
    pub fn new(channel: S, storage: T, config: &PipelineConfig, observer: O) -> Self {
        Self::with_clock(channel, storage, config, observer, MonotonicClock::new())
    }
}

impl<S: Subscribe, T: Storage, O: Observer, C: Clock> StreamRouter<S, T, O, C> {
    pub fn with_clock(
        channel: S,
        storage: T,
        config: &PipelineConfig,
        observer: O,
        clock: C,
    ) -> Self {
        let batch_size = config.write_batch_size.max(1);
        Self {
            channel,
            storage,
            observer,
            sampler: ThroughputSampler::new(clock, config.throughput_interval()),
            batch_size,
            state: RouterState::Uninitialized,
            batch: Vec::with_capacity(batch_size),
            stats: ConsumeStats::default(),
        }
    }

    /// The partition fixed by the first message, once there is one.
    pub fn partition(&self) -> Option<&PartitionKey> {
        match &self.state {
            RouterState::Uninitialized => None,
            RouterState::Routed { key, .. } => Some(key),
        }
    }

    /// Consume until the channel is exhausted.
    ///
    /// A read failure before any partition is routed is fatal; after that it
    /// ends the stream like a clean end would. Storage failures are always
    /// fatal.
    pub fn run(mut self) -> Result<ConsumeStats> {
        let start = Instant::now();
        loop {
            let msg = match self.channel.read() {
                Ok(Some(msg)) => msg,
                Ok(None) => break,
                Err(err) if self.partition().is_some() => {
                    self.observer.observe(PipelineEvent::ReadInterrupted {
                        ordinal: self.stats.consumed,
                        reason: err.to_string(),
                    });
                    break;
                }
                Err(err) => return Err(err),
            };
            self.stats.consumed += 1;
            self.handle(&msg)?;
        }
        self.flush()?;
        self.stats.duration = start.elapsed();
        Ok(self.stats)
    }

    fn handle(&mut self, msg: &ChannelMessage) -> Result<()> {
        let ordinal = self.stats.consumed;
        let measurement = match decode_message(msg) {
            Ok(m) => m,
            Err(err) => {
                self.skip(ordinal, err.to_string());
                return Ok(());
            }
        };

        if self.state == RouterState::Uninitialized {
            let key = match PartitionKey::for_measurement(&measurement) {
                Ok(key) => key,
                Err(err) => {
                    self.skip(ordinal, err.to_string());
                    return Ok(());
                }
            };
            self.route(key)?;
        }

        self.batch.push(measurement);
        if self.batch.len() >= self.batch_size {
            self.flush()?;
        }
        if let Some(sample) = self.sampler.sample(self.stats.inserted) {
            self.observer.observe(PipelineEvent::ThroughputSample {
                rows_per_sec: sample.rows_per_sec,
                window: sample.window,
                total_inserted: sample.total_inserted,
            });
        }
        Ok(())
    }

    fn route(&mut self, key: PartitionKey) -> Result<()> {
        self.storage.create_table_if_absent(&key)?;
        let table = key.table_name();
        self.observer.observe(PipelineEvent::PartitionRouted {
            sensor_type: key.sensor_type().to_string(),
            day: key.day().to_string(),
            table: table.clone(),
        });
        self.stats.table = Some(table.clone());
        self.state = RouterState::Routed { key, table };
        Ok(())
    }

    fn skip(&mut self, ordinal: u64, reason: String) {
        self.stats.skipped += 1;
        self.observer
            .observe(PipelineEvent::MessageSkipped { ordinal, reason });
    }

    fn flush(&mut self) -> Result<()> {
        if self.batch.is_empty() {
            return Ok(());
        }
        let RouterState::Routed { key, .. } = &self.state else {
            return Ok(());
        };
        self.storage.write_batch(key, &self.batch)?;
        let size = self.batch.len();
        self.stats.inserted += size as u64;
        self.stats.batches += 1;
        self.batch.clear();
        self.observer.observe(PipelineEvent::BatchFlushed {
            size,
            total_inserted: self.stats.inserted,
            messages_consumed: self.stats.consumed,
        });
        self.channel.commit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{MemoryTopic, Publish};
    use crate::clock::ManualClock;
    use crate::observe::VecObserver;
    use crate::storage::MemoryStorage;

    fn measurement(id: i64, sensor_type: &str, timestamp: &str) -> Measurement {
        Measurement {
            sensor_id: id,
            sensor_type: sensor_type.into(),
            timestamp: timestamp.into(),
            temperature: Some(20.0),
            ..Measurement::default()
        }
    }

    fn publish(topic: &MemoryTopic, rows: &[Measurement]) {
        let batch: Vec<ChannelMessage> = rows
            .iter()
            .map(|m| ChannelMessage::new(m.channel_key(), serde_json::to_vec(m).unwrap()))
            .collect();
        topic.publisher().publish(&batch).unwrap();
    }

    fn config(write_batch_size: usize) -> PipelineConfig {
        PipelineConfig {
            write_batch_size,
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn first_message_fixes_partition() {
        let topic = MemoryTopic::new(1);
        publish(
            &topic,
            &[
                measurement(1, "BME280", "2025-06-01T01:00:00"),
                measurement(2, "DHT22", "2025-06-02T02:00:00"),
            ],
        );
        let storage = MemoryStorage::new();
        let observer = VecObserver::new();

        let stats = StreamRouter::new(topic.subscriber("g").unwrap(), &storage, &config(25), &observer)
            .run()
            .unwrap();

        assert_eq!(stats.inserted, 2);
        assert_eq!(stats.table.as_deref(), Some("sensor_measurements_BME280_2025_06_01"));
        assert_eq!(storage.create_calls(), 1);
        assert_eq!(
            storage.table_names(),
            vec!["sensor_measurements_BME280_2025_06_01".to_string()]
        );
        let routed = observer.filter_map(|e| match e {
            PipelineEvent::PartitionRouted { table, .. } => Some(table.clone()),
            _ => None,
        });
        assert_eq!(routed.len(), 1);
    }

    #[test]
    fn bad_messages_are_skipped_before_routing() {
        let topic = MemoryTopic::new(1);
        topic
            .publisher()
            .publish(&[
                ChannelMessage::new("1", b"not json".to_vec()),
                ChannelMessage::new(
                    "1",
                    serde_json::to_vec(&measurement(1, "BME280", "2025-06-01")).unwrap(),
                ),
            ])
            .unwrap();
        publish(&topic, &[measurement(3, "BME280", "2025-06-01T05:00:00")]);
        let storage = MemoryStorage::new();
        let observer = VecObserver::new();

        let stats = StreamRouter::new(topic.subscriber("g").unwrap(), &storage, &config(25), &observer)
            .run()
            .unwrap();

        assert_eq!(stats.consumed, 3);
        assert_eq!(stats.skipped, 2);
        assert_eq!(stats.inserted, 1);
        let skipped = observer.filter_map(|e| match e {
            PipelineEvent::MessageSkipped { ordinal, .. } => Some(*ordinal),
            _ => None,
        });
        assert_eq!(skipped, vec![1, 2]);
    }

    #[test]
    fn flushes_full_batches_then_tail() {
        let topic = MemoryTopic::new(2);
        let rows: Vec<Measurement> = (0..7)
            .map(|i| measurement(i, "BME280", &format!("2025-06-01T0{i}:00:00")))
            .collect();
        publish(&topic, &rows);
        let storage = MemoryStorage::new();

        let stats = StreamRouter::new(
            topic.subscriber("g").unwrap(),
            &storage,
            &config(3),
            crate::observe::NullObserver,
        )
        .run()
        .unwrap();

        assert_eq!(storage.batch_sizes(), vec![3, 3, 1]);
        assert_eq!(stats.batches, 3);
        assert_eq!(stats.inserted, 7);
    }

    #[test]
    fn empty_channel_creates_nothing() {
        let topic = MemoryTopic::new(1);
        let storage = MemoryStorage::new();
        let stats = StreamRouter::new(
            topic.subscriber("g").unwrap(),
            &storage,
            &config(3),
            crate::observe::NullObserver,
        )
        .run()
        .unwrap();
        assert_eq!(stats, ConsumeStats { duration: stats.duration, ..ConsumeStats::default() });
        assert_eq!(storage.create_calls(), 0);
        assert!(storage.batch_sizes().is_empty());
    }

    #[test]
    fn throughput_samples_do_not_touch_totals() {
        let topic = MemoryTopic::new(1);
        let rows: Vec<Measurement> = (0..4)
            .map(|i| measurement(i, "BME280", "2025-06-01T01:00:00"))
            .collect();
        publish(&topic, &rows);
        let storage = MemoryStorage::new();
        let observer = VecObserver::new();
        let clock = ManualClock::new();

        // Every read advances the clock past the interval.
        struct Ticking<'a> {
            inner: crate::bus::MemorySubscriber,
            clock: &'a ManualClock,
        }
        impl Subscribe for Ticking<'_> {
            fn read(&mut self) -> Result<Option<ChannelMessage>> {
                self.clock.advance(Duration::from_secs(1));
                self.inner.read()
            }
        }

        let config = PipelineConfig {
            write_batch_size: 2,
            throughput_interval_secs: 1,
            ..PipelineConfig::default()
        };
        let channel = Ticking {
            inner: topic.subscriber("g").unwrap(),
            clock: &clock,
        };
        let stats = StreamRouter::with_clock(channel, &storage, &config, &observer, clock.clone())
            .run()
            .unwrap();

        let samples = observer.filter_map(|e| match e {
            PipelineEvent::ThroughputSample { total_inserted, .. } => Some(*total_inserted),
            _ => None,
        });
        assert_eq!(samples, vec![0, 2, 2, 4]);
        assert_eq!(stats.inserted, 4);
        assert_eq!(storage.total_rows(&PartitionKey::new("BME280", "2025-06-01").unwrap()), 4);
    }

    /// Delivers `good` messages, then fails every read. Counts commits.
    struct Interrupted {
        inner: crate::bus::MemorySubscriber,
        good: usize,
        commits: usize,
    }

    impl Subscribe for Interrupted {
        fn read(&mut self) -> Result<Option<ChannelMessage>> {
            if self.good == 0 {
                return Err(Error::Transport("connection reset".into()));
            }
            self.good -= 1;
            self.inner.read()
        }

        fn commit(&mut self) -> Result<()> {
            self.commits += 1;
            self.inner.commit()
        }
    }

    struct RejectingWrites(MemoryStorage);

    impl Storage for RejectingWrites {
        fn create_table_if_absent(&self, key: &PartitionKey) -> Result<()> {
            self.0.create_table_if_absent(key)
        }

        fn write_batch(&self, key: &PartitionKey, _rows: &[Measurement]) -> Result<()> {
            Err(Error::Storage {
                table: key.table_name(),
                message: "write timeout".into(),
            })
        }

        fn count_where(&self, key: &PartitionKey, hour: u8) -> Result<u64> {
            self.0.count_where(key, hour)
        }
    }

    #[test]
    fn read_error_after_routing_flushes_the_tail() {
        let topic = MemoryTopic::new(1);
        let rows: Vec<Measurement> = (0..5)
            .map(|i| measurement(i, "BME280", "2025-06-01T01:00:00"))
            .collect();
        publish(&topic, &rows);
        let storage = MemoryStorage::new();
        let observer = VecObserver::new();
        let mut channel = Interrupted {
            inner: topic.subscriber("g").unwrap(),
            good: 3,
            commits: 0,
        };

        let stats = StreamRouter::new(&mut channel, &storage, &config(25), &observer)
            .run()
            .unwrap();

        assert_eq!(stats.consumed, 3);
        assert_eq!(stats.inserted, 3);
        assert_eq!(storage.batch_sizes(), vec![3]);
        assert_eq!(channel.commits, 1);
        let interrupted = observer.filter_map(|e| match e {
            PipelineEvent::ReadInterrupted { ordinal, reason } => Some((*ordinal, reason.clone())),
            _ => None,
        });
        assert_eq!(interrupted, vec![(3, "transport error: connection reset".to_string())]);

        // The committed position covers exactly the flushed messages.
        let mut resumed = topic.subscriber("g").unwrap();
        let mut remaining = 0;
        while resumed.read().unwrap().is_some() {
            remaining += 1;
        }
        assert_eq!(remaining, 2);
    }

    #[test]
    fn read_error_before_routing_is_fatal() {
        let topic = MemoryTopic::new(1);
        publish(&topic, &[measurement(1, "BME280", "2025-06-01T01:00:00")]);
        let storage = MemoryStorage::new();
        let observer = VecObserver::new();
        let mut channel = Interrupted {
            inner: topic.subscriber("g").unwrap(),
            good: 0,
            commits: 0,
        };

        let err = StreamRouter::new(&mut channel, &storage, &config(25), &observer)
            .run()
            .unwrap_err();

        assert!(matches!(err, Error::Transport(_)));
        assert_eq!(channel.commits, 0);
        assert_eq!(storage.create_calls(), 0);
        assert!(observer
            .filter_map(|e| match e {
                PipelineEvent::ReadInterrupted { .. } => Some(()),
                _ => None,
            })
            .is_empty());
    }

    #[test]
    fn failed_write_is_fatal_and_commits_nothing() {
        let topic = MemoryTopic::new(1);
        let rows: Vec<Measurement> = (0..4)
            .map(|i| measurement(i, "BME280", "2025-06-01T02:00:00"))
            .collect();
        publish(&topic, &rows);
        let storage = RejectingWrites(MemoryStorage::new());
        let observer = VecObserver::new();
        let mut channel = Interrupted {
            inner: topic.subscriber("g").unwrap(),
            good: usize::MAX,
            commits: 0,
        };

        let err = StreamRouter::new(&mut channel, &storage, &config(2), &observer)
            .run()
            .unwrap_err();

        assert!(matches!(err, Error::Storage { .. }));
        assert_eq!(channel.commits, 0);
        assert!(observer
            .filter_map(|e| match e {
                PipelineEvent::BatchFlushed { .. } => Some(()),
                _ => None,
            })
            .is_empty());

        let mut again = topic.subscriber("g").unwrap();
        let mut redelivered = 0;
        while again.read().unwrap().is_some() {
            redelivered += 1;
        }
        assert_eq!(redelivered, 4);
    }
}
