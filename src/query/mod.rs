//! Aggregation query engine: per-hour row counts for one table.
//!
//! Single mode runs one count on the calling thread. Parallel mode fans the
//! hours out over a fixed worker pool, waits for every worker, and only then
//! assembles the report.
//!
//! ```
//! use sensorflow::observe::NullObserver;
//! use sensorflow::query::QueryEngine;
//! use sensorflow::storage::{MemoryStorage, Storage};
//! use sensorflow::table::PartitionKey;
//!
//! let storage = MemoryStorage::new();
//! let key = PartitionKey::new("BME280", "2022-01-04")?;
//! storage.create_table_if_absent(&key)?;
//!
//! let report = QueryEngine::new(&storage, key, NullObserver).run_all(4)?;
//! assert_eq!(report.results.len(), 24);
//! assert_eq!(report.total(), 0);
//! assert!(report.is_success());
//! # Ok::<(), sensorflow::Error>(())
//! ```

mod pool;
mod report;

pub use pool::fan_out;
pub use report::{HourResult, LatencySummary, QueryReport};

use std::time::Instant;

use crate::observe::{Observer, PipelineEvent};
use crate::storage::Storage;
use crate::table::{validate_hour, PartitionKey, HOURS_PER_DAY};
use crate::{Error, Result};

pub struct QueryEngine<S, O> {
    storage: S,
    key: PartitionKey,
    observer: O,
}

impl<S: Storage, O: Observer> QueryEngine<S, O> {
    pub fn new(storage: S, key: PartitionKey, observer: O) -> Self {
        Self {
            storage,
            key,
            observer,
        }
    }

    pub fn key(&self) -> &PartitionKey {
        &self.key
    }

    /// Count one hour synchronously. An out-of-range hour is rejected before
    /// any query is issued; a storage failure is carried in the result.
    pub fn run_single(&self, hour: u8) -> Result<HourResult> {
        let hour = validate_hour(hour)?;
        Ok(self.count_hour(hour))
    }

    /// Count every hour of the day on `workers` threads.
    pub fn run_all(&self, workers: usize) -> Result<QueryReport> {
        let hours: Vec<u8> = (0..HOURS_PER_DAY).collect();
        self.run_parallel(&hours, workers)
    }

    /// Count each of `hours` on up to `workers` threads; surplus workers are
    /// never started. Duplicate hours are queried once. A failing hour is recorded against that hour and does
    /// not stop the others.
    pub fn run_parallel(&self, hours: &[u8], workers: usize) -> Result<QueryReport> {
        if workers == 0 {
            return Err(Error::Config("query workers must be positive".into()));
        }
        let mut tasks = hours
            .iter()
            .map(|&hour| validate_hour(hour))
            .collect::<Result<Vec<u8>>>()?;
        tasks.sort_unstable();
        tasks.dedup();

        let started = Instant::now();
        let results = fan_out(tasks, workers, |hour| self.count_hour(hour))?;
        Ok(QueryReport::new(
            self.key.table_name(),
            workers,
            results,
            started.elapsed(),
        ))
    }

    fn count_hour(&self, hour: u8) -> HourResult {
        let started = Instant::now();
        let count = self.storage.count_where(&self.key, hour);
        let elapsed = started.elapsed();
        self.observer.observe(PipelineEvent::QueryCompleted {
            hour,
            count: count.as_ref().copied().map_err(ToString::to_string),
            elapsed,
        });
        HourResult {
            hour,
            count,
            elapsed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observe::{NullObserver, VecObserver};
    use crate::record::Measurement;
    use crate::storage::MemoryStorage;

    fn row(sensor_id: i64, timestamp: &str) -> Measurement {
        Measurement {
            sensor_id,
            sensor_type: "BME280".into(),
            timestamp: timestamp.into(),
            ..Measurement::default()
        }
    }

    fn seeded() -> (MemoryStorage, PartitionKey) {
        let storage = MemoryStorage::new();
        let key = PartitionKey::new("BME280", "2022-01-04").unwrap();
        storage.create_table_if_absent(&key).unwrap();
        storage
            .write_batch(
                &key,
                &[
                    row(1, "2022-01-04T00:00:01"),
                    row(2, "2022-01-04T00:00:01"),
                    row(1, "2022-01-04T13:30:00"),
                    row(1, "2022-01-04T23:59:59"),
                ],
            )
            .unwrap();
        (storage, key)
    }

    #[test]
    fn single_hour() {
        let (storage, key) = seeded();
        let engine = QueryEngine::new(&storage, key, NullObserver);
        let result = engine.run_single(0).unwrap();
        assert_eq!(result.hour, 0);
        assert_eq!(result.count.unwrap(), 2);
        assert!(matches!(engine.run_single(24), Err(Error::InvalidHour(24))));
    }

    #[test]
    fn all_hours_reported_once() {
        let (storage, key) = seeded();
        let observer = VecObserver::new();
        let report = QueryEngine::new(&storage, key, &observer).run_all(4).unwrap();

        assert_eq!(report.results.len(), 24);
        assert_eq!(report.total(), 4);
        assert_eq!(report.count(13), Some(1));
        assert_eq!(report.count(23), Some(1));
        assert_eq!(report.count(5), Some(0));
        assert_eq!(report.workers, 4);

        let mut hours = observer.filter_map(|e| match e {
            PipelineEvent::QueryCompleted { hour, .. } => Some(*hour),
            _ => None,
        });
        hours.sort_unstable();
        assert_eq!(hours, (0..24).collect::<Vec<u8>>());
    }

    #[test]
    fn duplicate_hours_queried_once() {
        let (storage, key) = seeded();
        let report = QueryEngine::new(&storage, key, NullObserver)
            .run_parallel(&[13, 0, 13], 2)
            .unwrap();
        assert_eq!(report.results.keys().copied().collect::<Vec<_>>(), [0, 13]);
        assert_eq!(report.total(), 3);
    }

    #[test]
    fn zero_workers_rejected_surplus_accepted() {
        let (storage, key) = seeded();
        let engine = QueryEngine::new(&storage, key, NullObserver);
        assert!(matches!(engine.run_all(0), Err(Error::Config(_))));

        let report = engine.run_all(100).unwrap();
        assert_eq!(report.results.len(), 24);
        assert_eq!(report.total(), 4);
        assert!(report.is_success());
    }

    #[test]
    fn failed_hour_event_carries_the_error() {
        let storage = MemoryStorage::new();
        let key = PartitionKey::new("BME280", "2022-01-05").unwrap();
        let observer = VecObserver::new();
        let result = QueryEngine::new(&storage, key, &observer).run_single(7).unwrap();
        let expected = result.count.unwrap_err().to_string();

        let events = observer.filter_map(|e| match e {
            PipelineEvent::QueryCompleted { hour, count, .. } => Some((*hour, count.clone())),
            _ => None,
        });
        assert_eq!(events, vec![(7, Err(expected.clone()))]);
        assert!(expected.contains("sensor_measurements_BME280_2022_01_05"));
    }

    #[test]
    fn missing_table_errors_every_hour() {
        let storage = MemoryStorage::new();
        let key = PartitionKey::new("BME280", "2022-01-05").unwrap();
        let report = QueryEngine::new(&storage, key, NullObserver)
            .run_all(3)
            .unwrap();
        assert_eq!(report.error_count(), 24);
        assert!(!report.is_success());
    }
}
