//! Measurement tables.
//!
//! One table per [`PartitionKey`] `(sensor_type, day)`, named
//! deterministically, with hour-of-day sub-partitions.
//!
//! ```
//! use sensorflow::table::PartitionKey;
//!
//! let key = PartitionKey::new("BME280", "2025-06-01")?;
//! assert_eq!(key.table_name(), "sensor_measurements_BME280_2025_06_01");
//! # Ok::<(), sensorflow::Error>(())
//! ```

mod partition;
mod schema;

pub use partition::{validate_hour, PartitionKey, HOURS_PER_DAY, TABLE_PREFIX};
pub use schema::{Column, ColumnType, TableSchema};
