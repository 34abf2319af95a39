//! Storage capability used by the stream router and the query engine.
//!
//! Rows are addressed by the primary arrangement `((hour), sensor_id,
//! timestamp)`. Writing a row whose key already exists replaces it, so counts
//! are counts of distinct keys and redelivered messages do not inflate them.

mod file;
mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

use std::sync::Arc;

use crate::record::Measurement;
use crate::table::PartitionKey;
use crate::Result;

/// Operations the pipeline needs from a storage backend.
///
/// Implementations must tolerate concurrent `count_where` calls from several
/// query workers sharing one handle.
pub trait Storage: Send + Sync {
    /// Create the table for `key` unless it already exists. Repeating the
    /// call, in the same run or a later one, is not an error.
    fn create_table_if_absent(&self, key: &PartitionKey) -> Result<()>;

    /// Insert `rows` into the table for `key` as one batch. Each row lands in
    /// the hour partition derived from its timestamp.
    fn write_batch(&self, key: &PartitionKey, rows: &[Measurement]) -> Result<()>;

    /// Number of rows in hour partition `hour` of the table for `key`.
    fn count_where(&self, key: &PartitionKey, hour: u8) -> Result<u64>;
}

impl<S: Storage + ?Sized> Storage for &S {
    fn create_table_if_absent(&self, key: &PartitionKey) -> Result<()> {
        (**self).create_table_if_absent(key)
    }

    fn write_batch(&self, key: &PartitionKey, rows: &[Measurement]) -> Result<()> {
        (**self).write_batch(key, rows)
    }

    fn count_where(&self, key: &PartitionKey, hour: u8) -> Result<u64> {
        (**self).count_where(key, hour)
    }
}

impl<S: Storage + ?Sized> Storage for Arc<S> {
    fn create_table_if_absent(&self, key: &PartitionKey) -> Result<()> {
        (**self).create_table_if_absent(key)
    }

    fn write_batch(&self, key: &PartitionKey, rows: &[Measurement]) -> Result<()> {
        (**self).write_batch(key, rows)
    }

    fn count_where(&self, key: &PartitionKey, hour: u8) -> Result<u64> {
        (**self).count_where(key, hour)
    }
}

/// Hour partition for a row, or a storage error naming the table.
pub(crate) fn row_hour(key: &PartitionKey, row: &Measurement) -> Result<u8> {
    row.hour().ok_or_else(|| {
        crate::Error::storage(
            key.table_name(),
            format!("timestamp {:?} has no hour of day", row.timestamp),
        )
    })
}
