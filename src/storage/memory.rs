use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};

use crate::record::Measurement;
use crate::storage::{row_hour, Storage};
use crate::table::{validate_hour, PartitionKey};
use crate::{Error, Result};

/// Clustering key inside an hour partition.
type RowKey = (i64, String);

type HourPartitions = BTreeMap<u8, BTreeMap<RowKey, Measurement>>;

/// In-process storage backend.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    tables: RwLock<HashMap<String, HourPartitions>>,
    create_calls: AtomicU64,
    batch_sizes: Mutex<Vec<usize>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table_exists(&self, key: &PartitionKey) -> bool {
        self.tables
            .read()
            .map(|t| t.contains_key(&key.table_name()))
            .unwrap_or(false)
    }

    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .tables
            .read()
            .map(|t| t.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Number of `create_table_if_absent` calls received.
    pub fn create_calls(&self) -> u64 {
        self.create_calls.load(Ordering::SeqCst)
    }

    /// Size of every batch written so far, in write order.
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batch_sizes
            .lock()
            .map(|b| b.clone())
            .unwrap_or_default()
    }

    /// Rows of one hour partition in clustering order.
    pub fn rows(&self, key: &PartitionKey, hour: u8) -> Vec<Measurement> {
        let Ok(tables) = self.tables.read() else {
            return Vec::new();
        };
        tables
            .get(&key.table_name())
            .and_then(|hours| hours.get(&hour))
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn total_rows(&self, key: &PartitionKey) -> usize {
        let Ok(tables) = self.tables.read() else {
            return 0;
        };
        tables
            .get(&key.table_name())
            .map(|hours| hours.values().map(|rows| rows.len()).sum())
            .unwrap_or(0)
    }
}

impl Storage for MemoryStorage {
    fn create_table_if_absent(&self, key: &PartitionKey) -> Result<()> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let mut tables = self
            .tables
            .write()
            .map_err(|_| Error::storage(key.table_name(), "lock poisoned"))?;
        tables.entry(key.table_name()).or_default();
        Ok(())
    }

    fn write_batch(&self, key: &PartitionKey, rows: &[Measurement]) -> Result<()> {
        let table = key.table_name();
        let mut tables = self
            .tables
            .write()
            .map_err(|_| Error::storage(&table, "lock poisoned"))?;
        let hours = tables
            .get_mut(&table)
            .ok_or_else(|| Error::storage(&table, "table does not exist"))?;

        // Resolve every hour first so a bad row leaves the table untouched.
        let placed = rows
            .iter()
            .map(|row| row_hour(key, row).map(|hour| (hour, row)))
            .collect::<Result<Vec<_>>>()?;
        for (hour, row) in placed {
            hours
                .entry(hour)
                .or_default()
                .insert((row.sensor_id, row.timestamp.clone()), row.clone());
        }

        if let Ok(mut sizes) = self.batch_sizes.lock() {
            sizes.push(rows.len());
        }
        Ok(())
    }

    fn count_where(&self, key: &PartitionKey, hour: u8) -> Result<u64> {
        let table = key.table_name();
        validate_hour(hour)?;
        let tables = self
            .tables
            .read()
            .map_err(|_| Error::storage(&table, "lock poisoned"))?;
        let hours = tables
            .get(&table)
            .ok_or_else(|| Error::storage(&table, "table does not exist"))?;
        Ok(hours.get(&hour).map(|rows| rows.len() as u64).unwrap_or(0))
    }
}
