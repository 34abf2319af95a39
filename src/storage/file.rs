//! Directory-backed storage.
//!
//! ```text
//! <root>/<keyspace>/<table>/_table/schema.json
//! <root>/<keyspace>/<table>/hour=07/rows.jsonl
//! ```
//!
//! Each row is one JSON line. Appends never rewrite earlier lines; readers
//! resolve duplicates by clustering key with the last line winning.

use std::collections::{BTreeMap, HashSet};
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Deserialize;

use crate::record::Measurement;
use crate::storage::{row_hour, Storage};
use crate::table::{validate_hour, PartitionKey, TableSchema};
use crate::{Error, Result};

const SCHEMA_DIR: &str = "_table";
const SCHEMA_FILENAME: &str = "schema.json";
const ROWS_FILENAME: &str = "rows.jsonl";

#[derive(Debug, Clone)]
pub struct FileStorage {
    keyspace_dir: PathBuf,
}

/// Only the clustering columns; everything else in the line is ignored.
#[derive(Deserialize)]
struct RowKey {
    sensor_id: i64,
    timestamp: String,
}

impl FileStorage {
    /// Open (creating if needed) `keyspace` under `root`.
    pub fn open(root: impl AsRef<Path>, keyspace: &str) -> Result<Self> {
        let keyspace_dir = root.as_ref().join(keyspace);
        fs::create_dir_all(&keyspace_dir)?;
        Ok(Self { keyspace_dir })
    }

    /// Use the first root that already holds `keyspace`. When none does and
    /// `create` is set, the keyspace is created under the first root.
    pub fn connect(roots: &[PathBuf], keyspace: &str, create: bool) -> Result<Self> {
        if roots.is_empty() {
            return Err(Error::Config("no storage roots given".into()));
        }
        if let Some(root) = roots.iter().find(|root| root.join(keyspace).is_dir()) {
            return Ok(Self {
                keyspace_dir: root.join(keyspace),
            });
        }
        if create {
            return Self::open(&roots[0], keyspace);
        }
        Err(Error::storage(
            keyspace,
            format!("keyspace not found under any of {} storage roots", roots.len()),
        ))
    }

    pub fn keyspace_dir(&self) -> &Path {
        &self.keyspace_dir
    }

    pub fn table_dir(&self, key: &PartitionKey) -> PathBuf {
        self.keyspace_dir.join(key.table_name())
    }

    pub fn table_exists(&self, key: &PartitionKey) -> bool {
        self.schema_path(key).is_file()
    }

    pub fn load_schema(&self, key: &PartitionKey) -> Result<TableSchema> {
        let path = self.schema_path(key);
        let data = fs::read_to_string(&path).map_err(|err| match err.kind() {
            ErrorKind::NotFound => Error::storage(key.table_name(), "table does not exist"),
            _ => Error::storage(key.table_name(), err),
        })?;
        serde_json::from_str(&data)
            .map_err(|err| Error::storage(key.table_name(), format!("corrupt schema: {err}")))
    }

    /// Rows of one hour partition, one per clustering key, in clustering order.
    pub fn scan_hour(&self, key: &PartitionKey, hour: u8) -> Result<Vec<Measurement>> {
        validate_hour(hour)?;
        self.require_table(key)?;
        let table = key.table_name();
        let mut rows = BTreeMap::new();
        for line in self.hour_lines(key, hour)? {
            let row: Measurement = serde_json::from_str(&line)
                .map_err(|err| Error::storage(&table, format!("corrupt row: {err}")))?;
            rows.insert((row.sensor_id, row.timestamp.clone()), row);
        }
        Ok(rows.into_values().collect())
    }

    fn schema_path(&self, key: &PartitionKey) -> PathBuf {
        self.table_dir(key).join(SCHEMA_DIR).join(SCHEMA_FILENAME)
    }

    fn hour_path(&self, key: &PartitionKey, hour: u8) -> PathBuf {
        self.table_dir(key)
            .join(format!("hour={hour:02}"))
            .join(ROWS_FILENAME)
    }

    fn require_table(&self, key: &PartitionKey) -> Result<()> {
        if self.table_exists(key) {
            Ok(())
        } else {
            Err(Error::storage(key.table_name(), "table does not exist"))
        }
    }

    fn hour_lines(&self, key: &PartitionKey, hour: u8) -> Result<Vec<String>> {
        let file = match fs::File::open(self.hour_path(key, hour)) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(Error::storage(key.table_name(), err)),
        };
        let mut lines = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|err| Error::storage(key.table_name(), err))?;
            if !line.trim().is_empty() {
                lines.push(line);
            }
        }
        Ok(lines)
    }

    /// Publish the schema with a hard link so exactly one creator wins even
    /// when several race; losers compare against what the winner wrote.
    fn write_schema(&self, key: &PartitionKey, schema: &TableSchema) -> Result<()> {
        let table = key.table_name();
        let path = self.schema_path(key);
        let dir = path
            .parent()
            .ok_or_else(|| Error::storage(&table, "schema path has no parent"))?;
        fs::create_dir_all(dir).map_err(|err| Error::storage(&table, err))?;

        let tmp = dir.join(format!(
            "{SCHEMA_FILENAME}.tmp-{}-{}",
            std::process::id(),
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos())
                .unwrap_or(0)
        ));
        let json = serde_json::to_string_pretty(schema)?;
        fs::write(&tmp, json).map_err(|err| Error::storage(&table, err))?;
        let linked = fs::hard_link(&tmp, &path);
        let _ = fs::remove_file(&tmp);
        match linked {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => Ok(()),
            Err(err) => Err(Error::storage(&table, err)),
        }
    }
}

impl Storage for FileStorage {
    fn create_table_if_absent(&self, key: &PartitionKey) -> Result<()> {
        let expected = TableSchema::for_partition(key);
        if !self.table_exists(key) {
            self.write_schema(key, &expected)?;
        }
        let existing = self.load_schema(key)?;
        if existing != expected {
            return Err(Error::storage(
                key.table_name(),
                "existing table has a different schema",
            ));
        }
        Ok(())
    }

    fn write_batch(&self, key: &PartitionKey, rows: &[Measurement]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        self.require_table(key)?;
        let table = key.table_name();

        let mut by_hour: BTreeMap<u8, Vec<u8>> = BTreeMap::new();
        for row in rows {
            let hour = row_hour(key, row)?;
            let buf = by_hour.entry(hour).or_default();
            serde_json::to_writer(&mut *buf, row)?;
            buf.push(b'\n');
        }

        for (hour, buf) in by_hour {
            let path = self.hour_path(key, hour);
            if let Some(dir) = path.parent() {
                fs::create_dir_all(dir).map_err(|err| Error::storage(&table, err))?;
            }
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(|err| Error::storage(&table, err))?;
            file.write_all(&buf)
                .map_err(|err| Error::storage(&table, err))?;
        }
        Ok(())
    }

    fn count_where(&self, key: &PartitionKey, hour: u8) -> Result<u64> {
        validate_hour(hour)?;
        self.require_table(key)?;
        let table = key.table_name();
        let mut keys = HashSet::new();
        for line in self.hour_lines(key, hour)? {
            let row: RowKey = serde_json::from_str(&line)
                .map_err(|err| Error::storage(&table, format!("corrupt row: {err}")))?;
            keys.insert((row.sensor_id, row.timestamp));
        }
        Ok(keys.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn key() -> PartitionKey {
        PartitionKey::new("BME280", "2025-06-01").unwrap()
    }

    fn row(sensor_id: i64, timestamp: &str) -> Measurement {
        Measurement {
            sensor_id,
            sensor_type: "BME280".into(),
            timestamp: timestamp.into(),
            pressure: Some(1000.5),
            ..Measurement::default()
        }
    }

    #[test]
    fn test_create_twice_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::open(dir.path(), "ks").unwrap();
        storage.create_table_if_absent(&key()).unwrap();
        storage.create_table_if_absent(&key()).unwrap();

        let reopened = FileStorage::open(dir.path(), "ks").unwrap();
        reopened.create_table_if_absent(&key()).unwrap();
        assert_eq!(reopened.load_schema(&key()).unwrap(), TableSchema::for_partition(&key()));

        let schema_dir = storage.table_dir(&key()).join(SCHEMA_DIR);
        assert_eq!(fs::read_dir(schema_dir).unwrap().count(), 1);
    }

    #[test]
    fn test_conflicting_schema_is_rejected() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::open(dir.path(), "ks").unwrap();
        let path = storage.schema_path(&key());
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut other = TableSchema::for_partition(&key());
        other.clustering_key.reverse();
        fs::write(&path, serde_json::to_string(&other).unwrap()).unwrap();

        assert!(matches!(
            storage.create_table_if_absent(&key()),
            Err(Error::Storage { .. })
        ));
    }

    #[test]
    fn test_write_and_count_by_hour() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::open(dir.path(), "ks").unwrap();
        storage.create_table_if_absent(&key()).unwrap();
        storage
            .write_batch(
                &key(),
                &[
                    row(2, "2025-06-01T03:00:01"),
                    row(1, "2025-06-01T03:00:02"),
                    row(1, "2025-06-01T04:10:00"),
                ],
            )
            .unwrap();
        storage
            .write_batch(&key(), &[row(1, "2025-06-01T03:00:02")])
            .unwrap();

        assert_eq!(storage.count_where(&key(), 3).unwrap(), 2);
        assert_eq!(storage.count_where(&key(), 4).unwrap(), 1);
        assert_eq!(storage.count_where(&key(), 0).unwrap(), 0);

        let rows = storage.scan_hour(&key(), 3).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].sensor_id, 1);
        assert_eq!(rows[1].sensor_id, 2);
        assert_eq!(rows[0].pressure, Some(1000.5));
        assert!(storage.hour_path(&key(), 3).ends_with("hour=03/rows.jsonl"));
    }

    #[test]
    fn test_missing_table_is_storage_error() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::open(dir.path(), "ks").unwrap();
        assert!(matches!(
            storage.count_where(&key(), 1),
            Err(Error::Storage { .. })
        ));
        assert!(matches!(
            storage.write_batch(&key(), &[row(1, "2025-06-01T01:00:00")]),
            Err(Error::Storage { .. })
        ));
    }

    #[test]
    fn test_connect_picks_root_with_keyspace() {
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();
        FileStorage::open(b.path(), "ks").unwrap();
        let roots = vec![a.path().to_path_buf(), b.path().to_path_buf()];

        let storage = FileStorage::connect(&roots, "ks", false).unwrap();
        assert_eq!(storage.keyspace_dir(), b.path().join("ks"));

        assert!(FileStorage::connect(&roots, "other", false).is_err());
        let created = FileStorage::connect(&roots, "other", true).unwrap();
        assert_eq!(created.keyspace_dir(), a.path().join("other"));
        assert!(FileStorage::connect(&[], "ks", true).is_err());
    }
}
