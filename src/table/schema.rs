//! Table schema document.
//!
//! Every measurement table shares one column set and one primary
//! arrangement: partitioned by `hour`, clustered by `sensor_id` then
//! `timestamp`, ascending.

use serde::{Deserialize, Serialize};

use crate::table::PartitionKey;

const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Int,
    Text,
    Float,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ColumnType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub version: u32,
    pub table: String,
    pub columns: Vec<Column>,
    pub partition_key: Vec<String>,
    pub clustering_key: Vec<String>,
}

impl TableSchema {
    pub fn for_partition(key: &PartitionKey) -> Self {
        use ColumnType::*;
        let columns = [
            ("sensor_id", Int),
            ("sensor_type", Text),
            ("location", Float),
            ("lat", Float),
            ("lon", Float),
            ("day", Text),
            ("hour", Int),
            ("timestamp", Text),
            ("pressure", Float),
            ("altitude", Float),
            ("pressure_sealevel", Float),
            ("temperature", Float),
            ("humidity", Float),
        ]
        .into_iter()
        .map(|(name, kind)| Column {
            name: name.to_string(),
            kind,
        })
        .collect();

        Self {
            version: SCHEMA_VERSION,
            table: key.table_name(),
            columns,
            partition_key: vec!["hour".to_string()],
            clustering_key: vec!["sensor_id".to_string(), "timestamp".to_string()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_arrangement() {
        let key = PartitionKey::new("BME280", "2025-06-01").unwrap();
        let schema = TableSchema::for_partition(&key);
        assert_eq!(schema.table, "sensor_measurements_BME280_2025_06_01");
        assert_eq!(schema.partition_key, vec!["hour"]);
        assert_eq!(schema.clustering_key, vec!["sensor_id", "timestamp"]);
        assert_eq!(schema.columns.len(), 13);
    }

    #[test]
    fn schema_json_round_trip() {
        let key = PartitionKey::new("BME280", "2025-06-01").unwrap();
        let schema = TableSchema::for_partition(&key);
        let json = serde_json::to_string_pretty(&schema).unwrap();
        assert!(json.contains("\"type\": \"float\""));
        let back: TableSchema = serde_json::from_str(&json).unwrap();
        assert_eq!(back, schema);
    }
}
