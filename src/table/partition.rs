//! Partition keys and deterministic table naming.

use std::fmt;

use crate::record::Measurement;
use crate::{Error, Result};

pub const TABLE_PREFIX: &str = "sensor_measurements";

/// Hours of the day: the sub-partitions of every table.
pub const HOURS_PER_DAY: u8 = 24;

/// `(sensor_type, day)`: selects the table a consumer run writes to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartitionKey {
    sensor_type: String,
    day: String,
}

impl PartitionKey {
    /// Build a key, rejecting components that cannot appear in a table name.
    pub fn new(sensor_type: impl Into<String>, day: impl Into<String>) -> Result<Self> {
        let sensor_type = sensor_type.into();
        let day = day.into();
        validate_component("sensor_type", &sensor_type)?;
        validate_component("day", &day)?;
        Ok(Self { sensor_type, day })
    }

    pub fn for_measurement(m: &Measurement) -> Result<Self> {
        Self::new(m.sensor_type.clone(), m.day())
    }

    pub fn sensor_type(&self) -> &str {
        &self.sensor_type
    }

    pub fn day(&self) -> &str {
        &self.day
    }

    /// `sensor_measurements_<sensor_type>_<day with '-' replaced by '_'>`.
    pub fn table_name(&self) -> String {
        format!(
            "{TABLE_PREFIX}_{}_{}",
            self.sensor_type,
            self.day.replace('-', "_")
        )
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.sensor_type, self.day)
    }
}

pub fn validate_hour(hour: u8) -> Result<u8> {
    if hour < HOURS_PER_DAY {
        Ok(hour)
    } else {
        Err(Error::InvalidHour(hour))
    }
}

/// Table names are also directory names, so only `[A-Za-z0-9_-]` survive.
fn validate_component(field: &'static str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::InvalidComponent {
            field,
            value: value.to_string(),
        });
    }
    if !value
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
    {
        return Err(Error::InvalidComponent {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_name_replaces_dashes() {
        let key = PartitionKey::new("BME280", "2025-06-01").unwrap();
        assert_eq!(key.table_name(), "sensor_measurements_BME280_2025_06_01");
    }

    #[test]
    fn underscored_day_names_same_table() {
        let dashed = PartitionKey::new("BME280", "2025-06-01").unwrap();
        let underscored = PartitionKey::new("BME280", "2025_06_01").unwrap();
        assert_eq!(dashed.table_name(), underscored.table_name());
    }

    #[test]
    fn reject_invalid_component() {
        for (sensor, day) in [("", "2025-06-01"), ("BME/280", "2025-06-01"), ("BME280", "..")] {
            let err = PartitionKey::new(sensor, day).unwrap_err();
            assert!(matches!(err, Error::InvalidComponent { .. }), "{sensor} {day}");
        }
    }

    #[test]
    fn key_from_measurement() {
        let m = Measurement {
            sensor_type: "DHT22".into(),
            timestamp: "2025-01-02T03:04:05".into(),
            ..Measurement::default()
        };
        let key = PartitionKey::for_measurement(&m).unwrap();
        assert_eq!(key.sensor_type(), "DHT22");
        assert_eq!(key.day(), "2025-01-02");
        assert_eq!(key.to_string(), "(DHT22, 2025-01-02)");
    }

    #[test]
    fn hour_bounds() {
        assert_eq!(validate_hour(0).unwrap(), 0);
        assert_eq!(validate_hour(23).unwrap(), 23);
        assert!(matches!(validate_hour(24), Err(Error::InvalidHour(24))));
    }
}
