//! Sensor measurements and their channel projection.
//!
//! A [`Measurement`] is the canonical record flowing through the pipeline.
//! The day key and the storage hour are never stored: both are derived from
//! the timestamp whenever they are needed, so the producer side and the
//! consumer side always agree on them.

mod normalize;

pub use normalize::{normalize_fields, parse_lenient_f32, parse_line, parse_sensor_id, MIN_FIELDS};

use serde::{Deserialize, Serialize};

/// One normalized sensor reading.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(into = "MeasurementRecord", from = "MeasurementRecord")]
pub struct Measurement {
    pub sensor_id: i64,
    pub sensor_type: String,
    pub location: Option<f32>,
    pub lat: Option<f32>,
    pub lon: Option<f32>,
    /// Source format preserved, e.g. `2025-06-01T01:13:29`.
    pub timestamp: String,
    pub pressure: Option<f32>,
    pub altitude: Option<f32>,
    pub pressure_sealevel: Option<f32>,
    pub temperature: Option<f32>,
    pub humidity: Option<f32>,
}

impl Measurement {
    /// Date portion of the timestamp: everything before the first `T`.
    pub fn day(&self) -> &str {
        day_of(&self.timestamp)
    }

    /// Hour of day (0..=23) from the two digits after the `T` separator.
    pub fn hour(&self) -> Option<u8> {
        hour_of(&self.timestamp)
    }

    /// Channel affinity key: the sensor id as decimal text.
    pub fn channel_key(&self) -> String {
        self.sensor_id.to_string()
    }
}

pub fn day_of(timestamp: &str) -> &str {
    match timestamp.find('T') {
        Some(idx) => &timestamp[..idx],
        None => timestamp,
    }
}

pub fn hour_of(timestamp: &str) -> Option<u8> {
    let (_, time) = timestamp.split_once('T')?;
    let digits = time.get(..2)?;
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hour: u8 = digits.parse().ok()?;
    (hour < 24).then_some(hour)
}

/// Wire projection of a [`Measurement`]: one JSON object per channel message,
/// numeric readings nullable, `day` carried for readers that want it.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct MeasurementRecord {
    sensor_id: i64,
    sensor_type: String,
    location: Option<f32>,
    lat: Option<f32>,
    lon: Option<f32>,
    #[serde(default)]
    day: String,
    timestamp: String,
    pressure: Option<f32>,
    altitude: Option<f32>,
    pressure_sealevel: Option<f32>,
    temperature: Option<f32>,
    humidity: Option<f32>,
}

impl From<Measurement> for MeasurementRecord {
    fn from(m: Measurement) -> Self {
        Self {
            day: m.day().to_string(),
            sensor_id: m.sensor_id,
            sensor_type: m.sensor_type,
            location: m.location,
            lat: m.lat,
            lon: m.lon,
            timestamp: m.timestamp,
            pressure: m.pressure,
            altitude: m.altitude,
            pressure_sealevel: m.pressure_sealevel,
            temperature: m.temperature,
            humidity: m.humidity,
        }
    }
}

// The incoming `day` is ignored: it is re-derived from the timestamp.
impl From<MeasurementRecord> for Measurement {
    fn from(r: MeasurementRecord) -> Self {
        Self {
            sensor_id: r.sensor_id,
            sensor_type: r.sensor_type,
            location: r.location,
            lat: r.lat,
            lon: r.lon,
            timestamp: r.timestamp,
            pressure: r.pressure,
            altitude: r.altitude,
            pressure_sealevel: r.pressure_sealevel,
            temperature: r.temperature,
            humidity: r.humidity,
        }
    }
}
