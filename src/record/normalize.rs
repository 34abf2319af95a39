//! Record normalizer: one `;`-delimited line to a [`Measurement`].
//!
//! Field order: sensor_id, sensor_type, location, lat, lon, timestamp,
//! pressure, altitude, pressure_sealevel, temperature, humidity. Extra
//! trailing fields are ignored.
//!
//! Structural problems (too few fields) are errors. Unreadable numbers are
//! not: they become absent readings, and an unreadable sensor id becomes 0.

use crate::record::Measurement;
use crate::{Error, Result};

pub const DELIMITER: char = ';';

/// Fields needed to build a measurement.
pub const MIN_FIELDS: usize = 11;

pub fn parse_line(line: &str) -> Result<Measurement> {
    let fields: Vec<&str> = line.split(DELIMITER).collect();
    normalize_fields(&fields)
}

pub fn normalize_fields<S: AsRef<str>>(fields: &[S]) -> Result<Measurement> {
    if fields.len() < MIN_FIELDS {
        return Err(Error::MalformedRecord {
            fields: fields.len(),
            required: MIN_FIELDS,
        });
    }
    let field = |idx: usize| fields[idx].as_ref().trim();

    Ok(Measurement {
        sensor_id: parse_sensor_id(field(0)),
        sensor_type: field(1).to_string(),
        location: parse_lenient_f32(field(2)),
        lat: parse_lenient_f32(field(3)),
        lon: parse_lenient_f32(field(4)),
        timestamp: field(5).to_string(),
        pressure: parse_lenient_f32(field(6)),
        altitude: parse_lenient_f32(field(7)),
        pressure_sealevel: parse_lenient_f32(field(8)),
        temperature: parse_lenient_f32(field(9)),
        humidity: parse_lenient_f32(field(10)),
    })
}

/// Finite `f32`, or `None` for empty, `NaN`, infinite or unparsable input.
pub fn parse_lenient_f32(raw: &str) -> Option<f32> {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("nan") {
        return None;
    }
    raw.parse::<f32>().ok().filter(|v| v.is_finite())
}

pub fn parse_sensor_id(raw: &str) -> i64 {
    raw.trim().parse().unwrap_or(0)
}
