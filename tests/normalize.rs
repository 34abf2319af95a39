use std::fs;
use std::io::Cursor;

use tempfile::tempdir;

use sensorflow::ingest::RecordSource;
use sensorflow::record::{parse_line, Measurement};
use sensorflow::Error;

const HEADER: &str = "sensor_id;sensor_type;location;lat;lon;timestamp;pressure;altitude;pressure_sealevel;temperature;humidity";

#[test]
fn well_formed_lines_survive_the_channel_projection() {
    let lines = [
        "113;BME280;57;48.137;11.575;2025-06-01T00:00:07;101325.5;512.25;101900;21.5;45.25",
        "114;BME280;58;;;2025-06-01T23:59:59;NaN;;nan;-3.75;100",
        "x;BME280;;inf;-inf;2025-06-02T12:00:00;1e3;;;;",
    ];
    for line in lines {
        let original = parse_line(line).expect("parse");
        let encoded = serde_json::to_string(&original).expect("encode");
        let decoded: Measurement = serde_json::from_str(&encoded).expect("decode");
        assert_eq!(decoded, original, "{line}");
        assert_eq!(decoded.day(), original.day());
        assert_eq!(decoded.hour(), original.hour());
    }
}

#[test]
fn projection_carries_day_and_nullable_readings() {
    let m = parse_line("7;BME280;1;2;3;2025-06-01T05:00:00;NaN;4;5;6;7").expect("parse");
    let value: serde_json::Value = serde_json::to_value(&m).expect("encode");
    assert_eq!(value["day"], "2025-06-01");
    assert_eq!(value["sensor_id"], 7);
    assert!(value["pressure"].is_null());
    assert_eq!(value["altitude"], 4.0);
}

#[test]
fn lenient_fields_become_absent() {
    let m = parse_line("abc; BME280 ;NaN;;oops;2025-06-01T01:13:29;Infinity;1.5;;2;3").expect("parse");
    assert_eq!(m.sensor_id, 0);
    assert_eq!(m.sensor_type, "BME280");
    assert_eq!(m.location, None);
    assert_eq!(m.lat, None);
    assert_eq!(m.lon, None);
    assert_eq!(m.pressure, None);
    assert_eq!(m.altitude, Some(1.5));
    assert_eq!(m.pressure_sealevel, None);
    assert_eq!(m.day(), "2025-06-01");
    assert_eq!(m.hour(), Some(1));
}

#[test]
fn short_lines_are_malformed() {
    let err = parse_line("1;BME280;2;3").unwrap_err();
    assert!(matches!(err, Error::MalformedRecord { fields: 4, required: 11 }));
    assert!(err.is_recoverable());
}

#[test]
fn source_skips_header_and_reports_bad_lines() {
    let data = format!(
        "{HEADER}\n1;BME280;1;1;1;2025-06-01T00:00:00;1;1;1;1;1\n2;BME280;short\n\n3;BME280;1;1;1;2025-06-01T01:00:00;1;1;1;1;1\n"
    );
    let lines: Vec<_> = RecordSource::from_reader(Cursor::new(data.into_bytes()))
        .collect::<Result<_, _>>()
        .expect("read source");

    assert_eq!(lines.len(), 3);
    assert!(lines[0].record.is_ok());
    assert!(matches!(lines[1].record, Err(Error::MalformedRecord { .. })));
    assert_eq!(lines[2].record.as_ref().expect("row 3").sensor_id, 3);
    assert!(lines[0].line < lines[1].line && lines[1].line < lines[2].line);
}

#[test]
fn source_reads_plain_files() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("day.csv");
    fs::write(
        &path,
        format!("{HEADER}\n9;BME280;1;1;1;2025-06-01T00:00:00;1;1;1;1;1\n"),
    )
    .expect("write source");

    let lines: Vec<_> = RecordSource::open(&path)
        .expect("open")
        .collect::<Result<_, _>>()
        .expect("read");
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].record.as_ref().expect("row").sensor_id, 9);
}
