use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use sensorflow::observe::NullObserver;
use sensorflow::query::QueryEngine;
use sensorflow::record::Measurement;
use sensorflow::storage::{MemoryStorage, Storage};
use sensorflow::table::PartitionKey;

const ROWS_PER_HOUR: usize = 2_000;

fn seeded_storage() -> (MemoryStorage, PartitionKey) {
    let storage = MemoryStorage::new();
    let key = PartitionKey::new("BME280", "2025-06-01").expect("key");
    storage.create_table_if_absent(&key).expect("create");
    let rows: Vec<Measurement> = (0..24)
        .flat_map(|hour| {
            (0..ROWS_PER_HOUR).map(move |i| Measurement {
                sensor_id: i as i64,
                sensor_type: "BME280".into(),
                timestamp: format!("2025-06-01T{hour:02}:00:00"),
                temperature: Some(21.0),
                ..Measurement::default()
            })
        })
        .collect();
    for batch in rows.chunks(1_000) {
        storage.write_batch(&key, batch).expect("write");
    }
    (storage, key)
}

fn bench_count_all_hours(c: &mut Criterion) {
    let (storage, key) = seeded_storage();
    let mut group = c.benchmark_group("count_all_hours");
    group.throughput(Throughput::Elements(24));
    for &workers in &[1_usize, 4, 12, 24] {
        let engine = QueryEngine::new(&storage, key.clone(), NullObserver);
        group.bench_with_input(BenchmarkId::from_parameter(workers), &workers, |b, &workers| {
            b.iter(|| {
                let report = engine.run_all(black_box(workers)).expect("report");
                assert_eq!(report.total(), (24 * ROWS_PER_HOUR) as u64);
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_count_all_hours);
criterion_main!(benches);
