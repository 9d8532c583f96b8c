//! Benchmarks for neighbor queries
//!
//! Run with: cargo bench -p tunesense-recommend

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use tunesense_core::{FeatureSchema, FeatureVector, IndexConfig, TrackId, TrackMetadata};
use tunesense_recommend::{JoinedRow, JoinedTable, NeighborIndex};

// Deterministic pseudo-random rows
fn synthetic_table(rows: usize) -> JoinedTable {
    let schema = FeatureSchema::V1;
    let mut state = 0x2545_f491_u32;
    let mut next = move || {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        state as f32 / u32::MAX as f32
    };

    JoinedTable {
        schema,
        columns: schema.columns(),
        rows: (0..rows)
            .map(|i| JoinedRow {
                track_id: TrackId(i as u64),
                features: FeatureVector::new((0..schema.width()).map(|_| next()).collect()),
                metadata: TrackMetadata::default(),
            })
            .collect(),
    }
}

fn bench_query_track(c: &mut Criterion) {
    let mut group = c.benchmark_group("Query Track");

    for rows in [1_000usize, 8_000, 25_000] {
        let index = NeighborIndex::build(&synthetic_table(rows), &IndexConfig::default()).unwrap();
        group.bench_with_input(BenchmarkId::new("k=5", rows), &index, |b, index| {
            b.iter(|| index.query_track(black_box(TrackId(rows as u64 / 2)), 5))
        });
    }

    group.finish();
}

fn bench_build_index(c: &mut Criterion) {
    let table = synthetic_table(8_000);
    c.bench_function("Build Index 8000", |b| {
        b.iter(|| NeighborIndex::build(black_box(&table), &IndexConfig::default()))
    });
}

criterion_group!(benches, bench_query_track, bench_build_index);
criterion_main!(benches);
