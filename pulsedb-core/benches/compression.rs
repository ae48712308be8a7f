//! Benchmarks for the PulseDB codecs.
//!
//! Run with: cargo bench --package pulsedb-core

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use pulsedb_core::compression::{compress_points, decompress_points};
use pulsedb_core::Point;

/// Generate typical time series data (regular intervals, slowly varying values).
fn generate_typical_timeseries(count: usize) -> Vec<Point> {
    let start_ts = 1_000_000_000_i64;
    let interval = 10_i64;

    let mut value = 50.0;
    let mut points = Vec::with_capacity(count);
    for i in 0..count {
        value += (i as f64 * 0.1).sin() * 0.1;
        points.push(Point::new(start_ts + (i as i64) * interval, value));
    }

    points
}

fn bench_compress(c: &mut Criterion) {
    let points = generate_typical_timeseries(10_000);

    c.bench_function("compress_10k", |b| {
        b.iter(|| compress_points(black_box(&points)))
    });
}

fn bench_decompress(c: &mut Criterion) {
    let points = generate_typical_timeseries(10_000);
    let (timestamps, values) = compress_points(&points);

    c.bench_function("decompress_10k", |b| {
        b.iter(|| decompress_points(black_box(&timestamps), black_box(&values), points.len()))
    });
}

fn bench_roundtrip(c: &mut Criterion) {
    let points = generate_typical_timeseries(10_000);

    c.bench_function("roundtrip_10k", |b| {
        b.iter(|| {
            let (timestamps, values) = compress_points(black_box(&points));
            decompress_points(&timestamps, &values, points.len()).unwrap()
        })
    });
}

criterion_group!(benches, bench_compress, bench_decompress, bench_roundtrip);
criterion_main!(benches);
