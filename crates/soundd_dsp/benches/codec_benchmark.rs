//! Performance benchmarks for the PCM codec
//!
//! Run with: cargo bench -p soundd_dsp

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use soundd_dsp::{from_canonical, to_canonical, WireFormat};

const FORMATS: [WireFormat; 7] = [
    WireFormat::U8,
    WireFormat::S16LE,
    WireFormat::S16BE,
    WireFormat::S32LE,
    WireFormat::S32BE,
    WireFormat::F32LE,
    WireFormat::F32BE,
];

fn benchmark_to_canonical(c: &mut Criterion) {
    let mut group = c.benchmark_group("to_canonical");
    for format in FORMATS {
        let wire = from_canonical(format, 123_456_789);
        group.throughput(Throughput::Elements(1));
        group.bench_function(format!("{:?}", format), |b| {
            b.iter(|| to_canonical(black_box(format), black_box(&wire)));
        });
    }
    group.finish();
}

fn benchmark_from_canonical(c: &mut Criterion) {
    let mut group = c.benchmark_group("from_canonical");
    for format in FORMATS {
        group.throughput(Throughput::Elements(1));
        group.bench_function(format!("{:?}", format), |b| {
            b.iter(|| from_canonical(black_box(format), black_box(-987_654_321)));
        });
    }
    group.finish();
}

fn benchmark_buffer_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("round_trip_buffer");
    let buffer_sizes = [64, 256, 1024, 4096];
    for size in buffer_sizes {
        let samples: Vec<i32> = (0..size as i32).map(|i| i.wrapping_mul(104_729)).collect();
        group.throughput(Throughput::Elements(size as u64));
        group.bench_function(format!("s32le_{}_frames", size), |b| {
            b.iter(|| {
                for &s in &samples {
                    let wire = from_canonical(WireFormat::S32LE, black_box(s));
                    black_box(to_canonical(WireFormat::S32LE, &wire));
                }
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    benchmark_to_canonical,
    benchmark_from_canonical,
    benchmark_buffer_round_trip
);
criterion_main!(benches);
