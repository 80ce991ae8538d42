//! Audio engine benchmarks
//!
//! Measures the realtime-path primitives the Audio Engine leans on per
//! callback: mixing a bus of contributors and folding the bass router's
//! wire bytes back into canonical samples.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use soundd_core::{fold_mix, from_canonical, to_canonical, Sample, WireFormat};

fn benchmark_fold_mix(c: &mut Criterion) {
    let mut group = c.benchmark_group("fold_mix");

    for contributors in [1usize, 4, 8, 16].iter() {
        let samples: Vec<Sample> = (0..*contributors)
            .map(|i| (i as i64 * 123_457) as Sample)
            .collect();

        group.throughput(Throughput::Elements(*contributors as u64));
        group.bench_function(format!("{}_contributors", contributors), |b| {
            b.iter(|| fold_mix(black_box(&samples)))
        });
    }

    group.finish();
}

fn benchmark_wire_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("wire_round_trip");

    for frames in [64, 256, 1024].iter() {
        let samples: Vec<Sample> = (0..*frames).map(|i| (i * 97) as Sample).collect();

        group.throughput(Throughput::Elements(*frames as u64));
        group.bench_function(format!("{}_frames", frames), |b| {
            b.iter(|| {
                let wire: Vec<u8> = samples
                    .iter()
                    .flat_map(|&s| from_canonical(WireFormat::S32LE, black_box(s)))
                    .collect();
                let decoded: Vec<Sample> = wire
                    .chunks_exact(4)
                    .map(|chunk| to_canonical(WireFormat::S32LE, chunk))
                    .collect();
                black_box(decoded);
            })
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_fold_mix, benchmark_wire_round_trip);
criterion_main!(benches);
