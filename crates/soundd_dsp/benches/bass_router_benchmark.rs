//! Performance benchmarks for the bass router's FFT band split
//!
//! Run with: cargo bench -p soundd_dsp

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use soundd_dsp::{BassRange, BassRouterDispatcher, ChannelAssignment, WireFormat};

fn sine_window(freq: f64, sample_rate: f64, n: usize) -> Vec<i32> {
    (0..n)
        .map(|i| {
            let t = i as f64 / sample_rate;
            let v = (i32::MAX / 2) as f64 * (2.0 * std::f64::consts::PI * freq * t).sin();
            v as i32
        })
        .collect()
}

fn benchmark_dispatch_window_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("bass_router_dispatch");
    let sample_rate = 44_100.0;
    let window_sizes = [256, 512, 1024, 2048];

    for n in window_sizes {
        let input = sine_window(100.0, sample_rate, n);
        group.throughput(Throughput::Elements(n as u64));
        group.bench_function(format!("window_{}_frames", n), |b| {
            let mut dispatcher = BassRouterDispatcher::new(BassRange::default(), sample_rate);
            let mut out = vec![0u8; n * 2 * 4];
            let assignment = ChannelAssignment { bass: 0, residual: 1 };

            b.iter(|| {
                dispatcher
                    .dispatch(
                        black_box(&input),
                        black_box(&mut out),
                        WireFormat::S32LE,
                        2,
                        assignment,
                    )
                    .unwrap();
            });
        });
    }
    group.finish();
}

criterion_group!(benches, benchmark_dispatch_window_sizes);
criterion_main!(benches);
