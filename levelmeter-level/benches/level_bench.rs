//! # Level Estimator Benchmarks
//!
//! Per-frame cost of RMS, smoothing and the display hand-off.
//!
//! Run: `cargo bench --bench level_bench`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use levelmeter_level::{frame_rms, Completion, LevelConfig, LevelEstimator, LevelReading};

fn sine_frame(len: usize) -> Vec<i16> {
    (0..len)
        .map(|i| (3000.0 * (i as f64 * 0.12).sin()) as i16)
        .collect()
}

fn bench_frame_rms(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_rms");

    // 20 ms at 8, 16, 44.1 and 48 kHz
    for len in [160usize, 320, 882, 960] {
        let frame = sine_frame(len);
        group.bench_with_input(BenchmarkId::from_parameter(len), &frame, |b, frame| {
            b.iter(|| black_box(frame_rms(black_box(frame))))
        });
    }

    group.finish();
}

fn bench_on_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("on_frame");
    let frame = sine_frame(160);

    group.bench_function("accepted", |b| {
        let sink = |_reading: LevelReading, done: Completion| done.complete();
        let mut estimator = LevelEstimator::new(LevelConfig::default(), sink).unwrap();
        b.iter(|| black_box(estimator.on_frame(black_box(&frame))))
    });

    group.bench_function("dropped", |b| {
        // Holding the completion forever keeps the display busy
        let sink = |_reading: LevelReading, done: Completion| std::mem::forget(done);
        let mut estimator = LevelEstimator::new(LevelConfig::default(), sink).unwrap();
        estimator.on_frame(&frame);
        b.iter(|| black_box(estimator.on_frame(black_box(&frame))))
    });

    group.finish();
}

criterion_group!(benches, bench_frame_rms, bench_on_frame);
criterion_main!(benches);
