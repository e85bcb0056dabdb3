use criterion::{black_box, criterion_group, criterion_main, Criterion};
use luminar_core::audio::FourierTransform;

fn criterion_benchmark(c: &mut Criterion) {
    let n = 2048;
    let sample_rate = 48_000;
    let samples: Vec<f32> = (0..n)
        .map(|i| (i as f32 * 0.05).sin() * 0.8)
        .collect();

    let mut transform = FourierTransform::new(n, sample_rate, 24).unwrap();
    c.bench_function("windowed fft + octave bands", |b| {
        b.iter(|| {
            transform.compute(black_box(&samples)).unwrap();
            black_box(transform.bands());
        })
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
