//! Benchmarks for the hot path every incoming audio chunk runs through:
//! resampling to the canonical rate and buffer append/extract.

use babelrelay::audio::buffer::ChunkedAudioBuffer;
use babelrelay::audio::resampler::resample;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

fn tone(n: usize) -> Vec<f32> {
    (0..n).map(|i| (i as f32 * 0.1).sin() * 0.5).collect()
}

fn bench_resample(c: &mut Criterion) {
    let mut group = c.benchmark_group("resample");
    for &(input_rate, chunk_ms) in &[(44_100u32, 20usize), (48_000, 20), (8_000, 20)] {
        let n = (input_rate as usize * chunk_ms) / 1000;
        let samples = tone(n);
        group.bench_with_input(
            BenchmarkId::new("to_16k", format!("{input_rate}hz_{chunk_ms}ms")),
            &samples,
            |b, samples| {
                b.iter(|| resample(samples, input_rate, 16_000).unwrap());
            },
        );
    }
    group.finish();
}

fn bench_buffer_append_extract(c: &mut Criterion) {
    let chunk = tone(320); // 20ms at 16kHz
    c.bench_function("buffer_append_20ms_chunk", |b| {
        b.iter(|| {
            let mut buffer = ChunkedAudioBuffer::new(16_000, 60 * 16_000, 0);
            for _ in 0..50 {
                buffer.append(&chunk);
            }
        });
    });

    let mut buffer = ChunkedAudioBuffer::new(16_000, 60 * 16_000, 0);
    for _ in 0..500 {
        buffer.append(&chunk);
    }
    c.bench_function("buffer_extract_1s_range", |b| {
        b.iter(|| buffer.extract_range(0.0, 1.0));
    });
}

criterion_group!(benches, bench_resample, bench_buffer_append_extract);
criterion_main!(benches);
