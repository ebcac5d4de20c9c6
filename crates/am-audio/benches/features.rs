//! Criterion benchmarks for the per-cycle processing path.
//!
//! Run with: cargo bench -p am-audio

use std::f32::consts::PI;
use std::hint::black_box;

use am_audio::FeatureProcessor;
use am_audio::buffer::CaptureBuffer;
use am_audio::features::FeatureExtractor;
use am_core::config::{AudioConfig, MixConfig};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

const SAMPLE_RATE: u32 = 44100;

fn generate_mix(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            0.4 * (2.0 * PI * 110.0 * t).sin()
                + 0.2 * (2.0 * PI * 880.0 * t).sin()
                + 0.1 * (2.0 * PI * 4400.0 * t).sin()
        })
        .collect()
}

fn bench_extract(c: &mut Criterion) {
    let mut group = c.benchmark_group("FeatureExtractor");
    for window in [1024usize, 2048, 4096] {
        let config = AudioConfig {
            window_size: window,
            ..AudioConfig::default()
        };
        let mut extractor = FeatureExtractor::new(&config, SAMPLE_RATE);
        let samples = generate_mix(window);
        group.bench_with_input(BenchmarkId::from_parameter(window), &samples, |b, s| {
            b.iter(|| extractor.extract(black_box(s), 0.0));
        });
    }
    group.finish();
}

fn bench_cycle(c: &mut Criterion) {
    let buffer = CaptureBuffer::with_duration(SAMPLE_RATE, 5.0);
    let chunk = generate_mix(4410);
    let mut processor = FeatureProcessor::new(&MixConfig::default(), SAMPLE_RATE);
    let mut t = 0.0;
    c.bench_function("processing_cycle", |b| {
        b.iter(|| {
            buffer.push(black_box(&chunk));
            t += 0.1;
            processor.process_buffer(&buffer, t)
        });
    });
}

fn bench_push(c: &mut Criterion) {
    let buffer = CaptureBuffer::with_duration(SAMPLE_RATE, 5.0);
    let chunk = generate_mix(512);
    c.bench_function("capture_push_512", |b| {
        b.iter(|| buffer.push(black_box(&chunk)));
    });
}

criterion_group!(benches, bench_extract, bench_cycle, bench_push);
criterion_main!(benches);
