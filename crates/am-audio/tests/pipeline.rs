use std::f32::consts::PI;
use std::sync::Arc;
use std::time::Duration;

use am_audio::{AudioPipeline, CaptureBuffer, FeatureProcessor};
use am_core::config::MixConfig;
use am_core::traits::FeatureSource;

const SR: u32 = 44100;

/// Sine at `freq` Hz whose RMS sits at `db` dBFS.
fn tone(freq: f32, db: f32, samples: usize, offset: usize) -> Vec<f32> {
    let amplitude = 10f32.powf(db / 20.0) * std::f32::consts::SQRT_2;
    (offset..offset + samples)
        .map(|i| amplitude * (2.0 * PI * freq * i as f32 / SR as f32).sin())
        .collect()
}

#[test]
fn steady_tone_at_target_level() {
    let config = MixConfig::default();
    let buffer = CaptureBuffer::new(config.audio.buffer_capacity(SR));
    let mut processor = FeatureProcessor::new(&config, SR);
    let chunk = SR as usize / 10;

    let mut cycles = 0;
    for i in 0..30 {
        assert!(buffer.push(&tone(440.0, -16.0, chunk, i * chunk)));
        let features = processor
            .process_buffer(&buffer, i as f64 * 0.1)
            .expect("new samples every cycle");
        assert!(!features.beat_detected, "beat on a steady tone at cycle {i}");
        assert!((features.rms_db + 16.0).abs() < 0.5, "rms_db {}", features.rms_db);
        assert!(features.quality_score > 0.8, "quality {}", features.quality_score);
        assert!((features.spectral_centroid - 440.0).abs() < 25.0);
        assert_eq!(features.bpm, 0.0);
        cycles += 1;
    }
    assert_eq!(cycles, 30);
}

#[test]
fn silence_scores_zero() {
    let config = MixConfig::default();
    let buffer = CaptureBuffer::new(config.audio.buffer_capacity(SR));
    let mut processor = FeatureProcessor::new(&config, SR);
    buffer.push(&vec![0.0; SR as usize]);
    let features = processor.process_buffer(&buffer, 1.0).unwrap();
    assert_eq!(features.rms_db, config.audio.db_floor);
    assert_eq!(features.quality_score, 0.0);
    assert_eq!(
        [
            features.low_band_balance,
            features.mid_band_balance,
            features.high_band_balance
        ],
        [0.0; 3]
    );
}

#[test]
fn background_thread_publishes_latest_features() {
    let config = MixConfig::default();
    let buffer = Arc::new(CaptureBuffer::new(config.audio.buffer_capacity(SR)));
    buffer.push(&tone(440.0, -16.0, SR as usize, 0));

    let (mut pipeline, mut reader) =
        AudioPipeline::start_with_buffer(&config, Arc::clone(&buffer), SR).unwrap();

    let mut published = None;
    for _ in 0..50 {
        std::thread::sleep(Duration::from_millis(20));
        if reader.has_update() {
            published = Some(reader.latest());
            break;
        }
    }
    pipeline.stop();

    let features = published.expect("processing thread never published");
    assert!((features.rms_db + 16.0).abs() < 0.5);
    assert!(pipeline.estimate_mix_quality(&features) > 0.8);
    assert!(!pipeline.is_running());
}

#[test]
fn recent_audio_analysis() {
    let config = MixConfig::default();
    let buffer = Arc::new(CaptureBuffer::new(config.audio.buffer_capacity(SR)));
    let (mut pipeline, _reader) =
        AudioPipeline::start_with_buffer(&config, Arc::clone(&buffer), SR).unwrap();

    assert!(pipeline.analyze_recent(2.0).is_err());
    buffer.push(&tone(1000.0, -12.0, 3 * SR as usize, 0));
    let report = pipeline.analyze_recent(2.0).unwrap();
    assert!((report.duration - 2.0).abs() < 1e-3);
    assert!((report.avg_centroid - 1000.0).abs() < 25.0);
    pipeline.stop();
}
