use am_core::config::{AudioConfig, BeatConfig};
use am_core::features::FeatureVector;
use rayon::prelude::*;

use crate::beat::BeatTracker;
use crate::buffer::CaptureBuffer;
use crate::error::AudioError;
use crate::features::FeatureExtractor;

/// Résumé d'une portion de l'historique de capture.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BufferAnalysis {
    /// Seconds analysed.
    pub duration: f32,
    /// Frames analysed.
    pub frames: usize,
    /// Mean frame RMS.
    pub avg_rms: f32,
    /// Standard deviation of frame RMS.
    pub rms_std: f32,
    /// Tempo from the frame energies (0.0 when unknown).
    pub tempo: f32,
    /// Beats found over the span.
    pub beat_count: u64,
    /// Mean spectral centroid (Hz).
    pub avg_centroid: f32,
    /// Mean spectral rolloff (Hz).
    pub avg_rolloff: f32,
    /// Loudest minus quietest frame RMS.
    pub dynamic_range: f32,
}

/// Analyse `samples` frame by frame.
///
/// Frames are `window_size` long with a hop of `window_size / 4` and are
/// extracted in parallel; the beat tracker then runs over the frame energies
/// in order.
///
/// # Errors
/// [`AudioError::InsufficientAudio`] when `samples` is shorter than one frame.
///
/// # Example
/// ```
/// use am_audio::analysis::analyze_samples;
/// use am_core::config::{AudioConfig, BeatConfig};
///
/// let silence = vec![0.0f32; 44100];
/// let report =
///     analyze_samples(&silence, 44100, &AudioConfig::default(), &BeatConfig::default()).unwrap();
/// assert_eq!(report.avg_rms, 0.0);
/// assert_eq!(report.beat_count, 0);
/// ```
pub fn analyze_samples(
    samples: &[f32],
    sample_rate: u32,
    audio: &AudioConfig,
    beat: &BeatConfig,
) -> Result<BufferAnalysis, AudioError> {
    let window = audio.window_size.max(1);
    if samples.len() < window {
        return Err(AudioError::InsufficientAudio {
            available: samples.len(),
            required: window,
        });
    }
    let hop = (window / 4).max(1);
    let rate = f64::from(sample_rate.max(1));
    let starts: Vec<usize> = (0..=samples.len() - window).step_by(hop).collect();

    let frames: Vec<FeatureVector> = starts
        .par_iter()
        .map_init(
            || FeatureExtractor::new(audio, sample_rate),
            |extractor, &start| {
                extractor.extract(&samples[start..start + window], start as f64 / rate)
            },
        )
        .collect();

    let mut tracker = BeatTracker::new(beat);
    for frame in &frames {
        tracker.process(frame.energy, frame.timestamp);
    }

    let n = frames.len() as f32;
    let avg_rms = frames.iter().map(|f| f.rms).sum::<f32>() / n;
    let variance = frames
        .iter()
        .map(|f| (f.rms - avg_rms) * (f.rms - avg_rms))
        .sum::<f32>()
        / n;
    let (min_rms, max_rms) = frames
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), f| {
            (lo.min(f.rms), hi.max(f.rms))
        });

    Ok(BufferAnalysis {
        duration: (samples.len() as f64 / rate) as f32,
        frames: frames.len(),
        avg_rms,
        rms_std: variance.sqrt(),
        tempo: tracker.bpm(),
        beat_count: tracker.beat_count(),
        avg_centroid: frames.iter().map(|f| f.spectral_centroid).sum::<f32>() / n,
        avg_rolloff: frames.iter().map(|f| f.spectral_rolloff).sum::<f32>() / n,
        dynamic_range: max_rms - min_rms,
    })
}

/// Analyse the most recent `seconds` held by `buffer`.
///
/// # Errors
/// [`AudioError::InsufficientAudio`] if the buffer holds fewer samples.
pub fn analyze_buffer(
    buffer: &CaptureBuffer,
    sample_rate: u32,
    seconds: f32,
    audio: &AudioConfig,
    beat: &BeatConfig,
) -> Result<BufferAnalysis, AudioError> {
    let required = ((sample_rate as f32 * seconds.max(0.0)) as usize).max(1);
    let available = buffer.len();
    if available < required {
        return Err(AudioError::InsufficientAudio {
            available,
            required,
        });
    }
    analyze_samples(&buffer.peek(required), sample_rate, audio, beat)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    const SR: u32 = 44100;

    /// 10 ms bursts of 1 kHz every `period` seconds, silence between.
    fn click_track(period: f32, seconds: f32) -> Vec<f32> {
        let len = (SR as f32 * seconds) as usize;
        let every = (SR as f32 * period) as usize;
        let burst = (SR as f32 * 0.01) as usize;
        (0..len)
            .map(|i| {
                let phase = (i + every / 2) % every;
                if phase < burst {
                    0.8 * (2.0 * PI * 1000.0 * i as f32 / SR as f32).sin()
                } else {
                    0.0
                }
            })
            .collect()
    }

    #[test]
    fn click_track_tempo() {
        let samples = click_track(0.5, 6.0);
        let report =
            analyze_samples(&samples, SR, &AudioConfig::default(), &BeatConfig::default()).unwrap();
        assert!(report.beat_count >= 8, "beats {}", report.beat_count);
        assert!((report.tempo - 120.0).abs() < 5.0, "tempo {}", report.tempo);
        assert!(report.dynamic_range > 0.1);
        assert!((report.duration - 6.0).abs() < 1e-3);
    }

    #[test]
    fn steady_tone_has_no_dynamics() {
        let samples: Vec<f32> = (0..SR * 2)
            .map(|i| 0.5 * (2.0 * PI * 440.0 * i as f32 / SR as f32).sin())
            .collect();
        let report =
            analyze_samples(&samples, SR, &AudioConfig::default(), &BeatConfig::default()).unwrap();
        assert!(report.rms_std < 0.01);
        assert!(report.dynamic_range < 0.02);
        assert!((report.avg_centroid - 440.0).abs() < 25.0);
        assert_eq!(report.beat_count, 0);
    }

    #[test]
    fn short_buffer_is_rejected() {
        let buffer = CaptureBuffer::with_duration(SR, 5.0);
        buffer.push(&vec![0.1; SR as usize]);
        let err = analyze_buffer(&buffer, SR, 2.0, &AudioConfig::default(), &BeatConfig::default())
            .unwrap_err();
        assert!(matches!(
            err,
            AudioError::InsufficientAudio {
                available: 44100,
                required: 88200
            }
        ));
        buffer.push(&vec![0.1; SR as usize]);
        assert!(
            analyze_buffer(&buffer, SR, 2.0, &AudioConfig::default(), &BeatConfig::default())
                .is_ok()
        );
    }
}
