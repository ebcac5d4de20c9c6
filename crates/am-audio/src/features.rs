use am_core::config::AudioConfig;
use am_core::features::FeatureVector;

use crate::fft::FftPipeline;

/// Smallest amplitude fed to log10.
const RMS_EPSILON: f32 = 1e-10;
/// Spectral sums below this count as silence.
const ENERGY_EPSILON: f32 = 1e-12;

/// Low band (Hz).
pub const LOW_BAND: (f32, f32) = (20.0, 250.0);
/// Mid band (Hz).
pub const MID_BAND: (f32, f32) = (250.0, 2000.0);
/// High band (Hz).
pub const HIGH_BAND: (f32, f32) = (2000.0, 8000.0);

/// Converts an audio window into the loudness/spectral part of a [`FeatureVector`].
///
/// `bpm`, `beat_detected` and `quality_score` are left at their defaults;
/// the beat tracker and quality scorer fill them in.
///
/// # Example
/// ```
/// use am_audio::features::FeatureExtractor;
/// use am_core::config::AudioConfig;
///
/// let mut extractor = FeatureExtractor::new(&AudioConfig::default(), 44100);
/// let silence = vec![0.0f32; 2048];
/// let f = extractor.extract(&silence, 0.0);
/// assert_eq!(f.rms_db, -80.0);
/// assert_eq!(f.low_band_balance, 0.0);
/// ```
pub struct FeatureExtractor {
    fft: FftPipeline,
    sample_rate: u32,
    db_floor: f32,
    rolloff_fraction: f32,
}

impl FeatureExtractor {
    /// Build an extractor for the configured window at `sample_rate`.
    #[must_use]
    pub fn new(config: &AudioConfig, sample_rate: u32) -> Self {
        Self {
            fft: FftPipeline::new(config.window_size.max(1)),
            sample_rate: sample_rate.max(1),
            db_floor: config.db_floor,
            rolloff_fraction: config.rolloff_fraction,
        }
    }

    /// Analysis window length in samples.
    #[must_use]
    pub fn window_size(&self) -> usize {
        self.fft.fft_size()
    }

    /// Sample rate the extractor was built for.
    #[must_use]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Extract features from the most recent `window_size` samples.
    ///
    /// Time-domain metrics use the real samples; the spectrum is computed on
    /// the window zero-padded to `window_size`.
    pub fn extract(&mut self, samples: &[f32], timestamp: f64) -> FeatureVector {
        let window = &samples[samples.len().saturating_sub(self.window_size())..];

        let mut features = FeatureVector {
            timestamp,
            ..FeatureVector::default()
        };

        let energy = energy(window);
        features.energy = energy;
        features.rms = energy.sqrt();
        features.rms_db = rms_to_db(features.rms, self.db_floor);
        features.zero_crossing_rate = zero_crossing_rate(window);

        let bin_hz = self.fft.bin_hz(self.sample_rate);
        let spectrum = self.fft.process(window);
        features.spectral_centroid = spectral_centroid(spectrum, bin_hz);
        features.spectral_rolloff = spectral_rolloff(spectrum, bin_hz, self.rolloff_fraction);

        let [low, mid, high] = band_balances(spectrum, bin_hz);
        features.low_band_balance = low;
        features.mid_band_balance = mid;
        features.high_band_balance = high;

        features
    }
}

/// Mean squared amplitude. 0.0 for an empty window.
#[must_use]
pub fn energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = samples.iter().map(|&s| f64::from(s) * f64::from(s)).sum();
    (sum_sq / samples.len() as f64) as f32
}

/// 20·log10(max(rms, ε)) clamped to `floor`.
///
/// # Example
/// ```
/// use am_audio::features::rms_to_db;
/// assert_eq!(rms_to_db(0.0, -80.0), -80.0);
/// assert!((rms_to_db(1.0, -80.0)).abs() < 1e-6);
/// ```
#[inline]
#[must_use]
pub fn rms_to_db(rms: f32, floor: f32) -> f32 {
    if !rms.is_finite() {
        return floor;
    }
    (20.0 * rms.max(RMS_EPSILON).log10()).max(floor)
}

/// Fraction of consecutive sample pairs whose sign differs.
#[must_use]
pub fn zero_crossing_rate(samples: &[f32]) -> f32 {
    if samples.len() < 2 {
        return 0.0;
    }
    let crossings = samples
        .windows(2)
        .filter(|w| (w[0] >= 0.0) != (w[1] >= 0.0))
        .count();
    crossings as f32 / (samples.len() - 1) as f32
}

/// Magnitude-weighted mean frequency (Hz). 0.0 for a silent spectrum.
#[must_use]
pub fn spectral_centroid(spectrum: &[f32], bin_hz: f32) -> f32 {
    let total: f32 = spectrum.iter().sum();
    if total <= ENERGY_EPSILON {
        return 0.0;
    }
    let weighted: f32 = spectrum
        .iter()
        .enumerate()
        .map(|(i, &mag)| i as f32 * bin_hz * mag)
        .sum();
    weighted / total
}

/// Frequency below which `fraction` of the spectral energy lies (Hz).
#[must_use]
pub fn spectral_rolloff(spectrum: &[f32], bin_hz: f32, fraction: f32) -> f32 {
    let total: f32 = spectrum.iter().map(|m| m * m).sum();
    if total <= ENERGY_EPSILON {
        return 0.0;
    }
    let threshold = total * fraction;
    let mut cumulative = 0.0f32;
    for (i, &mag) in spectrum.iter().enumerate() {
        cumulative += mag * mag;
        if cumulative >= threshold {
            return i as f32 * bin_hz;
        }
    }
    (spectrum.len().saturating_sub(1)) as f32 * bin_hz
}

/// Energy in `[low_hz, high_hz)`.
fn band_energy(spectrum: &[f32], low_hz: f32, high_hz: f32, bin_hz: f32) -> f32 {
    let lo = ((low_hz / bin_hz).ceil() as usize).min(spectrum.len());
    let hi = ((high_hz / bin_hz).ceil() as usize).min(spectrum.len());
    if lo >= hi {
        return 0.0;
    }
    spectrum[lo..hi].iter().map(|m| m * m).sum()
}

/// Low/mid/high balance in [-1, 1]: `(E_b − mean(E_others)) / (E_b + mean(E_others))`.
///
/// 0.0 means the band carries as much as the average of the others.
/// Returns neutral zeros for a silent spectrum.
#[must_use]
pub fn band_balances(spectrum: &[f32], bin_hz: f32) -> [f32; 3] {
    let energies = [
        band_energy(spectrum, LOW_BAND.0, LOW_BAND.1, bin_hz),
        band_energy(spectrum, MID_BAND.0, MID_BAND.1, bin_hz),
        band_energy(spectrum, HIGH_BAND.0, HIGH_BAND.1, bin_hz),
    ];
    let total: f32 = energies.iter().sum();
    if total <= ENERGY_EPSILON {
        return [0.0; 3];
    }
    let mut out = [0.0; 3];
    for (i, slot) in out.iter_mut().enumerate() {
        let band = energies[i];
        let others = (total - band) * 0.5;
        let denom = band + others;
        *slot = if denom > ENERGY_EPSILON {
            ((band - others) / denom).clamp(-1.0, 1.0)
        } else {
            0.0
        };
    }
    out
}
