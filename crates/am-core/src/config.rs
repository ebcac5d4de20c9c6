use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::features::{FEATURE_FIELDS, MIX_FIELDS};

/// Number of dimensions of the agent state vector (features + mixer).
pub const STATE_DIMS: usize = FEATURE_FIELDS.len() + MIX_FIELDS.len();

/// Configuration complète du pipeline et de l'agent.
///
/// Sérialisable en TOML. Chaque champ a une valeur par défaut saine.
///
/// # Example
/// ```
/// use am_core::config::MixConfig;
/// let config = MixConfig::default();
/// assert_eq!(config.audio.sample_rate, 44100);
/// assert_eq!(config.policy.strategy, "heuristic");
/// ```
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct MixConfig {
    /// Capture and feature extraction.
    #[serde(default)]
    pub audio: AudioConfig,
    /// Beat tracking.
    #[serde(default)]
    pub beat: BeatConfig,
    /// Quality scoring.
    #[serde(default)]
    pub quality: QualityConfig,
    /// Reward shaping.
    #[serde(default)]
    pub reward: RewardConfig,
    /// Decision strategy and learning.
    #[serde(default)]
    pub policy: PolicyConfig,
}

/// Capture and extraction parameters.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Expected input sample rate (Hz). Overridden by the device at capture time.
    pub sample_rate: u32,
    /// Analysis window in samples (≥ 1024, shorter input is zero-padded).
    pub window_size: usize,
    /// Capture history kept by the ring buffer (seconds).
    pub buffer_seconds: f32,
    /// Processing cadence (ms).
    pub process_interval_ms: u64,
    /// Silence floor for `rms_db` (dB).
    pub db_floor: f32,
    /// Energy share defining the spectral rolloff [0.5, 0.99].
    pub rolloff_fraction: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            window_size: 2048,
            buffer_seconds: 5.0,
            process_interval_ms: 100,
            db_floor: -80.0,
            rolloff_fraction: 0.85,
        }
    }
}

impl AudioConfig {
    /// Ring buffer capacity in samples for the given device rate.
    #[must_use]
    pub fn buffer_capacity(&self, sample_rate: u32) -> usize {
        (sample_rate as f32 * self.buffer_seconds) as usize
    }
}

/// Beat tracker parameters.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct BeatConfig {
    /// Instantaneous energy must exceed `baseline * energy_ratio`.
    pub energy_ratio: f32,
    /// Weight of the previous baseline in the rolling average [0.0, 0.999].
    pub baseline_decay: f32,
    /// Minimum seconds between two beats (0.3 s ⇒ 200 BPM max).
    pub min_beat_interval: f64,
    /// Beat timestamps kept for the tempo estimate.
    pub history_len: usize,
    /// Energies below this never trigger (silence guard).
    pub min_energy: f32,
}

impl Default for BeatConfig {
    fn default() -> Self {
        Self {
            energy_ratio: 1.5,
            baseline_decay: 0.9,
            min_beat_interval: 0.3,
            history_len: 8,
            min_energy: 1e-6,
        }
    }
}

/// Quality scorer parameters.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Lower edge of the loudness sweet spot (dB).
    pub sweet_spot_low: f32,
    /// Upper edge of the loudness sweet spot (dB).
    pub sweet_spot_high: f32,
    /// Gaussian falloff outside the sweet spot (dB).
    pub falloff_db: f32,
    /// Near-clipping threshold (dB).
    pub clip_db: f32,
    /// Near-silence threshold (dB).
    pub silence_db: f32,
    /// Subtracted above `clip_db`.
    pub clip_penalty: f32,
    /// Subtracted below `silence_db`.
    pub silence_penalty: f32,
    /// Weight of the loudness term.
    pub level_weight: f32,
    /// Weight of the band-balance term.
    pub balance_weight: f32,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            sweet_spot_low: -20.0,
            sweet_spot_high: -10.0,
            falloff_db: 6.0,
            clip_db: -3.0,
            silence_db: -50.0,
            clip_penalty: 0.5,
            silence_penalty: 0.5,
            level_weight: 0.85,
            balance_weight: 0.15,
        }
    }
}

/// Reward engine parameters.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct RewardConfig {
    /// Loudness target (dB).
    pub target_db: f64,
    /// Distance from the target where the bell has decayed to e^-2 (dB).
    pub margin_db: f64,
    /// Above this level `R_level` sits at `clip_floor`.
    pub clip_db: f64,
    /// Below this level `R_level` sits at `silence_floor`.
    pub silence_db: f64,
    /// `R_level` value when clipping.
    pub clip_floor: f64,
    /// `R_level` value when silent.
    pub silence_floor: f64,
    /// Deck tempo difference where `R_tempo_match` reaches 0.
    pub max_bpm_diff: f64,
    /// Energy delta where `R_energy_flow` reaches 0.
    pub max_energy_delta: f64,
    /// Crossfader movement earning the full transition reward.
    pub crossfade_coherent: f64,
    /// Crossfader movement beyond which the move is abrupt.
    pub crossfade_max_step: f64,
    /// Added when a coherent move lands on a beat.
    pub beat_bonus: f64,
    /// `R_transition` value for abrupt moves (negated).
    pub abrupt_penalty: f64,
    /// Band deviation beyond which a band is penalised.
    pub spectral_max_dev: f64,
    /// Per-band value beyond `spectral_max_dev` (negated).
    pub spectral_over_penalty: f64,
    /// Weight of `R_level`.
    pub w_level: f64,
    /// Weight of `R_tempo_match`.
    pub w_tempo: f64,
    /// Weight of `R_energy_flow`.
    pub w_energy: f64,
    /// Weight of `R_transition`.
    pub w_transition: f64,
    /// Weight of `R_spectral_balance`.
    pub w_spectral: f64,
    /// Fixed, unweighted penalty when clipping.
    pub clipping_penalty: f64,
    /// Fixed, unweighted penalty when silent.
    pub silence_penalty: f64,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            target_db: -16.0,
            margin_db: 8.0,
            clip_db: -3.0,
            silence_db: -40.0,
            clip_floor: -1.0,
            silence_floor: -0.5,
            max_bpm_diff: 6.0,
            max_energy_delta: 0.4,
            crossfade_coherent: 0.3,
            crossfade_max_step: 0.25,
            beat_bonus: 0.3,
            abrupt_penalty: 0.5,
            spectral_max_dev: 0.7,
            spectral_over_penalty: 0.1,
            w_level: 0.3,
            w_tempo: 0.2,
            w_energy: 0.2,
            w_transition: 0.15,
            w_spectral: 0.15,
            clipping_penalty: 0.5,
            silence_penalty: 0.3,
        }
    }
}

/// Decision strategy selected at construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StrategyKind {
    /// Fixed rule table.
    Heuristic,
    /// Trained multi-class classifier, heuristic fallback.
    Classifier,
    /// Tabular Q-learning.
    Reinforcement,
}

impl StrategyKind {
    /// Canonical configuration name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Heuristic => "heuristic",
            Self::Classifier => "classifier",
            Self::Reinforcement => "reinforcement",
        }
    }
}

impl FromStr for StrategyKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "heuristic" | "rules" => Ok(Self::Heuristic),
            "classifier" | "supervised" => Ok(Self::Classifier),
            "reinforcement" | "q-learning" | "qlearning" | "rl" => Ok(Self::Reinforcement),
            _ => Err(CoreError::UnknownStrategy {
                name: s.to_string(),
            }),
        }
    }
}

/// Policy and learning parameters.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// "heuristic" | "classifier" | "reinforcement".
    pub strategy: String,
    /// Directory holding `classifier.bin` and `q_table.bin`.
    pub model_dir: String,
    /// RNG seed for exploration and effect triggers.
    pub seed: u64,
    /// Decision cadence (ms).
    pub decision_interval_ms: u64,
    /// Initial exploration rate.
    pub epsilon_start: f64,
    /// Exploration floor.
    pub epsilon_floor: f64,
    /// Multiplicative decay applied after each decision.
    pub epsilon_decay: f64,
    /// TD learning rate α.
    pub learning_rate: f64,
    /// Discount factor γ.
    pub discount: f64,
    /// Bounded experience set size.
    pub replay_capacity: usize,
    /// Bins per state dimension, features then mixer fields.
    pub bins: Vec<u16>,
    /// Chance of firing an effect on a detected beat (heuristic).
    pub effect_probability: f64,
    /// Chance of starting a transition on a beat while parked on one deck (heuristic).
    pub transition_probability: f64,
    /// Below this many samples a classifier is not trusted.
    pub min_training_samples: usize,
    /// Crossfader delta of the crossfade archetypes.
    pub crossfade_step: f32,
    /// Volume delta of the volume archetypes and rules.
    pub volume_step: f32,
    /// EQ delta of the EQ archetypes and rules.
    pub eq_step: f32,
    /// Gradient epochs when fitting the classifier.
    pub training_epochs: usize,
    /// Gradient step when fitting the classifier.
    pub training_rate: f64,
}

/// Default bins: rms_db ×8, energy ×10, beat ×2, crossfader ×10, deck flags ×2.
pub const DEFAULT_BINS: [u16; STATE_DIMS] = [
    1, 8, 10, 1, 1, 1, 1, 2, 1, 1, 1, 1, // features
    10, 1, 2, 2, 1, 1, // mixer
];

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            strategy: "heuristic".to_string(),
            model_dir: "models".to_string(),
            seed: 42,
            decision_interval_ms: 1000,
            epsilon_start: 0.2,
            epsilon_floor: 0.01,
            epsilon_decay: 0.995,
            learning_rate: 0.1,
            discount: 0.95,
            replay_capacity: 1000,
            bins: DEFAULT_BINS.to_vec(),
            effect_probability: 0.15,
            transition_probability: 0.5,
            min_training_samples: 10,
            crossfade_step: 0.1,
            volume_step: 0.05,
            eq_step: 0.1,
            training_epochs: 200,
            training_rate: 0.1,
        }
    }
}

impl PolicyConfig {
    /// Parse the configured strategy name.
    ///
    /// # Errors
    /// Returns [`CoreError::UnknownStrategy`] for an unrecognised name.
    ///
    /// # Example
    /// ```
    /// use am_core::config::{PolicyConfig, StrategyKind};
    /// let mut p = PolicyConfig::default();
    /// p.strategy = "reinforcement".into();
    /// assert_eq!(p.strategy_kind().unwrap(), StrategyKind::Reinforcement);
    /// p.strategy = "telepathy".into();
    /// assert!(p.strategy_kind().is_err());
    /// ```
    pub fn strategy_kind(&self) -> Result<StrategyKind, CoreError> {
        self.strategy.parse()
    }
}

impl MixConfig {
    /// Clamp all numeric fields to their valid ranges.
    /// Called after TOML deserialization to prevent out-of-range values.
    ///
    /// Non-finite floats (TOML accepts `nan` and `inf`) are first reset to
    /// their default, then clamped like any other value.
    pub fn clamp_all(&mut self) {
        self.reset_non_finite();

        let a = &mut self.audio;
        a.sample_rate = a.sample_rate.clamp(8000, 192_000);
        a.window_size = a.window_size.clamp(1024, 16384);
        a.buffer_seconds = a.buffer_seconds.clamp(0.5, 30.0);
        a.process_interval_ms = a.process_interval_ms.clamp(10, 1000);
        a.db_floor = a.db_floor.clamp(-160.0, -20.0);
        a.rolloff_fraction = a.rolloff_fraction.clamp(0.5, 0.99);

        let b = &mut self.beat;
        b.energy_ratio = b.energy_ratio.clamp(1.01, 10.0);
        b.baseline_decay = b.baseline_decay.clamp(0.0, 0.999);
        b.min_beat_interval = b.min_beat_interval.clamp(0.05, 5.0);
        b.history_len = b.history_len.clamp(2, 64);
        b.min_energy = b.min_energy.clamp(0.0, 1.0);

        let q = &mut self.quality;
        if q.sweet_spot_low > q.sweet_spot_high {
            std::mem::swap(&mut q.sweet_spot_low, &mut q.sweet_spot_high);
        }
        q.falloff_db = q.falloff_db.clamp(0.5, 60.0);
        q.clip_penalty = q.clip_penalty.clamp(0.0, 1.0);
        q.silence_penalty = q.silence_penalty.clamp(0.0, 1.0);
        q.level_weight = q.level_weight.clamp(0.0, 1.0);
        q.balance_weight = q.balance_weight.clamp(0.0, 1.0);

        let r = &mut self.reward;
        r.margin_db = r.margin_db.clamp(0.5, 60.0);
        r.max_bpm_diff = r.max_bpm_diff.clamp(0.1, 100.0);
        r.max_energy_delta = r.max_energy_delta.clamp(1e-3, 10.0);
        r.crossfade_coherent = r.crossfade_coherent.clamp(1e-3, 1.0);
        r.crossfade_max_step = r.crossfade_max_step.clamp(1e-3, 1.0);
        r.spectral_max_dev = r.spectral_max_dev.clamp(1e-3, 1.0);
        r.beat_bonus = r.beat_bonus.max(0.0);
        r.abrupt_penalty = r.abrupt_penalty.max(0.0);
        r.spectral_over_penalty = r.spectral_over_penalty.max(0.0);
        r.clipping_penalty = r.clipping_penalty.max(0.0);
        r.silence_penalty = r.silence_penalty.max(0.0);
        for w in [
            &mut r.w_level,
            &mut r.w_tempo,
            &mut r.w_energy,
            &mut r.w_transition,
            &mut r.w_spectral,
        ] {
            *w = w.max(0.0);
        }

        let p = &mut self.policy;
        p.decision_interval_ms = p.decision_interval_ms.clamp(10, 60_000);
        p.epsilon_start = p.epsilon_start.clamp(0.0, 1.0);
        p.epsilon_floor = p.epsilon_floor.clamp(0.0, p.epsilon_start);
        p.epsilon_decay = p.epsilon_decay.clamp(0.0, 1.0);
        p.learning_rate = p.learning_rate.clamp(0.0, 1.0);
        p.discount = p.discount.clamp(0.0, 1.0);
        p.replay_capacity = p.replay_capacity.clamp(1, 1_000_000);
        if p.bins.len() == STATE_DIMS {
            for bins in &mut p.bins {
                *bins = (*bins).clamp(1, 64);
            }
        } else {
            log::warn!(
                "policy.bins attend {STATE_DIMS} entrées, {} reçues : valeurs par défaut",
                p.bins.len()
            );
            p.bins = DEFAULT_BINS.to_vec();
        }
        p.effect_probability = p.effect_probability.clamp(0.0, 1.0);
        p.transition_probability = p.transition_probability.clamp(0.0, 1.0);
        p.min_training_samples = p.min_training_samples.max(1);
        p.crossfade_step = p.crossfade_step.clamp(0.0, 1.0);
        p.volume_step = p.volume_step.clamp(0.0, 1.0);
        p.eq_step = p.eq_step.clamp(0.0, 1.0);
        p.training_epochs = p.training_epochs.clamp(1, 100_000);
        p.training_rate = p.training_rate.clamp(1e-6, 10.0);
    }

    /// Replace every NaN or infinite float with its default value.
    fn reset_non_finite(&mut self) {
        macro_rules! finite_or_default {
            ($section:ident: $($field:ident),+ $(,)?) => {{
                let defaults = MixConfig::default().$section;
                $(
                    if !self.$section.$field.is_finite() {
                        log::warn!(
                            "{}.{} non fini : valeur par défaut {}",
                            stringify!($section),
                            stringify!($field),
                            defaults.$field
                        );
                        self.$section.$field = defaults.$field;
                    }
                )+
            }};
        }

        finite_or_default!(audio: buffer_seconds, db_floor, rolloff_fraction);
        finite_or_default!(beat: energy_ratio, baseline_decay, min_beat_interval, min_energy);
        finite_or_default!(quality:
            sweet_spot_low, sweet_spot_high, falloff_db, clip_db, silence_db,
            clip_penalty, silence_penalty, level_weight, balance_weight,
        );
        finite_or_default!(reward:
            target_db, margin_db, clip_db, silence_db, clip_floor, silence_floor,
            max_bpm_diff, max_energy_delta, crossfade_coherent, crossfade_max_step,
            beat_bonus, abrupt_penalty, spectral_max_dev, spectral_over_penalty,
            w_level, w_tempo, w_energy, w_transition, w_spectral,
            clipping_penalty, silence_penalty,
        );
        finite_or_default!(policy:
            epsilon_start, epsilon_floor, epsilon_decay, learning_rate, discount,
            effect_probability, transition_probability, crossfade_step, volume_step,
            eq_step, training_rate,
        );
    }
}

/// Charge un fichier TOML et fusionne avec les valeurs par défaut.
///
/// Every section and field is optional; absent ones keep their default.
///
/// # Errors
/// Returns an error if the file cannot be read or parsed.
///
/// # Example
/// ```no_run
/// use am_core::config::load_config;
/// use std::path::Path;
/// let config = load_config(Path::new("config/default.toml")).unwrap();
/// ```
pub fn load_config(path: &Path) -> Result<MixConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Impossible de lire {}", path.display()))?;
    parse_config(&content)
        .with_context(|| format!("Erreur de parsing TOML dans {}", path.display()))
}

/// Parse TOML text into a clamped [`MixConfig`].
///
/// # Errors
/// Returns an error if the text is not valid TOML for this schema.
pub fn parse_config(content: &str) -> Result<MixConfig> {
    let mut config: MixConfig = toml::from_str(content)?;
    config.clamp_all();
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let config = parse_config(
            r#"
            [reward]
            target_db = -14.0

            [policy]
            strategy = "reinforcement"
            "#,
        )
        .unwrap();
        assert_eq!(config.reward.target_db, -14.0);
        assert_eq!(config.reward.max_bpm_diff, 6.0);
        assert_eq!(config.audio.window_size, 2048);
        assert_eq!(
            config.policy.strategy_kind().unwrap(),
            StrategyKind::Reinforcement
        );
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let config = parse_config(
            r#"
            [audio]
            window_size = 16
            rolloff_fraction = 3.0

            [policy]
            epsilon_start = 7.0
            bins = [1, 2, 3]
            "#,
        )
        .unwrap();
        assert_eq!(config.audio.window_size, 1024);
        assert_eq!(config.audio.rolloff_fraction, 0.99);
        assert_eq!(config.policy.epsilon_start, 1.0);
        assert_eq!(config.policy.bins, DEFAULT_BINS.to_vec());
    }

    #[test]
    fn non_finite_values_fall_back_to_defaults() {
        let config = parse_config(
            r#"
            [audio]
            rolloff_fraction = nan

            [quality]
            sweet_spot_high = -inf

            [reward]
            margin_db = nan
            target_db = inf
            w_level = nan

            [policy]
            epsilon_start = nan
            epsilon_floor = 0.05
            learning_rate = -inf
            "#,
        )
        .unwrap();
        let defaults = MixConfig::default();
        assert_eq!(config.audio.rolloff_fraction, defaults.audio.rolloff_fraction);
        assert_eq!(config.quality.sweet_spot_high, defaults.quality.sweet_spot_high);
        assert_eq!(config.reward.margin_db, defaults.reward.margin_db);
        assert_eq!(config.reward.target_db, defaults.reward.target_db);
        assert_eq!(config.reward.w_level, defaults.reward.w_level);
        assert_eq!(config.policy.epsilon_start, defaults.policy.epsilon_start);
        assert_eq!(config.policy.epsilon_floor, 0.05);
        assert_eq!(config.policy.learning_rate, defaults.policy.learning_rate);
    }

    #[test]
    fn default_reward_weights_sum_to_one() {
        let r = RewardConfig::default();
        let sum = r.w_level + r.w_tempo + r.w_energy + r.w_transition + r.w_spectral;
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn unknown_strategy_is_rejected() {
        let err = "banana".parse::<StrategyKind>().unwrap_err();
        assert!(matches!(err, CoreError::UnknownStrategy { .. }));
        assert_eq!("Supervised".parse::<StrategyKind>().unwrap(), StrategyKind::Classifier);
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(&dir.path().join("absent.toml")).unwrap_err();
        assert!(err.to_string().contains("absent.toml"));
    }

    #[test]
    fn load_reads_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mix.toml");
        std::fs::write(&path, "[beat]\nenergy_ratio = 2.0\n").unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.beat.energy_ratio, 2.0);
    }
}
