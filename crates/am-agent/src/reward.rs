use am_core::config::RewardConfig;
use am_core::features::{FeatureVector, MixState};

/// Crossfader movement below this counts as no movement.
const STILL_EPSILON: f64 = 1e-6;

/// Décomposition de la récompense d'un cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RewardBreakdown {
    /// Loudness term.
    pub level: f64,
    /// Deck tempo agreement.
    pub tempo_match: f64,
    /// Energy continuity.
    pub energy_flow: f64,
    /// Crossfader movement quality.
    pub transition: f64,
    /// Band balance.
    pub spectral_balance: f64,
    /// `level`, `tempo_match`, `energy_flow`, `transition`, `spectral_balance`
    /// multiplied by their weights.
    pub weighted: [f64; 5],
    /// Sum of `weighted`.
    pub total_before_penalties: f64,
    /// Fixed penalty applied when clipping (0.0 otherwise).
    pub clipping_penalty: f64,
    /// Fixed penalty applied when silent (0.0 otherwise).
    pub silence_penalty: f64,
    /// Final reward.
    pub total: f64,
}

/// Loudness bell around `target_db`, floored beyond the clip and silence thresholds.
///
/// # Example
/// ```
/// use am_agent::reward::r_level;
/// use am_core::config::RewardConfig;
/// let c = RewardConfig::default();
/// assert_eq!(r_level(-16.0, &c), 1.0);
/// assert_eq!(r_level(-1.0, &c), c.clip_floor);
/// assert_eq!(r_level(-60.0, &c), c.silence_floor);
/// ```
#[must_use]
pub fn r_level(rms_db: f64, c: &RewardConfig) -> f64 {
    if !rms_db.is_finite() || rms_db < c.silence_db {
        return c.silence_floor;
    }
    if rms_db > c.clip_db {
        return c.clip_floor;
    }
    let z = (rms_db - c.target_db) / c.margin_db;
    (-2.0 * z * z).exp()
}

/// 1.0 for equal tempos, 0.0 at `max_bpm_diff` apart or when a deck is stopped (bpm ≤ 0).
#[must_use]
pub fn r_tempo_match(bpm_a: f64, bpm_b: f64, c: &RewardConfig) -> f64 {
    if bpm_a <= 0.0 || bpm_b <= 0.0 || !bpm_a.is_finite() || !bpm_b.is_finite() {
        return 0.0;
    }
    (1.0 - (bpm_a - bpm_b).abs() / c.max_bpm_diff).max(0.0)
}

/// 1.0 for unchanged energy, 0.0 at `max_energy_delta`; 0.5 with no history.
#[must_use]
pub fn r_energy_flow(energy: f64, previous: Option<f64>, c: &RewardConfig) -> f64 {
    match previous {
        None => 0.5,
        Some(prev) => (1.0 - (energy - prev).abs() / c.max_energy_delta).max(0.0),
    }
}

/// Crossfader movement score.
///
/// 0.0 without movement, `min(|Δ| / crossfade_coherent, 1)` for a coherent
/// move plus `beat_bonus` when it lands on a beat, `-abrupt_penalty` beyond
/// `crossfade_max_step`.
///
/// # Example
/// ```
/// use am_agent::reward::r_transition;
/// use am_core::config::RewardConfig;
/// let c = RewardConfig::default();
/// assert_eq!(r_transition(0.0, true, &c), 0.0);
/// assert_eq!(r_transition(0.5, false, &c), -c.abrupt_penalty);
/// ```
#[must_use]
pub fn r_transition(delta: f64, on_beat: bool, c: &RewardConfig) -> f64 {
    let moved = delta.abs();
    if !moved.is_finite() || moved < STILL_EPSILON {
        return 0.0;
    }
    if moved > c.crossfade_max_step {
        return -c.abrupt_penalty;
    }
    let scaled = (moved / c.crossfade_coherent).min(1.0);
    if on_beat { scaled + c.beat_bonus } else { scaled }
}

/// Mean per-band score: `1 − |b| / spectral_max_dev`, or `-spectral_over_penalty` beyond it.
#[must_use]
pub fn r_spectral_balance(bands: [f64; 3], c: &RewardConfig) -> f64 {
    let sum: f64 = bands
        .iter()
        .map(|b| {
            let dev = b.abs();
            if dev > c.spectral_max_dev {
                -c.spectral_over_penalty
            } else {
                1.0 - dev / c.spectral_max_dev
            }
        })
        .sum();
    sum / bands.len() as f64
}

/// Calcule la récompense à partir de deux observations successives.
///
/// [`evaluate`](Self::evaluate) is pure; [`observe`](Self::observe) keeps
/// the previous observation itself.
#[derive(Clone, Debug)]
pub struct RewardEngine {
    config: RewardConfig,
    previous: Option<(FeatureVector, MixState)>,
}

impl RewardEngine {
    /// Create an engine with the given constants.
    #[must_use]
    pub fn new(config: &RewardConfig) -> Self {
        Self {
            config: config.clone(),
            previous: None,
        }
    }

    /// Constants in use.
    #[must_use]
    pub fn config(&self) -> &RewardConfig {
        &self.config
    }

    /// Score `current` against the previous cycle (if any).
    #[must_use]
    pub fn evaluate(
        &self,
        current: &FeatureVector,
        previous: Option<&FeatureVector>,
        mix: &MixState,
        prev_mix: Option<&MixState>,
    ) -> RewardBreakdown {
        let c = &self.config;
        let rms_db = f64::from(current.rms_db);

        let deck_bpm = |playing: bool, bpm: f32| if playing { f64::from(bpm) } else { 0.0 };
        let crossfade_delta = prev_mix.map_or(0.0, |p| {
            f64::from(mix.crossfader_position) - f64::from(p.crossfader_position)
        });

        let level = r_level(rms_db, c);
        let tempo_match = r_tempo_match(
            deck_bpm(mix.deck_a_playing, mix.deck_a_bpm),
            deck_bpm(mix.deck_b_playing, mix.deck_b_bpm),
            c,
        );
        let energy_flow = r_energy_flow(
            f64::from(current.energy),
            previous.map(|p| f64::from(p.energy)),
            c,
        );
        let transition = r_transition(crossfade_delta, current.beat_detected, c);
        let spectral_balance = r_spectral_balance(
            [
                f64::from(current.low_band_balance),
                f64::from(current.mid_band_balance),
                f64::from(current.high_band_balance),
            ],
            c,
        );

        let weighted = [
            c.w_level * level,
            c.w_tempo * tempo_match,
            c.w_energy * energy_flow,
            c.w_transition * transition,
            c.w_spectral * spectral_balance,
        ];
        let total_before_penalties: f64 = weighted.iter().sum();
        let clipping_penalty = if rms_db > c.clip_db { c.clipping_penalty } else { 0.0 };
        let silence_penalty = if rms_db < c.silence_db { c.silence_penalty } else { 0.0 };

        RewardBreakdown {
            level,
            tempo_match,
            energy_flow,
            transition,
            spectral_balance,
            weighted,
            total_before_penalties,
            clipping_penalty,
            silence_penalty,
            total: total_before_penalties - clipping_penalty - silence_penalty,
        }
    }

    /// Score `current` against the last observed cycle, then remember it.
    pub fn observe(&mut self, current: &FeatureVector, mix: &MixState) -> RewardBreakdown {
        let breakdown = match &self.previous {
            Some((f, m)) => self.evaluate(current, Some(f), mix, Some(m)),
            None => self.evaluate(current, None, mix, None),
        };
        self.previous = Some((*current, *mix));
        breakdown
    }

    /// Forget the previous observation.
    pub fn reset(&mut self) {
        self.previous = None;
    }
}

impl Default for RewardEngine {
    fn default() -> Self {
        Self::new(&RewardConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decks_at(bpm: f32, crossfader: f32) -> MixState {
        MixState {
            crossfader_position: crossfader,
            deck_a_playing: true,
            deck_b_playing: true,
            deck_a_bpm: bpm,
            deck_b_bpm: bpm,
            ..MixState::default()
        }
    }

    #[test]
    fn level_peaks_at_target_and_decays() {
        let c = RewardConfig::default();
        assert_eq!(r_level(c.target_db, &c), 1.0);
        let mut prev = 1.0;
        for step in 1..=8 {
            let below = r_level(c.target_db - f64::from(step), &c);
            let above = r_level(c.target_db + f64::from(step), &c);
            assert!(below < prev);
            assert!(above <= below + 1e-12);
            prev = below;
        }
        assert!((r_level(c.target_db - c.margin_db, &c) - (-2.0f64).exp()).abs() < 1e-12);
        assert_eq!(r_level(0.0, &c), c.clip_floor);
        assert_eq!(r_level(-80.0, &c), c.silence_floor);
        assert_eq!(r_level(f64::NAN, &c), c.silence_floor);
    }

    #[test]
    fn tempo_match_behaviour() {
        let c = RewardConfig::default();
        for bpm in [60.0, 128.0, 174.0] {
            assert_eq!(r_tempo_match(bpm, bpm, &c), 1.0);
        }
        assert_eq!(r_tempo_match(128.0, 134.0, &c), 0.0);
        assert_eq!(r_tempo_match(128.0, 140.0, &c), 0.0);
        assert!((r_tempo_match(128.0, 131.0, &c) - 0.5).abs() < 1e-12);
        assert_eq!(r_tempo_match(0.0, 0.0, &c), 0.0);
    }

    #[test]
    fn stopped_deck_gets_no_tempo_reward() {
        let engine = RewardEngine::default();
        let mut mix = decks_at(128.0, 0.5);
        mix.deck_b_playing = false;
        let b = engine.evaluate(&FeatureVector::default(), None, &mix, None);
        assert_eq!(b.tempo_match, 0.0);
    }

    #[test]
    fn energy_flow_is_neutral_without_history() {
        let c = RewardConfig::default();
        assert_eq!(r_energy_flow(0.7, None, &c), 0.5);
        assert_eq!(r_energy_flow(0.3, Some(0.3), &c), 1.0);
        assert_eq!(r_energy_flow(0.9, Some(0.3), &c), 0.0);
    }

    #[test]
    fn spectral_balance_rewards_flat_spectrum() {
        let c = RewardConfig::default();
        assert_eq!(r_spectral_balance([0.0; 3], &c), 1.0);
        assert!((r_spectral_balance([0.9, 0.9, 0.9], &c) + c.spectral_over_penalty).abs() < 1e-12);
    }

    #[test]
    fn beat_bonus_is_exact() {
        let engine = RewardEngine::default();
        let before = decks_at(128.0, 0.30);
        let after = decks_at(128.0, 0.35);
        let features = FeatureVector {
            rms_db: -14.0,
            energy: 0.5,
            bpm: 128.0,
            ..FeatureVector::default()
        };
        let on_beat = FeatureVector {
            beat_detected: true,
            ..features
        };

        let baseline = engine.evaluate(&features, Some(&features), &after, Some(&before));
        let synced = engine.evaluate(&on_beat, Some(&features), &after, Some(&before));

        let c = engine.config();
        assert!((synced.transition - baseline.transition - c.beat_bonus).abs() < 1e-9);
        assert!(
            (synced.total - baseline.total - c.w_transition * c.beat_bonus).abs() < 1e-9
        );
        assert!(synced.transition > baseline.transition);
        assert_eq!(synced.tempo_match, 1.0);
    }

    #[test]
    fn abrupt_moves_are_penalised() {
        let engine = RewardEngine::default();
        let f = FeatureVector {
            beat_detected: true,
            ..FeatureVector::default()
        };
        let b = engine.evaluate(&f, Some(&f), &decks_at(128.0, 0.9), Some(&decks_at(128.0, 0.1)));
        assert_eq!(b.transition, -engine.config().abrupt_penalty);
    }

    #[test]
    fn hard_penalties_are_unweighted() {
        let engine = RewardEngine::default();
        let c = engine.config().clone();
        let hot = FeatureVector {
            rms_db: -1.0,
            ..FeatureVector::default()
        };
        let b = engine.evaluate(&hot, None, &MixState::default(), None);
        assert_eq!(b.clipping_penalty, c.clipping_penalty);
        assert_eq!(b.silence_penalty, 0.0);
        assert!((b.total - (b.total_before_penalties - c.clipping_penalty)).abs() < 1e-12);

        let quiet = FeatureVector::default();
        let b = engine.evaluate(&quiet, None, &MixState::default(), None);
        assert_eq!(b.silence_penalty, c.silence_penalty);
    }

    #[test]
    fn observe_tracks_previous_cycle() {
        let mut engine = RewardEngine::default();
        let f = FeatureVector {
            rms_db: -16.0,
            energy: 0.4,
            ..FeatureVector::default()
        };
        let mix = decks_at(120.0, 0.5);
        assert_eq!(engine.observe(&f, &mix).energy_flow, 0.5);
        assert_eq!(engine.observe(&f, &mix).energy_flow, 1.0);
        engine.reset();
        assert_eq!(engine.observe(&f, &mix).energy_flow, 0.5);
    }
}
