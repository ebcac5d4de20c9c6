use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Silence floor used when no configuration is at hand (dB).
pub const SILENCE_DB: f32 = -80.0;

/// Stable field order of [`FeatureVector::to_array`].
///
/// Classifier weights and Q-table keys depend on this order; append only.
pub const FEATURE_FIELDS: [&str; 12] = [
    "rms",
    "rms_db",
    "energy",
    "bpm",
    "spectral_centroid",
    "spectral_rolloff",
    "zero_crossing_rate",
    "beat_detected",
    "low_band_balance",
    "mid_band_balance",
    "high_band_balance",
    "quality_score",
];

/// Stable field order of [`MixState::to_array`].
pub const MIX_FIELDS: [&str; 6] = [
    "crossfader_position",
    "master_volume",
    "deck_a_playing",
    "deck_b_playing",
    "deck_a_bpm",
    "deck_b_bpm",
];

/// Résultat de l'analyse audio pour un cycle de traitement.
///
/// Écrit par le thread de traitement, lu par la boucle de décision.
/// Taille fixe, Copy, jamais alloué dynamiquement.
///
/// # Example
/// ```
/// use am_core::features::FeatureVector;
/// let f = FeatureVector::default();
/// assert_eq!(f.rms, 0.0);
/// assert_eq!(f.rms_db, -80.0);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureVector {
    // === Amplitude ===
    /// Root-mean-square amplitude.
    pub rms: f32,
    /// 20·log10(rms), clamped to the configured floor.
    pub rms_db: f32,
    /// Mean squared amplitude.
    pub energy: f32,

    // === Rythme ===
    /// Rolling tempo estimate. 0.0 when unknown.
    pub bpm: f32,

    // === Features spectrales ===
    /// Magnitude-weighted mean frequency (Hz).
    pub spectral_centroid: f32,
    /// Frequency below which the configured share of energy lies (Hz).
    pub spectral_rolloff: f32,
    /// Fraction of sign changes between consecutive samples [0.0, 1.0].
    pub zero_crossing_rate: f32,

    // === Événements ===
    /// True when the beat tracker fired on this cycle.
    pub beat_detected: bool,

    // === Balance de bandes [-1.0, 1.0] ===
    /// Low band (20–250 Hz) versus the others.
    pub low_band_balance: f32,
    /// Mid band (250–2000 Hz) versus the others.
    pub mid_band_balance: f32,
    /// High band (2000–8000 Hz) versus the others.
    pub high_band_balance: f32,

    /// Composite mix-quality estimate [0.0, 1.0].
    pub quality_score: f32,
    /// Seconds since the pipeline started.
    pub timestamp: f64,
}

impl Default for FeatureVector {
    fn default() -> Self {
        Self {
            rms: 0.0,
            rms_db: SILENCE_DB,
            energy: 0.0,
            bpm: 0.0,
            spectral_centroid: 0.0,
            spectral_rolloff: 0.0,
            zero_crossing_rate: 0.0,
            beat_detected: false,
            low_band_balance: 0.0,
            mid_band_balance: 0.0,
            high_band_balance: 0.0,
            quality_score: 0.0,
            timestamp: 0.0,
        }
    }
}

impl FeatureVector {
    /// Numeric view in [`FEATURE_FIELDS`] order. `beat_detected` maps to 0/1.
    ///
    /// # Example
    /// ```
    /// use am_core::features::FeatureVector;
    /// let f = FeatureVector { beat_detected: true, ..FeatureVector::default() };
    /// assert_eq!(f.to_array()[7], 1.0);
    /// ```
    #[must_use]
    pub fn to_array(&self) -> [f32; 12] {
        [
            self.rms,
            self.rms_db,
            self.energy,
            self.bpm,
            self.spectral_centroid,
            self.spectral_rolloff,
            self.zero_crossing_rate,
            if self.beat_detected { 1.0 } else { 0.0 },
            self.low_band_balance,
            self.mid_band_balance,
            self.high_band_balance,
            self.quality_score,
        ]
    }

    /// `true` if every numeric field is finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|v| v.is_finite()) && self.timestamp.is_finite()
    }

    /// Replace NaN/Inf by neutral defaults and force ranged fields into range.
    ///
    /// # Example
    /// ```
    /// use am_core::features::FeatureVector;
    /// let f = FeatureVector {
    ///     rms_db: f32::NAN,
    ///     low_band_balance: 4.0,
    ///     ..FeatureVector::default()
    /// };
    /// let s = f.sanitized();
    /// assert_eq!(s.rms_db, -80.0);
    /// assert_eq!(s.low_band_balance, 1.0);
    /// ```
    #[must_use]
    pub fn sanitized(&self) -> Self {
        let d = Self::default();
        Self {
            rms: finite_or(self.rms, d.rms).max(0.0),
            rms_db: finite_or(self.rms_db, d.rms_db),
            energy: finite_or(self.energy, d.energy).max(0.0),
            bpm: finite_or(self.bpm, d.bpm).max(0.0),
            spectral_centroid: finite_or(self.spectral_centroid, d.spectral_centroid).max(0.0),
            spectral_rolloff: finite_or(self.spectral_rolloff, d.spectral_rolloff).max(0.0),
            zero_crossing_rate: finite_or(self.zero_crossing_rate, d.zero_crossing_rate)
                .clamp(0.0, 1.0),
            beat_detected: self.beat_detected,
            low_band_balance: finite_or(self.low_band_balance, 0.0).clamp(-1.0, 1.0),
            mid_band_balance: finite_or(self.mid_band_balance, 0.0).clamp(-1.0, 1.0),
            high_band_balance: finite_or(self.high_band_balance, 0.0).clamp(-1.0, 1.0),
            quality_score: finite_or(self.quality_score, d.quality_score).clamp(0.0, 1.0),
            timestamp: if self.timestamp.is_finite() {
                self.timestamp
            } else {
                d.timestamp
            },
        }
    }
}

/// Copie de l'état de la table de mixage, lue une fois par cycle.
///
/// # Example
/// ```
/// use am_core::features::MixState;
/// let m = MixState { crossfader_position: 1.7, ..MixState::default() }.clamped();
/// assert_eq!(m.crossfader_position, 1.0);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixState {
    /// 0.0 = full deck A, 1.0 = full deck B.
    pub crossfader_position: f32,
    /// Master output gain [0.0, 1.0].
    pub master_volume: f32,
    /// Deck A is playing.
    pub deck_a_playing: bool,
    /// Deck B is playing.
    pub deck_b_playing: bool,
    /// Deck A tempo (0.0 when unknown).
    pub deck_a_bpm: f32,
    /// Deck B tempo (0.0 when unknown).
    pub deck_b_bpm: f32,
    /// Deck A channel volume [0.0, 1.0].
    pub deck_a_volume: f32,
    /// Deck B channel volume [0.0, 1.0].
    pub deck_b_volume: f32,
}

impl Default for MixState {
    fn default() -> Self {
        Self {
            crossfader_position: 0.5,
            master_volume: 0.8,
            deck_a_playing: false,
            deck_b_playing: false,
            deck_a_bpm: 0.0,
            deck_b_bpm: 0.0,
            deck_a_volume: 0.8,
            deck_b_volume: 0.8,
        }
    }
}

impl MixState {
    /// Upper bound accepted for deck tempos.
    pub const MAX_BPM: f32 = 300.0;

    /// Clamp every field into its valid range. Non-finite values fall back
    /// to the defaults. Never fails.
    #[must_use]
    pub fn clamped(&self) -> Self {
        let d = Self::default();
        Self {
            crossfader_position: finite_or(self.crossfader_position, d.crossfader_position)
                .clamp(0.0, 1.0),
            master_volume: finite_or(self.master_volume, d.master_volume).clamp(0.0, 1.0),
            deck_a_playing: self.deck_a_playing,
            deck_b_playing: self.deck_b_playing,
            deck_a_bpm: finite_or(self.deck_a_bpm, 0.0).clamp(0.0, Self::MAX_BPM),
            deck_b_bpm: finite_or(self.deck_b_bpm, 0.0).clamp(0.0, Self::MAX_BPM),
            deck_a_volume: finite_or(self.deck_a_volume, d.deck_a_volume).clamp(0.0, 1.0),
            deck_b_volume: finite_or(self.deck_b_volume, d.deck_b_volume).clamp(0.0, 1.0),
        }
    }

    /// Numeric view in [`MIX_FIELDS`] order. Flags map to 0/1.
    #[must_use]
    pub fn to_array(&self) -> [f32; 6] {
        [
            self.crossfader_position,
            self.master_volume,
            if self.deck_a_playing { 1.0 } else { 0.0 },
            if self.deck_b_playing { 1.0 } else { 0.0 },
            self.deck_a_bpm,
            self.deck_b_bpm,
        ]
    }
}

/// EQ band addressed by [`ActionCommand::eq_adjust`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EqBand {
    /// Bass.
    Low,
    /// Mids.
    Mid,
    /// Highs.
    High,
}

/// Commande émise par l'agent à chaque cycle de décision.
///
/// Créée à neuf, remise immédiatement au sink externe, jamais conservée.
///
/// # Example
/// ```
/// use am_core::features::ActionCommand;
/// let cmd = ActionCommand { crossfade_adjust: -3.0, ..ActionCommand::default() }.clamped();
/// assert_eq!(cmd.crossfade_adjust, -1.0);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionCommand {
    /// Signed crossfader delta [-1.0, 1.0].
    pub crossfade_adjust: f32,
    /// Deck A volume delta [-1.0, 1.0].
    pub volume_adjust_a: f32,
    /// Deck B volume delta [-1.0, 1.0].
    pub volume_adjust_b: f32,
    /// Per-band EQ deltas [-1.0, 1.0].
    pub eq_adjust: BTreeMap<EqBand, f32>,
    /// Effect slot to fire, if any.
    pub effect_trigger: Option<u8>,
    /// Start a transition on this cycle.
    pub transition_now: bool,
}

impl ActionCommand {
    /// Bound every delta to [-1.0, 1.0]; non-finite deltas become 0.0.
    #[must_use]
    pub fn clamped(mut self) -> Self {
        self.crossfade_adjust = finite_or(self.crossfade_adjust, 0.0).clamp(-1.0, 1.0);
        self.volume_adjust_a = finite_or(self.volume_adjust_a, 0.0).clamp(-1.0, 1.0);
        self.volume_adjust_b = finite_or(self.volume_adjust_b, 0.0).clamp(-1.0, 1.0);
        for delta in self.eq_adjust.values_mut() {
            *delta = finite_or(*delta, 0.0).clamp(-1.0, 1.0);
        }
        self
    }

    /// `true` when executing the command would change nothing.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.crossfade_adjust == 0.0
            && self.volume_adjust_a == 0.0
            && self.volume_adjust_b == 0.0
            && self.eq_adjust.values().all(|d| *d == 0.0)
            && self.effect_trigger.is_none()
            && !self.transition_now
    }
}

#[inline(always)]
fn finite_or(value: f32, fallback: f32) -> f32 {
    if value.is_finite() { value } else { fallback }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feature_array_follows_schema_order() {
        let f = FeatureVector {
            rms: 1.0,
            rms_db: 2.0,
            energy: 3.0,
            bpm: 4.0,
            spectral_centroid: 5.0,
            spectral_rolloff: 6.0,
            zero_crossing_rate: 0.7,
            beat_detected: true,
            low_band_balance: 0.1,
            mid_band_balance: 0.2,
            high_band_balance: 0.3,
            quality_score: 0.4,
            timestamp: 9.0,
        };
        let arr = f.to_array();
        assert_eq!(arr.len(), FEATURE_FIELDS.len());
        assert_eq!(arr[0], 1.0);
        assert_eq!(arr[3], 4.0);
        assert_eq!(arr[7], 1.0);
        assert_eq!(arr[11], 0.4);
    }

    #[test]
    fn sanitize_replaces_non_finite() {
        let f = FeatureVector {
            rms: f32::INFINITY,
            energy: f32::NAN,
            bpm: f32::NEG_INFINITY,
            quality_score: f32::NAN,
            timestamp: f64::NAN,
            ..FeatureVector::default()
        };
        assert!(!f.is_finite());
        let s = f.sanitized();
        assert!(s.is_finite());
        assert_eq!(s.rms, 0.0);
        assert_eq!(s.energy, 0.0);
        assert_eq!(s.bpm, 0.0);
        assert_eq!(s.timestamp, 0.0);
    }

    #[test]
    fn mix_state_clamps_out_of_range() {
        let m = MixState {
            crossfader_position: -0.4,
            master_volume: f32::NAN,
            deck_a_bpm: 900.0,
            deck_b_bpm: -5.0,
            deck_a_volume: 2.0,
            ..MixState::default()
        }
        .clamped();
        assert_eq!(m.crossfader_position, 0.0);
        assert_eq!(m.master_volume, 0.8);
        assert_eq!(m.deck_a_bpm, MixState::MAX_BPM);
        assert_eq!(m.deck_b_bpm, 0.0);
        assert_eq!(m.deck_a_volume, 1.0);
    }

    #[test]
    fn action_clamp_and_noop() {
        assert!(ActionCommand::default().is_noop());
        let mut cmd = ActionCommand {
            volume_adjust_b: f32::NAN,
            ..ActionCommand::default()
        };
        cmd.eq_adjust.insert(EqBand::High, 5.0);
        let cmd = cmd.clamped();
        assert_eq!(cmd.volume_adjust_b, 0.0);
        assert_eq!(cmd.eq_adjust[&EqBand::High], 1.0);
        assert!(!cmd.is_noop());
    }
}
