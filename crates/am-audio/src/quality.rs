use am_core::config::QualityConfig;
use am_core::features::FeatureVector;

/// Estimation de la qualité du mix à partir du niveau et de la balance spectrale.
///
/// `score = level_weight · level + balance_weight · (1 − mean|balance|)`,
/// minus fixed penalties near clipping or silence, clamped to [0, 1].
/// The level term is 1.0 inside the sweet spot and decays as a Gaussian outside.
///
/// # Example
/// ```
/// use am_audio::quality::QualityScorer;
/// use am_core::config::QualityConfig;
///
/// let scorer = QualityScorer::new(&QualityConfig::default());
/// assert_eq!(scorer.score(-80.0, 0.0, 0.0, 0.0), 0.0);
/// assert!(scorer.score(-15.0, 0.0, 0.0, 0.0) > 0.99);
/// ```
#[derive(Clone, Debug)]
pub struct QualityScorer {
    config: QualityConfig,
}

impl QualityScorer {
    /// Build a scorer with the given thresholds.
    #[must_use]
    pub fn new(config: &QualityConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Loudness term in [0, 1].
    #[must_use]
    pub fn level_term(&self, rms_db: f32) -> f32 {
        let c = &self.config;
        let distance = if rms_db < c.sweet_spot_low {
            c.sweet_spot_low - rms_db
        } else if rms_db > c.sweet_spot_high {
            rms_db - c.sweet_spot_high
        } else {
            return 1.0;
        };
        let z = distance / c.falloff_db.max(f32::EPSILON);
        (-0.5 * z * z).exp()
    }

    /// Score one cycle. Non-finite inputs score 0.0.
    #[must_use]
    pub fn score(&self, rms_db: f32, low: f32, mid: f32, high: f32) -> f32 {
        if ![rms_db, low, mid, high].iter().all(|v| v.is_finite()) {
            return 0.0;
        }
        let c = &self.config;
        let imbalance = (low.abs() + mid.abs() + high.abs()) / 3.0;
        let balance = (1.0 - imbalance).clamp(0.0, 1.0);

        let mut score = c.level_weight * self.level_term(rms_db) + c.balance_weight * balance;
        if rms_db > c.clip_db {
            score -= c.clip_penalty;
        }
        if rms_db < c.silence_db {
            score -= c.silence_penalty;
        }
        score.clamp(0.0, 1.0)
    }

    /// Score a feature vector from its level and band balances.
    #[must_use]
    pub fn score_features(&self, features: &FeatureVector) -> f32 {
        self.score(
            features.rms_db,
            features.low_band_balance,
            features.mid_band_balance,
            features.high_band_balance,
        )
    }
}

impl Default for QualityScorer {
    fn default() -> Self {
        Self::new(&QualityConfig::default())
    }
}
