use am_core::config::STATE_DIMS;
use am_core::features::{FeatureVector, MixState};
use serde::{Deserialize, Serialize};

/// Value range mapped onto the bins of each state dimension, in
/// [`StateVector`] order. Values outside are clamped into the edge bins.
pub const DIM_RANGES: [(f32, f32); STATE_DIMS] = [
    (0.0, 1.0),       // rms
    (-80.0, 0.0),     // rms_db
    (0.0, 1.0),       // energy
    (0.0, 200.0),     // bpm
    (0.0, 8000.0),    // spectral_centroid
    (0.0, 11025.0),   // spectral_rolloff
    (0.0, 1.0),       // zero_crossing_rate
    (0.0, 1.0),       // beat_detected
    (-1.0, 1.0),      // low_band_balance
    (-1.0, 1.0),      // mid_band_balance
    (-1.0, 1.0),      // high_band_balance
    (0.0, 1.0),       // quality_score
    (0.0, 1.0),       // crossfader_position
    (0.0, 1.0),       // master_volume
    (0.0, 1.0),       // deck_a_playing
    (0.0, 1.0),       // deck_b_playing
    (0.0, 200.0),     // deck_a_bpm
    (0.0, 200.0),     // deck_b_bpm
];

/// Ce que l'agent voit à un cycle : features assainies + état du mixeur borné.
///
/// # Example
/// ```
/// use am_agent::Observation;
/// use am_core::features::{FeatureVector, MixState};
///
/// let obs = Observation::new(
///     &FeatureVector { rms_db: f32::NAN, ..FeatureVector::default() },
///     &MixState { crossfader_position: 3.0, ..MixState::default() },
/// );
/// assert_eq!(obs.features.rms_db, -80.0);
/// assert_eq!(obs.mix.crossfader_position, 1.0);
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Observation {
    /// Sanitised features.
    pub features: FeatureVector,
    /// Clamped mixer snapshot.
    pub mix: MixState,
}

impl Observation {
    /// Sanitise `features` and clamp `mix`.
    #[must_use]
    pub fn new(features: &FeatureVector, mix: &MixState) -> Self {
        Self {
            features: features.sanitized(),
            mix: mix.clamped(),
        }
    }

    /// Fixed-order numeric view.
    #[must_use]
    pub fn vector(&self) -> StateVector {
        StateVector::new(&self.features, &self.mix)
    }
}

/// Vecteur d'état numérique : 12 champs de features puis 6 champs du mixeur.
///
/// The order is `FEATURE_FIELDS` followed by `MIX_FIELDS`; classifier
/// weights and Q-table keys depend on it.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct StateVector(pub [f32; STATE_DIMS]);

impl StateVector {
    /// Concatenate features and mixer fields.
    #[must_use]
    pub fn new(features: &FeatureVector, mix: &MixState) -> Self {
        let mut values = [0.0; STATE_DIMS];
        let f = features.to_array();
        values[..f.len()].copy_from_slice(&f);
        values[f.len()..].copy_from_slice(&mix.to_array());
        Self(values)
    }

    /// Values as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }
}

/// Clé discrète d'un état pour la Q-table : un indice de bin par dimension.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StateKey(pub Vec<u16>);

/// Maps a [`StateVector`] to a [`StateKey`] with a configurable bin count
/// per dimension. A dimension with one bin is ignored.
///
/// # Example
/// ```
/// use am_agent::{Discretizer, StateVector};
/// use am_core::config::DEFAULT_BINS;
///
/// let d = Discretizer::new(&DEFAULT_BINS);
/// let mut v = [0.0f32; 18];
/// v[1] = -75.0; // rms_db: first of 8 bins
/// v[12] = 0.95; // crossfader: last of 10 bins
/// let key = d.key(&StateVector(v));
/// assert_eq!(key.0[1], 0);
/// assert_eq!(key.0[12], 9);
/// ```
#[derive(Clone, Debug)]
pub struct Discretizer {
    bins: [u16; STATE_DIMS],
}

impl Discretizer {
    /// Use `bins` per dimension. Missing entries and zeros count as one bin.
    #[must_use]
    pub fn new(bins: &[u16]) -> Self {
        let mut out = [1u16; STATE_DIMS];
        for (slot, &b) in out.iter_mut().zip(bins) {
            *slot = b.max(1);
        }
        Self { bins: out }
    }

    /// Bin counts per dimension.
    #[must_use]
    pub fn bins(&self) -> &[u16; STATE_DIMS] {
        &self.bins
    }

    /// Number of distinct keys this discretizer can produce.
    #[must_use]
    pub fn state_space(&self) -> u128 {
        self.bins.iter().map(|&b| u128::from(b)).product()
    }

    /// Bin index of `value` in dimension `dim`.
    #[must_use]
    pub fn bin(&self, dim: usize, value: f32) -> u16 {
        let bins = self.bins[dim];
        if bins <= 1 || !value.is_finite() {
            return 0;
        }
        let (lo, hi) = DIM_RANGES[dim];
        let t = ((value - lo) / (hi - lo)).clamp(0.0, 1.0);
        ((t * f32::from(bins)) as u16).min(bins - 1)
    }

    /// Discretise a full state.
    #[must_use]
    pub fn key(&self, state: &StateVector) -> StateKey {
        StateKey(
            state
                .0
                .iter()
                .enumerate()
                .map(|(dim, &v)| self.bin(dim, v))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use am_core::config::DEFAULT_BINS;

    #[test]
    fn vector_order_is_features_then_mix() {
        let features = FeatureVector {
            rms: 0.25,
            quality_score: 0.9,
            ..FeatureVector::default()
        };
        let mix = MixState {
            crossfader_position: 0.3,
            deck_b_bpm: 128.0,
            ..MixState::default()
        };
        let v = StateVector::new(&features, &mix);
        assert_eq!(v.0[0], 0.25);
        assert_eq!(v.0[11], 0.9);
        assert_eq!(v.0[12], 0.3);
        assert_eq!(v.0[17], 128.0);
    }

    #[test]
    fn bins_are_bounded() {
        let d = Discretizer::new(&DEFAULT_BINS);
        for dim in 0..STATE_DIMS {
            for value in [-1e9, -1.0, 0.0, 0.5, 1.0, 1e9, f32::NAN] {
                assert!(d.bin(dim, value) < d.bins()[dim]);
            }
        }
    }

    #[test]
    fn single_bin_dimensions_are_ignored() {
        let d = Discretizer::new(&DEFAULT_BINS);
        let mut a = [0.0f32; STATE_DIMS];
        let mut b = a;
        a[4] = 200.0;
        b[4] = 7000.0; // centroid: one bin by default
        assert_eq!(d.key(&StateVector(a)), d.key(&StateVector(b)));
        b[2] = 0.95; // energy: ten bins
        assert_ne!(d.key(&StateVector(a)), d.key(&StateVector(b)));
    }

    #[test]
    fn beat_flag_splits_state() {
        let d = Discretizer::new(&DEFAULT_BINS);
        assert_eq!(d.bin(7, 0.0), 0);
        assert_eq!(d.bin(7, 1.0), 1);
        assert_eq!(d.state_space(), 8 * 10 * 2 * 10 * 2 * 2);
    }

    #[test]
    fn short_bin_list_pads_with_ones() {
        let d = Discretizer::new(&[4, 4]);
        assert_eq!(d.bins()[0], 4);
        assert_eq!(d.bins()[2], 1);
    }
}
