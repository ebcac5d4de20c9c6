use std::collections::VecDeque;

use am_core::config::BeatConfig;

/// État du détecteur après le dernier cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BeatState {
    /// No beat on the last observation.
    #[default]
    Idle,
    /// A beat fired on the last observation.
    Triggered,
}

/// Energy-threshold beat detection with a rolling tempo estimate.
///
/// A beat fires when the window energy exceeds `energy_ratio` times a
/// rolling baseline and at least `min_beat_interval` has passed since the
/// previous beat. The first observation only seeds the baseline.
///
/// # Example
/// ```
/// use am_audio::beat::BeatTracker;
/// use am_core::config::BeatConfig;
///
/// let mut tracker = BeatTracker::new(&BeatConfig::default());
/// assert!(!tracker.process(0.01, 0.0));
/// assert!(tracker.process(0.1, 0.5));
/// assert_eq!(tracker.bpm(), 0.0); // one beat: tempo unknown
/// ```
pub struct BeatTracker {
    /// Rolling energy average. `None` until the first observation.
    baseline: Option<f32>,
    last_beat: Option<f64>,
    /// Beat timestamps, oldest first.
    history: VecDeque<f64>,
    bpm: f32,
    state: BeatState,
    beat_count: u64,

    energy_ratio: f32,
    baseline_decay: f32,
    min_interval: f64,
    history_len: usize,
    min_energy: f32,
}

impl BeatTracker {
    /// Create a tracker with the given thresholds.
    #[must_use]
    pub fn new(config: &BeatConfig) -> Self {
        let history_len = config.history_len.max(2);
        Self {
            baseline: None,
            last_beat: None,
            history: VecDeque::with_capacity(history_len),
            bpm: 0.0,
            state: BeatState::Idle,
            beat_count: 0,
            energy_ratio: config.energy_ratio,
            baseline_decay: config.baseline_decay,
            min_interval: config.min_beat_interval,
            history_len,
            min_energy: config.min_energy,
        }
    }

    /// Feed one energy observation taken at `timestamp` seconds.
    ///
    /// Returns `true` if a beat fired. Non-finite energies are ignored.
    pub fn process(&mut self, energy: f32, timestamp: f64) -> bool {
        self.state = BeatState::Idle;
        if !energy.is_finite() || !timestamp.is_finite() {
            return false;
        }

        let Some(baseline) = self.baseline else {
            self.baseline = Some(energy);
            return false;
        };

        let spaced = self
            .last_beat
            .is_none_or(|last| timestamp - last >= self.min_interval);
        let beat = energy > self.min_energy && energy > baseline * self.energy_ratio && spaced;

        self.baseline =
            Some(baseline * self.baseline_decay + energy * (1.0 - self.baseline_decay));

        if beat {
            self.last_beat = Some(timestamp);
            self.history.push_back(timestamp);
            if self.history.len() > self.history_len {
                self.history.pop_front();
            }
            self.beat_count += 1;
            self.state = BeatState::Triggered;
            self.bpm = self.estimate_bpm();
        }
        beat
    }

    /// 60 / median inter-beat interval. 0.0 with fewer than two beats.
    fn estimate_bpm(&self) -> f32 {
        if self.history.len() < 2 {
            return 0.0;
        }
        let mut intervals: Vec<f64> = self
            .history
            .iter()
            .zip(self.history.iter().skip(1))
            .map(|(a, b)| b - a)
            .filter(|d| *d > 0.0)
            .collect();
        if intervals.is_empty() {
            return 0.0;
        }
        intervals.sort_by(f64::total_cmp);
        let mid = intervals.len() / 2;
        let median = if intervals.len() % 2 == 0 {
            (intervals[mid - 1] + intervals[mid]) * 0.5
        } else {
            intervals[mid]
        };
        (60.0 / median) as f32
    }

    /// Current tempo estimate (0.0 when unknown).
    #[must_use]
    pub fn bpm(&self) -> f32 {
        self.bpm
    }

    /// State after the last observation.
    #[must_use]
    pub fn state(&self) -> BeatState {
        self.state
    }

    /// Beats detected since creation or the last reset.
    #[must_use]
    pub fn beat_count(&self) -> u64 {
        self.beat_count
    }

    /// Forget baseline, history and tempo.
    pub fn reset(&mut self) {
        self.baseline = None;
        self.last_beat = None;
        self.history.clear();
        self.bpm = 0.0;
        self.state = BeatState::Idle;
        self.beat_count = 0;
    }
}

impl Default for BeatTracker {
    fn default() -> Self {
        Self::new(&BeatConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Quiet floor with a loud pulse every `period` steps of 10 ms.
    fn pulse_train(period: u32, steps: u32) -> impl Iterator<Item = (f32, f64)> {
        (0..steps).map(move |i| {
            let energy = if i % period == 0 { 0.2 } else { 0.01 };
            (energy, f64::from(i) * 0.01)
        })
    }

    #[test]
    fn first_observation_never_fires() {
        let mut tracker = BeatTracker::default();
        assert!(!tracker.process(10.0, 0.0));
        assert_eq!(tracker.state(), BeatState::Idle);
        assert_eq!(tracker.beat_count(), 0);
    }

    #[test]
    fn silence_never_fires() {
        let mut tracker = BeatTracker::default();
        for i in 0..100 {
            assert!(!tracker.process(0.0, f64::from(i) * 0.1));
        }
        assert_eq!(tracker.bpm(), 0.0);
    }

    #[test]
    fn beats_respect_minimum_interval() {
        let mut tracker = BeatTracker::default();
        let mut last: Option<f64> = None;
        // Loud every 50 ms: far denser than the refractory period.
        for i in 0..200 {
            let t = f64::from(i) * 0.05;
            let energy = if i % 2 == 0 { 0.5 } else { 0.001 };
            if tracker.process(energy, t) {
                if let Some(prev) = last {
                    assert!(t - prev >= 0.3 - 1e-9, "beats {prev} and {t} too close");
                }
                last = Some(t);
            }
        }
        assert!(tracker.beat_count() > 0);
    }

    #[test]
    fn steady_pulse_gives_expected_tempo() {
        let mut tracker = BeatTracker::default();
        for (energy, t) in pulse_train(50, 1000) {
            tracker.process(energy, t);
        }
        assert!((tracker.bpm() - 120.0).abs() < 2.0, "bpm {}", tracker.bpm());
    }

    #[test]
    fn bpm_uses_median_interval() {
        let mut tracker = BeatTracker::default();
        tracker.process(0.01, 0.0);
        // Intervals 0.5, 0.5, 2.0: median 0.5 → 120 BPM.
        for t in [1.0, 1.5, 2.0, 4.0] {
            tracker.process(0.01, t - 0.1);
            assert!(tracker.process(1.0, t));
        }
        assert!((tracker.bpm() - 120.0).abs() < 1e-3);
    }

    #[test]
    fn state_reflects_last_cycle_only() {
        let mut tracker = BeatTracker::default();
        tracker.process(0.01, 0.0);
        assert!(tracker.process(1.0, 1.0));
        assert_eq!(tracker.state(), BeatState::Triggered);
        tracker.process(0.01, 1.1);
        assert_eq!(tracker.state(), BeatState::Idle);
    }

    #[test]
    fn reset_forgets_everything() {
        let mut tracker = BeatTracker::default();
        tracker.process(0.01, 0.0);
        tracker.process(1.0, 1.0);
        tracker.reset();
        assert_eq!(tracker.beat_count(), 0);
        assert!(!tracker.process(1.0, 2.0));
    }
}
