use am_core::config::MixConfig;
use am_core::features::{ActionCommand, EqBand};

use super::Policy;
use crate::actions::ActionSteps;
use crate::state::Observation;

/// Above this centroid the mix is too bright (Hz).
const BRIGHT_CENTROID: f32 = 3000.0;
/// Below this centroid the mix is too dark (Hz).
const DARK_CENTROID: f32 = 1000.0;
/// Crossfader below this is parked on deck A.
const PARKED_A: f32 = 0.3;
/// Crossfader above this is parked on deck B.
const PARKED_B: f32 = 0.7;
/// Effect slots drawn on a beat (inclusive).
const EFFECT_SLOTS: std::ops::RangeInclusive<u8> = 1..=3;

/// Table de règles fixe, sans apprentissage.
///
/// - level outside the sweet spot: nudge the volume of the audible deck;
/// - beat with one deck playing and the crossfader parked on it: transition
///   with `transition_probability`;
/// - centroid too bright or too dark: cut or boost the highs;
/// - beat: fire a random effect with `effect_probability`.
///
/// Both draws come from a seeded generator.
pub struct HeuristicPolicy {
    sweet_spot: (f32, f32),
    effect_probability: f64,
    transition_probability: f64,
    steps: ActionSteps,
    rng: fastrand::Rng,
}

impl HeuristicPolicy {
    /// Build the rule table from configuration.
    #[must_use]
    pub fn new(config: &MixConfig) -> Self {
        Self {
            sweet_spot: (config.quality.sweet_spot_low, config.quality.sweet_spot_high),
            effect_probability: config.policy.effect_probability,
            transition_probability: config.policy.transition_probability,
            steps: ActionSteps::from(&config.policy),
            rng: fastrand::Rng::with_seed(config.policy.seed),
        }
    }
}

impl Policy for HeuristicPolicy {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    fn decide(&mut self, observation: &Observation) -> ActionCommand {
        let f = &observation.features;
        let m = &observation.mix;
        let mut cmd = ActionCommand::default();

        let correction = if f.rms_db < self.sweet_spot.0 {
            self.steps.volume
        } else if f.rms_db > self.sweet_spot.1 {
            -self.steps.volume
        } else {
            0.0
        };
        if m.crossfader_position < 0.5 {
            cmd.volume_adjust_a = correction;
        } else {
            cmd.volume_adjust_b = correction;
        }

        // Two draws per cycle, beat or not.
        let transition_roll = self.rng.f64();
        let effect_roll = self.rng.f64();

        if f.beat_detected {
            let parked_on_a =
                m.deck_a_playing && !m.deck_b_playing && m.crossfader_position < PARKED_A;
            let parked_on_b =
                m.deck_b_playing && !m.deck_a_playing && m.crossfader_position > PARKED_B;
            cmd.transition_now =
                (parked_on_a || parked_on_b) && transition_roll < self.transition_probability;
        }

        if f.spectral_centroid > BRIGHT_CENTROID {
            cmd.eq_adjust.insert(EqBand::High, -self.steps.eq);
        } else if f.spectral_centroid < DARK_CENTROID {
            cmd.eq_adjust.insert(EqBand::High, self.steps.eq);
        }

        if f.beat_detected && effect_roll < self.effect_probability {
            cmd.effect_trigger = Some(self.rng.u8(EFFECT_SLOTS));
        }

        cmd.clamped()
    }
}
