use am_core::config::PolicyConfig;
use am_core::features::{ActionCommand, EqBand};
use serde::{Deserialize, Serialize};

/// Archétypes d'action partagés par le classifieur et le Q-learning.
///
/// The discriminant is both the classifier class and the Q-table action index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionArchetype {
    /// Move the crossfader toward deck B.
    CrossfadeToB = 0,
    /// Move the crossfader toward deck A.
    CrossfadeToA = 1,
    /// Raise both deck volumes.
    RaiseVolumes = 2,
    /// Boost the high EQ band.
    Brighten = 3,
    /// Start a transition and fire effect 1.
    TransitionWithEffect = 4,
}

impl ActionArchetype {
    /// Number of archetypes.
    pub const COUNT: usize = 5;

    /// All archetypes in index order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::CrossfadeToB,
        Self::CrossfadeToA,
        Self::RaiseVolumes,
        Self::Brighten,
        Self::TransitionWithEffect,
    ];

    /// Index in [0, COUNT).
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Archetype at `index`, if valid.
    #[must_use]
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Expand to a concrete command.
    ///
    /// # Example
    /// ```
    /// use am_agent::actions::{ActionArchetype, ActionSteps};
    /// let cmd = ActionArchetype::CrossfadeToA.to_command(&ActionSteps::default());
    /// assert_eq!(cmd.crossfade_adjust, -0.1);
    /// ```
    #[must_use]
    pub fn to_command(self, steps: &ActionSteps) -> ActionCommand {
        let mut cmd = ActionCommand::default();
        match self {
            Self::CrossfadeToB => cmd.crossfade_adjust = steps.crossfade,
            Self::CrossfadeToA => cmd.crossfade_adjust = -steps.crossfade,
            Self::RaiseVolumes => {
                cmd.volume_adjust_a = steps.volume;
                cmd.volume_adjust_b = steps.volume;
            }
            Self::Brighten => {
                cmd.eq_adjust.insert(EqBand::High, steps.eq);
            }
            Self::TransitionWithEffect => {
                cmd.effect_trigger = Some(1);
                cmd.transition_now = true;
            }
        }
        cmd.clamped()
    }
}

/// Step sizes used when expanding archetypes and heuristic rules.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ActionSteps {
    /// Crossfader delta.
    pub crossfade: f32,
    /// Deck volume delta.
    pub volume: f32,
    /// EQ delta.
    pub eq: f32,
}

impl Default for ActionSteps {
    fn default() -> Self {
        Self {
            crossfade: 0.1,
            volume: 0.05,
            eq: 0.1,
        }
    }
}

impl From<&PolicyConfig> for ActionSteps {
    fn from(config: &PolicyConfig) -> Self {
        Self {
            crossfade: config.crossfade_step,
            volume: config.volume_step,
            eq: config.eq_step,
        }
    }
}
