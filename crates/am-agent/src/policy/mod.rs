//! Stratégies de décision interchangeables.

pub mod classifier;
pub mod heuristic;
pub mod qlearning;

use std::path::Path;

use am_core::features::ActionCommand;

use crate::actions::ActionArchetype;
use crate::error::AgentError;
use crate::state::{Observation, StateVector};

pub use classifier::{ClassifierModel, ClassifierPolicy};
pub use heuristic::HeuristicPolicy;
pub use qlearning::{Experience, QLearningPolicy, QTable};

/// Contrat commun des stratégies de décision.
///
/// Each strategy maps an [`Observation`] to an [`ActionCommand`], may learn
/// from the reward of its previous decision, and may persist its learning
/// state. Strategies without learning state keep the default no-ops.
///
/// # Example
/// ```
/// use am_agent::Observation;
/// use am_agent::policy::Policy;
/// use am_core::features::ActionCommand;
///
/// struct Idle;
/// impl Policy for Idle {
///     fn name(&self) -> &'static str { "idle" }
///     fn decide(&mut self, _obs: &Observation) -> ActionCommand { ActionCommand::default() }
/// }
/// ```
pub trait Policy: Send {
    /// Strategy name for logs and statistics.
    fn name(&self) -> &'static str;

    /// Choose the command for this cycle. Inputs are already sanitised.
    fn decide(&mut self, observation: &Observation) -> ActionCommand;

    /// Credit `reward` to the last decision, `next` being the state it led to.
    fn learn_from_reward(&mut self, _reward: f64, _next: &Observation) {}

    /// Write learning state under `dir`.
    ///
    /// # Errors
    /// Returns an error if the artifact cannot be written; the previous
    /// artifact stays intact.
    fn persist(&self, _dir: &Path) -> Result<(), AgentError> {
        Ok(())
    }

    /// Fit on labelled states.
    ///
    /// # Errors
    /// [`AgentError::NotTrainable`] for strategies without a model, or
    /// [`AgentError::InsufficientData`] when there are too few samples.
    fn train(&mut self, _samples: &[(StateVector, ActionArchetype)]) -> Result<(), AgentError> {
        Err(AgentError::NotTrainable {
            strategy: self.name(),
        })
    }

    /// Forget pending transitions and experiences. Learned values are kept.
    fn reset(&mut self) {}

    /// Experiences currently held.
    fn experience_count(&self) -> usize {
        0
    }

    /// Current exploration probability.
    fn exploration_rate(&self) -> f64 {
        0.0
    }

    /// Number of learned states.
    fn q_table_size(&self) -> usize {
        0
    }
}
