// Mixing-decision agent for automix: policies, reward shaping, automation loop.

pub mod actions;
pub mod agent;
pub mod automation;
pub mod error;
pub mod persist;
pub mod policy;
pub mod reward;
pub mod sink;
pub mod state;

pub use actions::ActionArchetype;
pub use agent::{AgentStatistics, PolicyAgent};
pub use automation::{AutomationLoop, StepReport};
pub use error::AgentError;
pub use reward::{RewardBreakdown, RewardEngine};
pub use sink::{ChannelSink, SimulatedMixer};
pub use state::{Discretizer, Observation, StateKey, StateVector};
