use std::collections::VecDeque;
use std::path::Path;

use am_core::config::{MixConfig, StrategyKind};
use am_core::features::{ActionCommand, FeatureVector, MixState};

use crate::actions::ActionArchetype;
use crate::error::AgentError;
use crate::policy::{ClassifierPolicy, HeuristicPolicy, Policy, QLearningPolicy};
use crate::state::{Observation, StateVector};

/// Rewards kept for statistics.
const REWARD_HISTORY: usize = 100;
/// Window of the reward trend.
const TREND_WINDOW: usize = 10;

/// Instantané de l'état d'apprentissage de l'agent.
#[derive(Clone, Debug, PartialEq)]
pub struct AgentStatistics {
    /// Active strategy name.
    pub strategy: &'static str,
    /// Experiences held by the strategy.
    pub experience_count: usize,
    /// Current exploration probability (0 outside Q-learning).
    pub exploration_rate: f64,
    /// Learned states (0 outside Q-learning).
    pub q_table_size: usize,
    /// Mean of the recorded rewards.
    pub avg_reward: f64,
    /// Sum of the recorded rewards.
    pub total_reward: f64,
    /// Mean of the last ten rewards, once ten are recorded.
    pub reward_trend: f64,
}

/// Agent de décision : une stratégie + assainissement des entrées + statistiques.
///
/// Every input crosses [`Observation::new`] before reaching the strategy, so
/// NaN features and out-of-range mixer values never reach a policy.
pub struct PolicyAgent {
    policy: Box<dyn Policy>,
    rewards: VecDeque<f64>,
}

impl PolicyAgent {
    /// Build the strategy named by `config.policy.strategy`, loading any
    /// learning state found under `config.policy.model_dir`.
    ///
    /// # Errors
    /// An unknown strategy name is fatal.
    ///
    /// # Example
    /// ```
    /// use am_agent::PolicyAgent;
    /// use am_core::MixConfig;
    /// let mut config = MixConfig::default();
    /// config.policy.strategy = "telepathy".into();
    /// assert!(PolicyAgent::new(&config).is_err());
    /// ```
    pub fn new(config: &MixConfig) -> Result<Self, AgentError> {
        let dir = Path::new(&config.policy.model_dir);
        let policy: Box<dyn Policy> = match config.policy.strategy_kind()? {
            StrategyKind::Heuristic => Box::new(HeuristicPolicy::new(config)),
            StrategyKind::Classifier => Box::new(ClassifierPolicy::load(config, dir)),
            StrategyKind::Reinforcement => Box::new(QLearningPolicy::load(config, dir)),
        };
        log::info!("Agent prêt : stratégie {}", policy.name());
        Ok(Self::with_policy(policy))
    }

    /// Wrap an already-built strategy.
    #[must_use]
    pub fn with_policy(policy: Box<dyn Policy>) -> Self {
        Self {
            policy,
            rewards: VecDeque::with_capacity(REWARD_HISTORY),
        }
    }

    /// Active strategy name.
    #[must_use]
    pub fn strategy(&self) -> &'static str {
        self.policy.name()
    }

    /// Choose this cycle's command.
    pub fn decide(&mut self, features: &FeatureVector, mix: &MixState) -> ActionCommand {
        let observation = Observation::new(features, mix);
        self.policy.decide(&observation).clamped()
    }

    /// Credit `reward` to the last decision; `features`/`mix` describe the
    /// state it led to.
    pub fn learn_from_reward(&mut self, reward: f64, features: &FeatureVector, mix: &MixState) {
        if self.rewards.len() == REWARD_HISTORY {
            self.rewards.pop_front();
        }
        self.rewards.push_back(reward);
        self.policy
            .learn_from_reward(reward, &Observation::new(features, mix));
    }

    /// Fit the strategy on labelled states.
    ///
    /// # Errors
    /// See [`Policy::train`].
    pub fn train(&mut self, samples: &[(StateVector, ActionArchetype)]) -> Result<(), AgentError> {
        self.policy.train(samples)
    }

    /// Write learning state under `dir`.
    ///
    /// # Errors
    /// Write failures are returned; in-memory state is unaffected.
    pub fn persist(&self, dir: &Path) -> Result<(), AgentError> {
        self.policy.persist(dir)
    }

    /// Clear reward history, pending transitions and experiences. Learned
    /// values are kept.
    pub fn reset(&mut self) {
        self.rewards.clear();
        self.policy.reset();
    }

    /// Current learning statistics.
    #[must_use]
    pub fn statistics(&self) -> AgentStatistics {
        let total_reward: f64 = self.rewards.iter().sum();
        let avg_reward = if self.rewards.is_empty() {
            0.0
        } else {
            total_reward / self.rewards.len() as f64
        };
        let reward_trend = if self.rewards.len() >= TREND_WINDOW {
            self.rewards.iter().rev().take(TREND_WINDOW).sum::<f64>() / TREND_WINDOW as f64
        } else {
            0.0
        };
        AgentStatistics {
            strategy: self.policy.name(),
            experience_count: self.policy.experience_count(),
            exploration_rate: self.policy.exploration_rate(),
            q_table_size: self.policy.q_table_size(),
            avg_reward,
            total_reward,
            reward_trend,
        }
    }
}
