use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use am_core::config::MixConfig;
use am_core::features::{ActionCommand, FeatureVector, MixState};
use am_core::traits::{CommandSink, FeatureSource, MixStateProvider};

use crate::agent::PolicyAgent;
use crate::error::AgentError;
use crate::reward::{RewardBreakdown, RewardEngine};

/// Longest uninterrupted sleep, so a stop request is seen quickly.
const STOP_POLL: Duration = Duration::from_millis(50);

/// Résultat d'un cycle de décision.
#[derive(Clone, Debug)]
pub struct StepReport {
    /// Command handed to the sink.
    pub command: ActionCommand,
    /// Reward credited to the previous decision (none on the first cycle).
    pub reward: Option<RewardBreakdown>,
    /// The sink accepted the command.
    pub delivered: bool,
}

/// Boucle de décision : features + état du mixeur → récompense → apprentissage
/// → décision → sink.
///
/// Runs on its own cadence; reading features never waits on the audio side.
pub struct AutomationLoop<F, M, S> {
    agent: PolicyAgent,
    rewards: RewardEngine,
    source: F,
    mixer: M,
    sink: S,
    previous: Option<(FeatureVector, MixState)>,
    interval: Duration,
    steps: u64,
}

impl<F, M, S> AutomationLoop<F, M, S>
where
    F: FeatureSource,
    M: MixStateProvider,
    S: CommandSink,
{
    /// Assemble a loop around an existing agent.
    pub fn new(
        agent: PolicyAgent,
        rewards: RewardEngine,
        source: F,
        mixer: M,
        sink: S,
        interval: Duration,
    ) -> Self {
        Self {
            agent,
            rewards,
            source,
            mixer,
            sink,
            previous: None,
            interval,
            steps: 0,
        }
    }

    /// Build the agent and reward engine from `config`.
    ///
    /// # Errors
    /// Fails on an unknown strategy name.
    pub fn from_config(
        config: &MixConfig,
        source: F,
        mixer: M,
        sink: S,
    ) -> Result<Self, AgentError> {
        Ok(Self::new(
            PolicyAgent::new(config)?,
            RewardEngine::new(&config.reward),
            source,
            mixer,
            sink,
            Duration::from_millis(config.policy.decision_interval_ms),
        ))
    }

    /// One decision cycle.
    pub fn step(&mut self) -> StepReport {
        let features = self.source.latest().sanitized();
        let mix = self.mixer.snapshot().clamped();

        let reward = if let Some((prev_features, prev_mix)) = &self.previous {
            let b = self
                .rewards
                .evaluate(&features, Some(prev_features), &mix, Some(prev_mix));
            log::debug!(
                "Récompense {:+.3} (niveau {:.2}, tempo {:.2}, énergie {:.2}, transition {:.2}, spectre {:.2}, pénalités {:.2}/{:.2})",
                b.total,
                b.level,
                b.tempo_match,
                b.energy_flow,
                b.transition,
                b.spectral_balance,
                b.clipping_penalty,
                b.silence_penalty
            );
            self.agent.learn_from_reward(b.total, &features, &mix);
            Some(b)
        } else {
            None
        };

        let command = self.agent.decide(&features, &mix);
        let delivered = match self.sink.execute(&command) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Commande non transmise : {e}");
                false
            }
        };

        self.previous = Some((features, mix));
        self.steps += 1;
        StepReport {
            command,
            reward,
            delivered,
        }
    }

    /// Repeat [`step`](Self::step) every interval until `stop` is set.
    /// Returns the number of cycles run by this call.
    pub fn run(&mut self, stop: &AtomicBool) -> u64 {
        log::info!(
            "Boucle de décision démarrée ({} ms, stratégie {})",
            self.interval.as_millis(),
            self.agent.strategy()
        );
        let first = self.steps;
        while !stop.load(Ordering::Acquire) {
            let cycle = Instant::now();
            self.step();
            while !stop.load(Ordering::Acquire) {
                let rest = self.interval.saturating_sub(cycle.elapsed());
                if rest.is_zero() {
                    break;
                }
                thread::sleep(rest.min(STOP_POLL));
            }
        }
        let ran = self.steps - first;
        log::info!("Boucle de décision arrêtée après {ran} cycles");
        ran
    }

    /// Cycles run since construction.
    #[must_use]
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Features seen by the last cycle.
    #[must_use]
    pub fn last_features(&self) -> Option<FeatureVector> {
        self.previous.map(|(f, _)| f)
    }

    /// The wrapped agent.
    #[must_use]
    pub fn agent(&self) -> &PolicyAgent {
        &self.agent
    }

    /// Mutable access, e.g. to train or reset between sessions.
    pub fn agent_mut(&mut self) -> &mut PolicyAgent {
        &mut self.agent
    }

    /// The command sink.
    #[must_use]
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Forget the previous observation; the next cycle is unrewarded.
    pub fn reset(&mut self) {
        self.previous = None;
        self.rewards.reset();
        self.agent.reset();
    }

    /// Give back the agent, e.g. to persist it.
    pub fn into_agent(self) -> PolicyAgent {
        self.agent
    }
}
