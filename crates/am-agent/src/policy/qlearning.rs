use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};

use am_core::config::MixConfig;
use am_core::features::ActionCommand;
use serde::{Deserialize, Serialize};

use super::Policy;
use crate::actions::{ActionArchetype, ActionSteps};
use crate::error::AgentError;
use crate::persist::{self, Q_TABLE_FILE};
use crate::state::{Discretizer, Observation, StateKey};

const ACTIONS: usize = ActionArchetype::COUNT;

/// Valeurs apprises par état discret et par action.
///
/// Absent states read as all zeros. Ordered so artifacts are byte-stable.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QTable {
    values: BTreeMap<StateKey, [f64; ACTIONS]>,
}

impl QTable {
    /// Values of every action in `state`.
    #[must_use]
    pub fn get(&self, state: &StateKey) -> [f64; ACTIONS] {
        self.values.get(state).copied().unwrap_or([0.0; ACTIONS])
    }

    /// Action with the highest value; ties go to the lowest index.
    ///
    /// # Example
    /// ```
    /// use am_agent::policy::QTable;
    /// use am_agent::StateKey;
    /// let table = QTable::default();
    /// assert_eq!(table.best_action(&StateKey(vec![0; 18])), 0);
    /// ```
    #[must_use]
    pub fn best_action(&self, state: &StateKey) -> usize {
        let values = self.get(state);
        let mut best = 0;
        for (i, v) in values.iter().enumerate().skip(1) {
            if *v > values[best] {
                best = i;
            }
        }
        best
    }

    /// Highest value in `state`.
    #[must_use]
    pub fn max_value(&self, state: &StateKey) -> f64 {
        self.get(state)
            .into_iter()
            .fold(f64::NEG_INFINITY, f64::max)
    }

    /// `Q(s,a) ← Q(s,a) + α·(r + γ·max_a' Q(s',a') − Q(s,a))`. Returns the new value.
    pub fn update(
        &mut self,
        state: &StateKey,
        action: usize,
        reward: f64,
        next: &StateKey,
        alpha: f64,
        gamma: f64,
    ) -> f64 {
        let future = self.max_value(next);
        let row = self
            .values
            .entry(state.clone())
            .or_insert([0.0; ACTIONS]);
        let Some(q) = row.get_mut(action) else {
            return 0.0;
        };
        *q += alpha * (reward + gamma * future - *q);
        *q
    }

    /// Learned states.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// `true` before any update.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Transition observée, rejouable.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Experience {
    /// State the decision was taken in.
    pub state: StateKey,
    /// Action index taken.
    pub action: usize,
    /// Reward credited.
    pub reward: f64,
    /// State the action led to.
    pub next_state: StateKey,
}

/// Persisted learning state.
#[derive(Serialize, Deserialize)]
struct QArtifact {
    table: QTable,
    epsilon: f64,
}

/// Q-learning tabulaire, exploration epsilon-greedy.
///
/// Owns its table, exploration rate and experience set; nothing is global.
pub struct QLearningPolicy {
    table: QTable,
    discretizer: Discretizer,
    epsilon: f64,
    epsilon_floor: f64,
    epsilon_decay: f64,
    alpha: f64,
    gamma: f64,
    replay: VecDeque<Experience>,
    capacity: usize,
    /// Decision awaiting its reward.
    pending: Option<(StateKey, usize)>,
    steps: ActionSteps,
    rng: fastrand::Rng,
}

impl QLearningPolicy {
    /// Empty table, exploration at `epsilon_start`.
    #[must_use]
    pub fn new(config: &MixConfig) -> Self {
        Self::from_parts(config, QTable::default(), config.policy.epsilon_start)
    }

    /// Resume from a table and exploration rate.
    #[must_use]
    pub fn from_parts(config: &MixConfig, table: QTable, epsilon: f64) -> Self {
        let p = &config.policy;
        let capacity = p.replay_capacity.max(1);
        Self {
            table,
            discretizer: Discretizer::new(&p.bins),
            epsilon: epsilon.clamp(p.epsilon_floor, 1.0),
            epsilon_floor: p.epsilon_floor,
            epsilon_decay: p.epsilon_decay,
            alpha: p.learning_rate,
            gamma: p.discount,
            replay: VecDeque::with_capacity(capacity.min(4096)),
            capacity,
            pending: None,
            steps: ActionSteps::from(p),
            rng: fastrand::Rng::with_seed(p.seed),
        }
    }

    /// Load `q_table.bin` from `dir`; a missing or corrupt file gives an empty table.
    #[must_use]
    pub fn load(config: &MixConfig, dir: &Path) -> Self {
        let path = Self::artifact(dir);
        match persist::load::<QArtifact>(&path) {
            Ok(a) => {
                log::info!("Q-table chargée : {} états", a.table.len());
                Self::from_parts(config, a.table, a.epsilon)
            }
            Err(AgentError::Io { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {
                log::info!("Aucune Q-table dans {} : table vide", dir.display());
                Self::new(config)
            }
            Err(e) => {
                log::warn!("{e} : table vide");
                Self::new(config)
            }
        }
    }

    fn artifact(dir: &Path) -> PathBuf {
        dir.join(Q_TABLE_FILE)
    }

    /// Learned values.
    #[must_use]
    pub fn table(&self) -> &QTable {
        &self.table
    }

    /// Stored experiences, oldest first.
    #[must_use]
    pub fn experiences(&self) -> &VecDeque<Experience> {
        &self.replay
    }

    /// Append an experience, evicting the oldest at capacity.
    pub fn remember(&mut self, experience: Experience) {
        if self.replay.len() == self.capacity {
            self.replay.pop_front();
        }
        self.replay.push_back(experience);
    }

    /// Re-apply the TD update to up to `batch` stored experiences drawn with
    /// the seeded generator. Returns how many were replayed.
    pub fn replay(&mut self, batch: usize) -> usize {
        let n = batch.min(self.replay.len());
        for _ in 0..n {
            let i = self.rng.usize(..self.replay.len());
            let Some(e) = self.replay.get(i).cloned() else {
                continue;
            };
            self.table
                .update(&e.state, e.action, e.reward, &e.next_state, self.alpha, self.gamma);
        }
        n
    }
}

impl Policy for QLearningPolicy {
    fn name(&self) -> &'static str {
        "reinforcement"
    }

    fn decide(&mut self, observation: &Observation) -> ActionCommand {
        let key = self.discretizer.key(&observation.vector());
        let roll = self.rng.f64();
        let action = if roll < self.epsilon {
            self.rng.usize(..ACTIONS)
        } else {
            self.table.best_action(&key)
        };
        self.epsilon = (self.epsilon * self.epsilon_decay).max(self.epsilon_floor);
        self.pending = Some((key, action));

        ActionArchetype::from_index(action)
            .map(|a| a.to_command(&self.steps))
            .unwrap_or_default()
    }

    fn learn_from_reward(&mut self, reward: f64, next: &Observation) {
        let Some((state, action)) = self.pending.take() else {
            return;
        };
        if !reward.is_finite() {
            log::warn!("Récompense non finie ignorée");
            return;
        }
        let next_state = self.discretizer.key(&next.vector());
        let q = self
            .table
            .update(&state, action, reward, &next_state, self.alpha, self.gamma);
        log::trace!("Q[{action}] ← {q:.4}");
        self.remember(Experience {
            state,
            action,
            reward,
            next_state,
        });
    }

    fn persist(&self, dir: &Path) -> Result<(), AgentError> {
        let path = Self::artifact(dir);
        persist::save_atomic(
            &path,
            &QArtifact {
                table: self.table.clone(),
                epsilon: self.epsilon,
            },
        )?;
        log::info!("Q-table sauvegardée : {} états → {}", self.table.len(), path.display());
        Ok(())
    }

    fn reset(&mut self) {
        self.pending = None;
        self.replay.clear();
    }

    fn experience_count(&self) -> usize {
        self.replay.len()
    }

    fn exploration_rate(&self) -> f64 {
        self.epsilon
    }

    fn q_table_size(&self) -> usize {
        self.table.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use am_core::features::{FeatureVector, MixState};

    fn obs(energy: f32, crossfader: f32) -> Observation {
        Observation::new(
            &FeatureVector {
                energy,
                rms_db: -16.0,
                ..FeatureVector::default()
            },
            &MixState {
                crossfader_position: crossfader,
                ..MixState::default()
            },
        )
    }

    fn key(n: u16) -> StateKey {
        StateKey(vec![n; 18])
    }

    #[test]
    fn ties_break_to_first_action() {
        let mut table = QTable::default();
        table.update(&key(0), 3, 1.0, &key(1), 1.0, 0.0);
        table.update(&key(0), 1, 1.0, &key(1), 1.0, 0.0);
        assert_eq!(table.best_action(&key(0)), 1);
    }

    #[test]
    fn td_update_matches_formula() {
        let mut table = QTable::default();
        table.update(&key(1), 2, 2.0, &key(9), 1.0, 0.0); // Q(s',2) = 2
        let q = table.update(&key(0), 0, 1.0, &key(1), 0.1, 0.95);
        assert!((q - 0.1 * (1.0 + 0.95 * 2.0)).abs() < 1e-12);
    }

    #[test]
    fn zero_learning_rate_is_idempotent() {
        let mut table = QTable::default();
        table.update(&key(0), 4, 0.75, &key(2), 1.0, 0.0);
        let before = table.get(&key(0));
        for _ in 0..10 {
            table.update(&key(0), 4, 0.0, &key(0), 0.0, 0.95);
        }
        let after = table.get(&key(0));
        for (a, b) in before.iter().zip(&after) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }

    #[test]
    fn epsilon_decays_to_floor() {
        let mut config = MixConfig::default();
        config.policy.epsilon_start = 0.5;
        config.policy.epsilon_decay = 0.5;
        config.policy.epsilon_floor = 0.1;
        let mut policy = QLearningPolicy::new(&config);
        let mut prev = policy.exploration_rate();
        for _ in 0..10 {
            policy.decide(&obs(0.2, 0.5));
            assert!(policy.exploration_rate() <= prev);
            prev = policy.exploration_rate();
        }
        assert_eq!(policy.exploration_rate(), 0.1);
    }

    #[test]
    fn greedy_policy_follows_table() {
        let mut config = MixConfig::default();
        config.policy.epsilon_start = 0.0;
        config.policy.epsilon_floor = 0.0;
        let mut policy = QLearningPolicy::new(&config);
        let state = obs(0.2, 0.5);
        let k = policy.discretizer.key(&state.vector());
        policy.table.update(&k, 2, 5.0, &k, 1.0, 0.0);
        let cmd = policy.decide(&state);
        assert!(cmd.volume_adjust_a > 0.0 && cmd.volume_adjust_b > 0.0);
    }

    #[test]
    fn learning_needs_a_pending_decision() {
        let mut policy = QLearningPolicy::new(&MixConfig::default());
        policy.learn_from_reward(1.0, &obs(0.1, 0.5));
        assert!(policy.table().is_empty());
        policy.decide(&obs(0.1, 0.5));
        policy.learn_from_reward(1.0, &obs(0.3, 0.6));
        assert_eq!(policy.q_table_size(), 1);
        assert_eq!(policy.experience_count(), 1);
        // Consumed: a second reward is not credited twice.
        policy.learn_from_reward(1.0, &obs(0.3, 0.6));
        assert_eq!(policy.experience_count(), 1);
    }

    #[test]
    fn experience_set_is_fifo() {
        let mut config = MixConfig::default();
        config.policy.replay_capacity = 3;
        let mut policy = QLearningPolicy::new(&config);
        for i in 0..5u16 {
            policy.remember(Experience {
                state: key(i),
                action: 0,
                reward: f64::from(i),
                next_state: key(i + 1),
            });
        }
        let rewards: Vec<f64> = policy.experiences().iter().map(|e| e.reward).collect();
        assert_eq!(rewards, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn replay_applies_updates() {
        let mut policy = QLearningPolicy::new(&MixConfig::default());
        policy.remember(Experience {
            state: key(0),
            action: 1,
            reward: 1.0,
            next_state: key(1),
        });
        assert_eq!(policy.replay(8), 1);
        assert!(policy.table().get(&key(0))[1] > 0.0);
        assert_eq!(QLearningPolicy::new(&MixConfig::default()).replay(8), 0);
    }

    #[test]
    fn reset_keeps_learned_values() {
        let mut policy = QLearningPolicy::new(&MixConfig::default());
        policy.decide(&obs(0.1, 0.5));
        policy.learn_from_reward(1.0, &obs(0.2, 0.5));
        policy.reset();
        assert_eq!(policy.experience_count(), 0);
        assert_eq!(policy.q_table_size(), 1);
    }

    #[test]
    fn save_load_reproduces_decisions() {
        let dir = tempfile::tempdir().unwrap();
        let config = MixConfig::default();
        let mut trained = QLearningPolicy::new(&config);
        for i in 0..200 {
            let o = obs((i % 10) as f32 / 10.0, (i % 7) as f32 / 7.0);
            trained.decide(&o);
            trained.learn_from_reward(f64::from(i % 3) - 1.0, &o);
        }
        trained.persist(dir.path()).unwrap();

        let mut loaded = QLearningPolicy::load(&config, dir.path());
        let mut resumed = QLearningPolicy::from_parts(
            &config,
            trained.table().clone(),
            trained.exploration_rate(),
        );
        assert_eq!(loaded.table(), trained.table());
        assert_eq!(
            loaded.exploration_rate().to_bits(),
            trained.exploration_rate().to_bits()
        );
        for i in 0..100 {
            let o = obs((i % 9) as f32 / 9.0, (i % 5) as f32 / 5.0);
            assert_eq!(loaded.decide(&o), resumed.decide(&o));
        }
    }

    #[test]
    fn corrupt_table_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(Q_TABLE_FILE), [1, 2, 3]).unwrap();
        let policy = QLearningPolicy::load(&MixConfig::default(), dir.path());
        assert!(policy.table().is_empty());
        assert_eq!(policy.exploration_rate(), MixConfig::default().policy.epsilon_start);
    }
}
