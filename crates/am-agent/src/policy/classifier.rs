use std::path::{Path, PathBuf};

use am_core::config::{MixConfig, STATE_DIMS};
use am_core::features::ActionCommand;
use serde::{Deserialize, Serialize};

use super::Policy;
use super::heuristic::HeuristicPolicy;
use crate::actions::{ActionArchetype, ActionSteps};
use crate::error::AgentError;
use crate::persist::{self, CLASSIFIER_FILE};
use crate::state::{Observation, StateVector};

const CLASSES: usize = ActionArchetype::COUNT;
/// L2 penalty on the weights.
const WEIGHT_DECAY: f64 = 1e-4;

/// Centrage-réduction par dimension, ajusté sur le jeu d'entraînement.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: [f64; STATE_DIMS],
    scale: [f64; STATE_DIMS],
}

impl StandardScaler {
    /// Fit mean and standard deviation. Constant dimensions keep scale 1.
    #[must_use]
    pub fn fit(samples: &[StateVector]) -> Self {
        let n = samples.len().max(1) as f64;
        let mut mean = [0.0; STATE_DIMS];
        for s in samples {
            for (m, &v) in mean.iter_mut().zip(s.as_slice()) {
                *m += f64::from(v) / n;
            }
        }
        let mut scale = [0.0; STATE_DIMS];
        for s in samples {
            for ((acc, &v), m) in scale.iter_mut().zip(s.as_slice()).zip(&mean) {
                let d = f64::from(v) - m;
                *acc += d * d / n;
            }
        }
        for s in &mut scale {
            *s = if *s > 1e-12 { s.sqrt() } else { 1.0 };
        }
        Self { mean, scale }
    }

    /// Standardise one state.
    #[must_use]
    pub fn transform(&self, state: &StateVector) -> [f64; STATE_DIMS] {
        let mut out = [0.0; STATE_DIMS];
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = (f64::from(state.0[i]) - self.mean[i]) / self.scale[i];
        }
        out
    }
}

/// Régression logistique multinomiale + scaler, persistés ensemble.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassifierModel {
    scaler: StandardScaler,
    weights: Vec<[f64; STATE_DIMS]>,
    bias: [f64; CLASSES],
    /// Samples the model was fit on.
    pub trained_on: usize,
}

impl ClassifierModel {
    /// Fit on labelled states with full-batch gradient descent.
    ///
    /// Deterministic: the same samples give the same model.
    #[must_use]
    pub fn fit(samples: &[(StateVector, ActionArchetype)], epochs: usize, rate: f64) -> Self {
        let states: Vec<StateVector> = samples.iter().map(|(s, _)| *s).collect();
        let scaler = StandardScaler::fit(&states);
        let inputs: Vec<[f64; STATE_DIMS]> = states.iter().map(|s| scaler.transform(s)).collect();

        let mut model = Self {
            scaler,
            weights: vec![[0.0; STATE_DIMS]; CLASSES],
            bias: [0.0; CLASSES],
            trained_on: samples.len(),
        };
        let n = samples.len().max(1) as f64;

        for _ in 0..epochs {
            let mut grad_w = vec![[0.0; STATE_DIMS]; CLASSES];
            let mut grad_b = [0.0; CLASSES];
            for (x, (_, label)) in inputs.iter().zip(samples) {
                let p = model.softmax(x);
                for (k, ((gw, gb), pk)) in grad_w.iter_mut().zip(&mut grad_b).zip(p).enumerate() {
                    let target = if k == label.index() { 1.0 } else { 0.0 };
                    let err = (pk - target) / n;
                    *gb += err;
                    for (g, xi) in gw.iter_mut().zip(x) {
                        *g += err * xi;
                    }
                }
            }
            for ((weights, bias), (gw, gb)) in model
                .weights
                .iter_mut()
                .zip(&mut model.bias)
                .zip(grad_w.iter().zip(grad_b))
            {
                *bias -= rate * gb;
                for (w, g) in weights.iter_mut().zip(gw) {
                    *w -= rate * (g + WEIGHT_DECAY * *w);
                }
            }
        }
        model
    }

    fn softmax(&self, x: &[f64; STATE_DIMS]) -> [f64; CLASSES] {
        let mut logits = self.bias;
        for (logit, weights) in logits.iter_mut().zip(&self.weights) {
            *logit += weights.iter().zip(x).map(|(w, xi)| w * xi).sum::<f64>();
        }
        let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mut sum = 0.0;
        for l in &mut logits {
            *l = (*l - max).exp();
            sum += *l;
        }
        for l in &mut logits {
            *l /= sum;
        }
        logits
    }

    /// Class probabilities in archetype order.
    #[must_use]
    pub fn probabilities(&self, state: &StateVector) -> [f64; CLASSES] {
        self.softmax(&self.scaler.transform(state))
    }

    /// Most probable archetype; ties go to the lowest index.
    #[must_use]
    pub fn predict(&self, state: &StateVector) -> ActionArchetype {
        let p = self.probabilities(state);
        let mut best = 0;
        for (k, pk) in p.iter().enumerate().skip(1) {
            if *pk > p[best] {
                best = k;
            }
        }
        ActionArchetype::from_index(best).unwrap_or(ActionArchetype::CrossfadeToB)
    }
}

/// Classifieur entraîné, avec repli heuristique tant qu'il n'est pas fiable.
pub struct ClassifierPolicy {
    model: Option<ClassifierModel>,
    fallback: HeuristicPolicy,
    steps: ActionSteps,
    min_samples: usize,
    epochs: usize,
    rate: f64,
    /// Degraded mode already reported for the current model.
    warned: bool,
}

impl ClassifierPolicy {
    /// Build without a model. Decisions fall back to heuristics until
    /// [`Policy::train`] succeeds.
    #[must_use]
    pub fn new(config: &MixConfig) -> Self {
        Self {
            model: None,
            fallback: HeuristicPolicy::new(config),
            steps: ActionSteps::from(&config.policy),
            min_samples: config.policy.min_training_samples,
            epochs: config.policy.training_epochs,
            rate: config.policy.training_rate,
            warned: false,
        }
    }

    /// Build and load `classifier.bin` from `dir`. A missing or corrupt
    /// artifact leaves the policy untrained.
    #[must_use]
    pub fn load(config: &MixConfig, dir: &Path) -> Self {
        let mut policy = Self::new(config);
        let path = Self::artifact(dir);
        match persist::load::<ClassifierModel>(&path) {
            Ok(model) => {
                log::info!("Classifieur chargé ({} échantillons)", model.trained_on);
                policy.model = Some(model);
            }
            Err(AgentError::Io { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {
                log::info!("Aucun classifieur dans {}", dir.display());
            }
            Err(e) => log::warn!("{e} : classifieur ignoré"),
        }
        policy
    }

    fn artifact(dir: &Path) -> PathBuf {
        dir.join(CLASSIFIER_FILE)
    }

    /// `true` when decisions come from the model.
    #[must_use]
    pub fn is_trusted(&self) -> bool {
        self.model
            .as_ref()
            .is_some_and(|m| m.trained_on >= self.min_samples)
    }

    /// Current model, trusted or not.
    #[must_use]
    pub fn model(&self) -> Option<&ClassifierModel> {
        self.model.as_ref()
    }
}

impl Policy for ClassifierPolicy {
    fn name(&self) -> &'static str {
        "classifier"
    }

    fn decide(&mut self, observation: &Observation) -> ActionCommand {
        if let Some(model) = self.model.as_ref().filter(|m| m.trained_on >= self.min_samples) {
            return model.predict(&observation.vector()).to_command(&self.steps);
        }
        if !self.warned {
            log::warn!(
                "Classifieur non fiable ({} échantillons, {} requis) : mode dégradé heuristique",
                self.model.as_ref().map_or(0, |m| m.trained_on),
                self.min_samples
            );
            self.warned = true;
        }
        self.fallback.decide(observation)
    }

    fn persist(&self, dir: &Path) -> Result<(), AgentError> {
        let Some(model) = &self.model else {
            return Ok(());
        };
        let path = Self::artifact(dir);
        persist::save_atomic(&path, model)?;
        log::info!("Classifieur sauvegardé : {}", path.display());
        Ok(())
    }

    /// Below `min_training_samples` the current model is kept.
    fn train(&mut self, samples: &[(StateVector, ActionArchetype)]) -> Result<(), AgentError> {
        if samples.len() < self.min_samples {
            return Err(AgentError::InsufficientData {
                got: samples.len(),
                need: self.min_samples,
            });
        }
        self.model = Some(ClassifierModel::fit(samples, self.epochs, self.rate));
        self.warned = false;
        log::info!("Classifieur entraîné sur {} échantillons", samples.len());
        Ok(())
    }
}
