use std::path::Path;

use am_agent::policy::{ClassifierPolicy, Policy};
use am_agent::{ActionArchetype, StateVector};
use am_core::MixConfig;
use am_core::features::{FeatureVector, MixState};
use anyhow::Context;
use serde::Deserialize;

/// One labelled decision, as exported from a recorded session.
#[derive(Debug, Deserialize)]
pub struct LabelledSample {
    pub features: FeatureVector,
    #[serde(default)]
    pub mix: MixState,
    pub action: ActionArchetype,
}

/// Parse a JSON array of labelled samples into state vectors.
///
/// # Errors
/// Returns an error if the text is not a valid sample array.
pub fn parse_samples(json: &str) -> anyhow::Result<Vec<(StateVector, ActionArchetype)>> {
    let raw: Vec<LabelledSample> = serde_json::from_str(json)?;
    Ok(raw
        .into_iter()
        .map(|s| {
            (
                StateVector::new(&s.features.sanitized(), &s.mix.clamped()),
                s.action,
            )
        })
        .collect())
}

/// Fit the classifier on `samples_path` and store it in the model directory.
///
/// # Errors
/// Returns an error if the samples cannot be read, are too few, or the
/// model cannot be written.
pub fn run_training(config: &MixConfig, samples_path: &Path) -> anyhow::Result<()> {
    let json = std::fs::read_to_string(samples_path)
        .with_context(|| format!("Impossible de lire {}", samples_path.display()))?;
    let samples = parse_samples(&json)
        .with_context(|| format!("Échantillons invalides dans {}", samples_path.display()))?;
    log::info!("{} échantillons chargés", samples.len());

    let dir = Path::new(&config.policy.model_dir);
    let mut policy = ClassifierPolicy::new(config);
    policy.train(&samples)?;
    policy
        .persist(dir)
        .with_context(|| format!("Sauvegarde du classifieur dans {}", dir.display()))?;
    println!(
        "Classifieur entraîné sur {} échantillons → {}",
        samples.len(),
        dir.display()
    );
    Ok(())
}
