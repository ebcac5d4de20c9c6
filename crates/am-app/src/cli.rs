use std::path::PathBuf;

use am_core::MixConfig;
use clap::{Parser, Subcommand};

/// automix : agent de mixage adaptatif piloté par l'analyse audio temps réel.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Fichier de configuration TOML. Défaut : config/default.toml.
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: PathBuf,

    /// Stratégie : heuristic, classifier, reinforcement (remplace la config).
    #[arg(long)]
    pub strategy: Option<String>,

    /// Répertoire des modèles appris (remplace la config).
    #[arg(long)]
    pub model_dir: Option<PathBuf>,

    /// Graine du générateur aléatoire (remplace la config).
    #[arg(long)]
    pub seed: Option<u64>,

    /// Niveau de log : error, warn, info, debug, trace.
    #[arg(long, default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Capture, analyse et décisions en continu jusqu'à Ctrl-C (défaut).
    Run,
    /// Entraîner le classifieur sur des échantillons JSON étiquetés.
    Train {
        /// Tableau JSON de `{ "features": …, "mix": …, "action": … }`.
        samples: PathBuf,
    },
    /// Capturer quelques secondes puis afficher l'analyse du tampon.
    Analyze {
        /// Durée capturée puis analysée (s).
        #[arg(long, default_value_t = 2.0)]
        seconds: f32,
    },
}

impl Cli {
    /// Apply command-line overrides on top of the loaded configuration.
    ///
    /// # Errors
    /// Returns an error if the resulting strategy name is unknown.
    pub fn apply_overrides(&self, config: &mut MixConfig) -> anyhow::Result<()> {
        if let Some(ref strategy) = self.strategy {
            config.policy.strategy.clone_from(strategy);
        }
        if let Some(ref dir) = self.model_dir {
            config.policy.model_dir = dir.display().to_string();
        }
        if let Some(seed) = self.seed {
            config.policy.seed = seed;
        }
        config.policy.strategy_kind()?;
        Ok(())
    }
}
