use am_core::CoreError;
use thiserror::Error;

/// Errors originating from the agent.
#[derive(Error, Debug)]
pub enum AgentError {
    /// Configuration rejected at construction.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Filesystem failure while persisting or loading learning state.
    #[error("Erreur d'E/S sur {path} : {source}")]
    Io {
        /// File involved.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// Artifact could not be encoded or decoded.
    #[error("Artefact invalide {path} : {reason}")]
    Codec {
        /// File involved.
        path: String,
        /// Decoder message.
        reason: String,
    },

    /// Too few labelled samples to fit the classifier.
    #[error("Données d'entraînement insuffisantes : {got} échantillons, {need} requis")]
    InsufficientData {
        /// Samples provided.
        got: usize,
        /// Minimum accepted.
        need: usize,
    },

    /// The active strategy has no trainable model.
    #[error("La stratégie {strategy} ne s'entraîne pas")]
    NotTrainable {
        /// Strategy name.
        strategy: &'static str,
    },
}
