use thiserror::Error;

/// Errors originating from the core module.
#[derive(Error, Debug)]
pub enum CoreError {
    /// The configured decision strategy does not exist.
    #[error("Stratégie inconnue : {name} (attendu : heuristic, classifier, reinforcement)")]
    UnknownStrategy {
        /// Name found in the configuration.
        name: String,
    },

    /// The external command sink is gone.
    #[error("Sink de commandes fermé")]
    SinkClosed,
}
