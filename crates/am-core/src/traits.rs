use crate::features::{ActionCommand, FeatureVector, MixState};

/// Exécute les commandes produites par l'agent (collaborateur externe).
///
/// Implémenté par : `ChannelSink`, `SimulatedMixer`, et tout pont vers la
/// table de mixage réelle.
///
/// # Example
/// ```
/// use am_core::traits::CommandSink;
/// use am_core::features::ActionCommand;
///
/// struct NullSink;
/// impl CommandSink for NullSink {
///     fn execute(&mut self, _command: &ActionCommand) -> anyhow::Result<()> { Ok(()) }
/// }
/// ```
pub trait CommandSink: Send {
    /// Hand one command to the mixer. Must not block the decision loop for long.
    ///
    /// # Errors
    /// Returns an error if the command could not be delivered.
    fn execute(&mut self, command: &ActionCommand) -> anyhow::Result<()>;
}

/// Fournit une copie de l'état de la table de mixage.
///
/// # Example
/// ```
/// use am_core::traits::MixStateProvider;
/// use am_core::features::MixState;
///
/// struct Fixed(MixState);
/// impl MixStateProvider for Fixed {
///     fn snapshot(&self) -> MixState { self.0 }
/// }
/// ```
pub trait MixStateProvider: Send {
    /// Current mixer state. May be out of range; callers clamp it.
    fn snapshot(&self) -> MixState;
}

/// Lit le dernier `FeatureVector` publié par le thread de traitement.
///
/// Ne bloque JAMAIS : retourne la dernière valeur connue.
pub trait FeatureSource: Send {
    /// Latest published features.
    fn latest(&mut self) -> FeatureVector;
}

/// A fixed vector is a valid source (replay, tests, offline scoring).
impl FeatureSource for FeatureVector {
    fn latest(&mut self) -> FeatureVector {
        *self
    }
}
