use std::sync::{Arc, Mutex, PoisonError};

use am_core::CoreError;
use am_core::features::{ActionCommand, MixState};
use am_core::traits::{CommandSink, MixStateProvider};

/// Transmet les commandes sur un canal `flume` borné.
///
/// Never blocks: a full channel drops the command and reports it.
pub struct ChannelSink {
    tx: flume::Sender<ActionCommand>,
}

impl ChannelSink {
    /// Wrap an existing sender.
    #[must_use]
    pub fn new(tx: flume::Sender<ActionCommand>) -> Self {
        Self { tx }
    }

    /// Bounded channel of `capacity` commands; the receiver goes to the mixer bridge.
    ///
    /// # Example
    /// ```
    /// use am_agent::ChannelSink;
    /// use am_core::features::ActionCommand;
    /// use am_core::traits::CommandSink;
    /// let (mut sink, rx) = ChannelSink::channel(4);
    /// sink.execute(&ActionCommand::default()).unwrap();
    /// assert_eq!(rx.len(), 1);
    /// ```
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, flume::Receiver<ActionCommand>) {
        let (tx, rx) = flume::bounded(capacity.max(1));
        (Self::new(tx), rx)
    }
}

impl CommandSink for ChannelSink {
    fn execute(&mut self, command: &ActionCommand) -> anyhow::Result<()> {
        match self.tx.try_send(command.clone()) {
            Ok(()) => Ok(()),
            Err(flume::TrySendError::Full(_)) => {
                anyhow::bail!("canal de commandes plein, commande abandonnée")
            }
            Err(flume::TrySendError::Disconnected(_)) => Err(CoreError::SinkClosed.into()),
        }
    }
}

/// Table de mixage simulée : applique les commandes à un `MixState` partagé.
///
/// Clones share the same state, so one clone can serve snapshots while
/// another executes commands.
#[derive(Clone, Debug)]
pub struct SimulatedMixer {
    state: Arc<Mutex<MixState>>,
    transitions: Arc<Mutex<u64>>,
}

impl SimulatedMixer {
    /// Start from `initial`, clamped.
    ///
    /// # Example
    /// ```
    /// use am_agent::SimulatedMixer;
    /// use am_core::features::{ActionCommand, MixState};
    /// let mixer = SimulatedMixer::new(MixState::default());
    /// mixer.apply(&ActionCommand { crossfade_adjust: 0.9, ..ActionCommand::default() });
    /// assert_eq!(mixer.state().crossfader_position, 1.0);
    /// ```
    #[must_use]
    pub fn new(initial: MixState) -> Self {
        Self {
            state: Arc::new(Mutex::new(initial.clamped())),
            transitions: Arc::new(Mutex::new(0)),
        }
    }

    /// Apply one command.
    pub fn apply(&self, command: &ActionCommand) {
        let mut s = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        s.crossfader_position = (s.crossfader_position + command.crossfade_adjust).clamp(0.0, 1.0);
        s.deck_a_volume = (s.deck_a_volume + command.volume_adjust_a).clamp(0.0, 1.0);
        s.deck_b_volume = (s.deck_b_volume + command.volume_adjust_b).clamp(0.0, 1.0);

        if command.transition_now {
            // Toward the deck the crossfader is away from.
            if s.crossfader_position < 0.5 {
                s.crossfader_position = 1.0;
                s.deck_b_playing = true;
            } else {
                s.crossfader_position = 0.0;
                s.deck_a_playing = true;
            }
            *self.transitions.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        }
        if let Some(slot) = command.effect_trigger {
            log::debug!("Effet {slot} déclenché");
        }
        for (band, delta) in &command.eq_adjust {
            log::trace!("EQ {band:?} {delta:+.2}");
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> MixState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Overwrite the state, e.g. to start a deck.
    pub fn set_state(&self, state: MixState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state.clamped();
    }

    /// Transitions executed so far.
    #[must_use]
    pub fn transitions(&self) -> u64 {
        *self.transitions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SimulatedMixer {
    fn default() -> Self {
        Self::new(MixState::default())
    }
}

impl CommandSink for SimulatedMixer {
    fn execute(&mut self, command: &ActionCommand) -> anyhow::Result<()> {
        self.apply(command);
        Ok(())
    }
}

impl MixStateProvider for SimulatedMixer {
    fn snapshot(&self) -> MixState {
        self.state()
    }
}
