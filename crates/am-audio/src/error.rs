use thiserror::Error;

/// Errors originating from the audio module.
#[derive(Error, Debug)]
pub enum AudioError {
    /// No audio input device found.
    #[error("Aucun périphérique audio d'entrée trouvé")]
    NoInputDevice,

    /// Unsupported audio format.
    #[error("Format audio non supporté : {0}")]
    UnsupportedFormat(String),

    /// Audio stream error.
    #[error("Erreur de stream audio : {0}")]
    StreamError(String),

    /// Not enough captured audio for the requested analysis.
    #[error("Audio insuffisant : {available} échantillons, {required} requis")]
    InsufficientAudio {
        /// Samples held by the buffer.
        available: usize,
        /// Samples the analysis needs.
        required: usize,
    },

    /// The processing thread could not be spawned.
    #[error("Impossible de lancer le thread de traitement : {0}")]
    Thread(#[from] std::io::Error),
}
