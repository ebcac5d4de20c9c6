//! Shared types, configuration, and collaborator traits for automix.
//!
//! This crate holds everything the audio pipeline, the decision agent and
//! the binary agree on: the feature schema, the mixer snapshot, the action
//! record and the TOML configuration.

pub mod config;
pub mod error;
pub mod features;
pub mod traits;

pub use config::MixConfig;
pub use error::CoreError;
pub use features::{ActionCommand, EqBand, FeatureVector, MixState};
