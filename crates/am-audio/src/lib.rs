// Audio capture, analysis, and feature extraction for automix.

pub mod analysis;
pub mod beat;
pub mod buffer;
pub mod capture;
pub mod error;
pub mod features;
pub mod fft;
pub mod pipeline;
pub mod quality;

pub use buffer::CaptureBuffer;
pub use error::AudioError;
pub use pipeline::{AudioPipeline, FeatureProcessor, FeatureReader};
