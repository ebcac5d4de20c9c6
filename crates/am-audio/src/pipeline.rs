use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use am_core::config::{AudioConfig, BeatConfig, MixConfig};
use am_core::features::FeatureVector;
use am_core::traits::FeatureSource;
use triple_buffer::TripleBuffer;

use crate::analysis::{self, BufferAnalysis};
use crate::beat::BeatTracker;
use crate::buffer::CaptureBuffer;
use crate::capture::{AudioCapture, CaptureFeed};
use crate::error::AudioError;
use crate::features::FeatureExtractor;
use crate::quality::QualityScorer;

/// Un cycle de traitement complet : extraction, suivi du tempo, score qualité.
///
/// Owned by the processing thread. Deterministic for a given sequence of
/// windows and timestamps, so it can be driven directly in tests.
///
/// # Example
/// ```
/// use am_audio::FeatureProcessor;
/// use am_core::config::MixConfig;
///
/// let mut processor = FeatureProcessor::new(&MixConfig::default(), 44100);
/// let f = processor.process(&vec![0.0; 2048], 0.1);
/// assert_eq!(f.quality_score, 0.0);
/// assert!(!f.beat_detected);
/// ```
pub struct FeatureProcessor {
    extractor: FeatureExtractor,
    tracker: BeatTracker,
    scorer: QualityScorer,
    /// Reused snapshot storage.
    window: Vec<f32>,
}

impl FeatureProcessor {
    /// Build the processing chain for a device running at `sample_rate`.
    #[must_use]
    pub fn new(config: &MixConfig, sample_rate: u32) -> Self {
        let extractor = FeatureExtractor::new(&config.audio, sample_rate);
        let window = Vec::with_capacity(extractor.window_size());
        Self {
            extractor,
            tracker: BeatTracker::new(&config.beat),
            scorer: QualityScorer::new(&config.quality),
            window,
        }
    }

    /// Analyse one window taken at `timestamp` seconds.
    pub fn process(&mut self, samples: &[f32], timestamp: f64) -> FeatureVector {
        let mut features = self.extractor.extract(samples, timestamp);
        features.beat_detected = self.tracker.process(features.energy, timestamp);
        features.bpm = self.tracker.bpm();
        features.quality_score = self.scorer.score_features(&features);
        features.sanitized()
    }

    /// Drain the latest window from `buffer` and analyse it.
    ///
    /// Returns `None` when nothing new arrived since the previous cycle.
    pub fn process_buffer(
        &mut self,
        buffer: &CaptureBuffer,
        timestamp: f64,
    ) -> Option<FeatureVector> {
        let mut window = std::mem::take(&mut self.window);
        let fresh = buffer.snapshot_into(&mut window, self.extractor.window_size());
        let result = (fresh > 0).then(|| self.process(&window, timestamp));
        self.window = window;
        result
    }

    /// Tempo tracker state.
    #[must_use]
    pub fn tracker(&self) -> &BeatTracker {
        &self.tracker
    }

    /// Scorer used for `quality_score`.
    #[must_use]
    pub fn scorer(&self) -> &QualityScorer {
        &self.scorer
    }
}

/// Lecteur non bloquant du dernier `FeatureVector` publié.
pub struct FeatureReader(triple_buffer::Output<FeatureVector>);

impl FeatureReader {
    /// `true` if a vector was published since the last read.
    #[must_use]
    pub fn has_update(&self) -> bool {
        self.0.updated()
    }
}

impl FeatureSource for FeatureReader {
    fn latest(&mut self) -> FeatureVector {
        *self.0.read()
    }
}

/// Spawn the processing loop.
///
/// Every `interval`, moves captured samples from `feed` (if any) into
/// `buffer`, processes the latest window and publishes the result. The loop
/// checks `stop` between cycles only, so a cycle in flight always completes.
///
/// # Errors
/// Returns an error if the OS refuses to spawn the thread.
pub fn spawn_processing_thread(
    mut feed: Option<CaptureFeed>,
    buffer: Arc<CaptureBuffer>,
    mut processor: FeatureProcessor,
    mut output: triple_buffer::Input<FeatureVector>,
    interval: Duration,
    stop: Arc<AtomicBool>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("am-processing".to_string())
        .spawn(move || {
            log::info!("Boucle de traitement démarrée ({} ms)", interval.as_millis());
            let origin = Instant::now();
            while !stop.load(Ordering::Acquire) {
                let cycle = Instant::now();
                if let Some(feed) = feed.as_mut() {
                    feed.pump(&buffer);
                }
                let timestamp = origin.elapsed().as_secs_f64();
                if let Some(features) = processor.process_buffer(&buffer, timestamp) {
                    output.write(features);
                }
                if let Some(rest) = interval.checked_sub(cycle.elapsed()) {
                    thread::sleep(rest);
                }
            }
            log::info!(
                "Boucle de traitement arrêtée ({} échantillons perdus)",
                buffer.dropped_samples()
            );
        })
}

/// Capture + traitement en tâche de fond, avec arrêt propre.
///
/// Owns the cpal stream (if any), the shared [`CaptureBuffer`] and the
/// processing thread. Dropping the pipeline stops it.
pub struct AudioPipeline {
    capture: Option<AudioCapture>,
    buffer: Arc<CaptureBuffer>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    scorer: QualityScorer,
    audio: AudioConfig,
    beat: BeatConfig,
    sample_rate: u32,
}

impl AudioPipeline {
    /// Capture from the default input device and start processing.
    ///
    /// # Errors
    /// Fails if no input device exists, its format is unsupported, or the
    /// stream or thread cannot be started.
    pub fn start_default(config: &MixConfig) -> Result<(Self, FeatureReader), AudioError> {
        let (capture, feed) = AudioCapture::start_default()?;
        let sample_rate = capture.sample_rate();
        if sample_rate != config.audio.sample_rate {
            log::info!(
                "Fréquence du périphérique {sample_rate}Hz (config {}Hz)",
                config.audio.sample_rate
            );
        }
        let buffer = Arc::new(CaptureBuffer::new(config.audio.buffer_capacity(sample_rate)));
        Self::start(config, Some(capture), Some(feed), buffer, sample_rate)
    }

    /// Process samples pushed into `buffer` by an external producer.
    ///
    /// # Errors
    /// Fails if the processing thread cannot be spawned.
    ///
    /// # Example
    /// ```
    /// use std::sync::Arc;
    /// use am_audio::{AudioPipeline, CaptureBuffer};
    /// use am_core::config::MixConfig;
    ///
    /// let buffer = Arc::new(CaptureBuffer::with_duration(44100, 1.0));
    /// let (mut pipeline, _reader) =
    ///     AudioPipeline::start_with_buffer(&MixConfig::default(), buffer, 44100).unwrap();
    /// pipeline.stop();
    /// assert!(!pipeline.is_running());
    /// ```
    pub fn start_with_buffer(
        config: &MixConfig,
        buffer: Arc<CaptureBuffer>,
        sample_rate: u32,
    ) -> Result<(Self, FeatureReader), AudioError> {
        Self::start(config, None, None, buffer, sample_rate)
    }

    fn start(
        config: &MixConfig,
        capture: Option<AudioCapture>,
        feed: Option<CaptureFeed>,
        buffer: Arc<CaptureBuffer>,
        sample_rate: u32,
    ) -> Result<(Self, FeatureReader), AudioError> {
        let (input, output) = TripleBuffer::new(&FeatureVector::default()).split();
        let stop = Arc::new(AtomicBool::new(false));
        let handle = spawn_processing_thread(
            feed,
            Arc::clone(&buffer),
            FeatureProcessor::new(config, sample_rate),
            input,
            Duration::from_millis(config.audio.process_interval_ms),
            Arc::clone(&stop),
        )?;

        Ok((
            Self {
                capture,
                buffer,
                stop,
                handle: Some(handle),
                scorer: QualityScorer::new(&config.quality),
                audio: config.audio.clone(),
                beat: config.beat.clone(),
                sample_rate,
            },
            FeatureReader(output),
        ))
    }

    /// Request stop, let the in-flight cycle finish, then release the device.
    /// Idempotent.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            log::error!("Le thread de traitement a paniqué");
        }
        if let Some(capture) = self.capture.take()
            && let Err(e) = capture.pause()
        {
            log::warn!("{e}");
        }
    }

    /// `true` until [`stop`](Self::stop) has been called.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Shared capture buffer.
    #[must_use]
    pub fn buffer(&self) -> &Arc<CaptureBuffer> {
        &self.buffer
    }

    /// Sample rate of the processed stream.
    #[must_use]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Offline analysis of the last `seconds` of captured audio.
    ///
    /// # Errors
    /// [`AudioError::InsufficientAudio`] if the buffer holds less than that.
    pub fn analyze_recent(&self, seconds: f32) -> Result<BufferAnalysis, AudioError> {
        analysis::analyze_buffer(&self.buffer, self.sample_rate, seconds, &self.audio, &self.beat)
    }

    /// Quality score of an already-extracted vector.
    #[must_use]
    pub fn estimate_mix_quality(&self, features: &FeatureVector) -> f32 {
        self.scorer.score_features(features)
    }
}

impl Drop for AudioPipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_buffer_publishes_nothing() {
        let mut processor = FeatureProcessor::new(&MixConfig::default(), 44100);
        let buffer = CaptureBuffer::new(4096);
        assert!(processor.process_buffer(&buffer, 0.0).is_none());
        buffer.push(&[0.0; 512]);
        assert!(processor.process_buffer(&buffer, 0.1).is_some());
        assert!(processor.process_buffer(&buffer, 0.2).is_none());
    }

    #[test]
    fn processor_fills_rhythm_and_quality() {
        let mut processor = FeatureProcessor::new(&MixConfig::default(), 44100);
        let quiet = vec![0.001f32; 2048];
        let loud = vec![0.5f32; 2048];
        processor.process(&quiet, 0.0);
        let hit = processor.process(&loud, 0.5);
        assert!(hit.beat_detected);
        assert_eq!(processor.tracker().beat_count(), 1);
        let after = processor.process(&quiet, 0.6);
        assert!(!after.beat_detected);
        assert!(after.quality_score >= 0.0 && after.quality_score <= 1.0);
    }

    #[test]
    fn stop_is_idempotent() {
        let buffer = Arc::new(CaptureBuffer::new(8192));
        let (mut pipeline, _reader) =
            AudioPipeline::start_with_buffer(&MixConfig::default(), buffer, 44100).unwrap();
        assert!(pipeline.is_running());
        pipeline.stop();
        pipeline.stop();
        assert!(!pipeline.is_running());
    }
}
