use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use rtrb::{Consumer, RingBuffer};

use crate::buffer::CaptureBuffer;
use crate::error::AudioError;

/// Seconds of audio the callback queue can hold before dropping.
const QUEUE_SECONDS: usize = 2;

/// Capture audio via cpal.
///
/// The device callback downmixes to mono and pushes into a lock-free rtrb
/// queue, never waiting. Samples that do not fit are dropped. The paired
/// [`CaptureFeed`] drains the queue into a [`CaptureBuffer`] from the
/// processing thread.
///
/// # Example
/// ```no_run
/// use am_audio::capture::AudioCapture;
/// let (capture, feed) = AudioCapture::start_default().unwrap();
/// assert!(capture.sample_rate() > 0);
/// ```
pub struct AudioCapture {
    stream: cpal::Stream,
    sample_rate: u32,
    channels: usize,
}

/// Côté consommateur de la file de capture, déplacé dans le thread de traitement.
pub struct CaptureFeed {
    consumer: Consumer<f32>,
    scratch: Vec<f32>,
}

impl AudioCapture {
    /// Start capturing from the default input device.
    ///
    /// # Errors
    /// [`AudioError::NoInputDevice`] when the host has no input,
    /// [`AudioError::UnsupportedFormat`] for non-f32 devices, and
    /// [`AudioError::StreamError`] if the stream cannot be built or started.
    pub fn start_default() -> Result<(Self, CaptureFeed), AudioError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or(AudioError::NoInputDevice)?;

        let config = device
            .default_input_config()
            .map_err(|e| AudioError::StreamError(e.to_string()))?;
        if config.sample_format() != cpal::SampleFormat::F32 {
            return Err(AudioError::UnsupportedFormat(format!(
                "{:?}",
                config.sample_format()
            )));
        }
        let sample_rate = config.sample_rate().0;
        let channels = usize::from(config.channels()).max(1);

        let (mut producer, consumer) = RingBuffer::new(sample_rate as usize * QUEUE_SECONDS);

        let stream = device
            .build_input_stream(
                &config.into(),
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let inv = 1.0 / channels as f32;
                    for frame in data.chunks(channels) {
                        let mono: f32 = frame.iter().sum::<f32>() * inv;
                        // Full queue: drop, never block the device thread.
                        let _ = producer.push(mono);
                    }
                },
                |err| {
                    log::error!("Erreur du stream audio : {err}");
                },
                None,
            )
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        stream
            .play()
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        log::info!(
            "Capture audio démarrée : {} @ {sample_rate}Hz, {channels} canaux",
            device.name().unwrap_or_else(|_| "inconnu".to_string())
        );

        Ok((
            Self {
                stream,
                sample_rate,
                channels,
            },
            CaptureFeed::new(consumer),
        ))
    }

    /// Pause the device stream.
    ///
    /// # Errors
    /// Returns [`AudioError::StreamError`] if the host refuses.
    pub fn pause(&self) -> Result<(), AudioError> {
        self.stream
            .pause()
            .map_err(|e| AudioError::StreamError(e.to_string()))
    }

    /// Device sample rate (Hz).
    #[must_use]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Device channel count before downmix.
    #[must_use]
    pub fn channels(&self) -> usize {
        self.channels
    }
}

impl CaptureFeed {
    /// Wrap the consumer half of an rtrb queue of mono samples.
    #[must_use]
    pub fn new(consumer: Consumer<f32>) -> Self {
        Self {
            consumer,
            scratch: Vec::new(),
        }
    }

    /// Move every queued sample into `buffer`. Returns how many were read.
    pub fn pump(&mut self, buffer: &CaptureBuffer) -> usize {
        let available = self.consumer.slots();
        if available == 0 {
            return 0;
        }
        self.scratch.clear();
        self.scratch.reserve(available);
        while let Ok(sample) = self.consumer.pop() {
            self.scratch.push(sample);
        }
        if !buffer.push(&self.scratch) {
            log::trace!("{} échantillons perdus (buffer occupé)", self.scratch.len());
        }
        self.scratch.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feed_moves_queued_samples_into_buffer() {
        let (mut producer, consumer) = RingBuffer::new(16);
        let mut feed = CaptureFeed::new(consumer);
        let buffer = CaptureBuffer::new(8);

        assert_eq!(feed.pump(&buffer), 0);
        for s in [0.1, 0.2, 0.3] {
            producer.push(s).unwrap();
        }
        assert_eq!(feed.pump(&buffer), 3);
        assert_eq!(buffer.peek(8), vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn full_queue_drops_instead_of_blocking() {
        let (mut producer, consumer) = RingBuffer::new(2);
        assert!(producer.push(1.0).is_ok());
        assert!(producer.push(2.0).is_ok());
        assert!(producer.push(3.0).is_err());
        let mut feed = CaptureFeed::new(consumer);
        let buffer = CaptureBuffer::new(4);
        assert_eq!(feed.pump(&buffer), 2);
        assert_eq!(buffer.peek(4), vec![1.0, 2.0]);
    }
}
