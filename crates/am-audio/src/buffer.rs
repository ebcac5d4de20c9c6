use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError, TryLockError};

/// Fenêtre circulaire d'échantillons mono, partagée entre producteur et traitement.
///
/// `push` never blocks: it takes the lock with `try_lock` and drops the chunk
/// when processing holds it. Storage is allocated once at construction; the
/// oldest samples are overwritten on overflow.
///
/// # Example
/// ```
/// use am_audio::buffer::CaptureBuffer;
/// let buf = CaptureBuffer::new(4);
/// assert!(buf.push(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]));
/// assert_eq!(buf.drain_snapshot(8).samples, vec![3.0, 4.0, 5.0, 6.0]);
/// ```
pub struct CaptureBuffer {
    ring: Mutex<Ring>,
    capacity: usize,
    /// Samples lost to lock contention.
    dropped: AtomicU64,
}

struct Ring {
    data: Vec<f32>,
    /// Next write index.
    write: usize,
    /// Valid samples, ≤ capacity.
    len: usize,
    /// Samples pushed since the last drain.
    unread: usize,
}

/// Copie des échantillons les plus récents.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Snapshot {
    /// Most recent samples, oldest first.
    pub samples: Vec<f32>,
    /// Samples written since the previous drain (may exceed `samples.len()`).
    pub new_samples: usize,
}

impl CaptureBuffer {
    /// Create a buffer holding `capacity` samples.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: Mutex::new(Ring {
                data: vec![0.0; capacity],
                write: 0,
                len: 0,
                unread: 0,
            }),
            capacity,
            dropped: AtomicU64::new(0),
        }
    }

    /// Create a buffer holding `seconds` of audio at `sample_rate`.
    ///
    /// # Example
    /// ```
    /// use am_audio::buffer::CaptureBuffer;
    /// let buf = CaptureBuffer::with_duration(44100, 5.0);
    /// assert_eq!(buf.capacity(), 220_500);
    /// ```
    #[must_use]
    pub fn with_duration(sample_rate: u32, seconds: f32) -> Self {
        Self::new((sample_rate as f32 * seconds.max(0.0)) as usize)
    }

    /// A buffer that was never initialised: pushes are ignored and
    /// snapshots are empty.
    #[must_use]
    pub fn uninitialized() -> Self {
        Self::new(0)
    }

    /// Capacity in samples.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Copy `samples` into the ring. Real-time safe: no allocation, no wait.
    ///
    /// Returns `false` if the chunk was dropped (lock contended or buffer
    /// uninitialised).
    pub fn push(&self, samples: &[f32]) -> bool {
        if self.capacity == 0 {
            return false;
        }
        let mut ring = match self.ring.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                self.dropped.fetch_add(samples.len() as u64, Ordering::Relaxed);
                return false;
            }
        };
        ring.write_slice(samples.iter().copied(), samples.len());
        true
    }

    /// Copy out the latest `window` samples (fewer if not yet available) and
    /// reset the unread counter. Holds the lock only for the copy.
    #[must_use]
    pub fn drain_snapshot(&self, window: usize) -> Snapshot {
        let mut samples = Vec::with_capacity(window.min(self.capacity));
        let new_samples = self.snapshot_into(&mut samples, window);
        Snapshot {
            samples,
            new_samples,
        }
    }

    /// Same as [`drain_snapshot`](Self::drain_snapshot) into a reused vector.
    /// Returns the unread count.
    pub fn snapshot_into(&self, out: &mut Vec<f32>, window: usize) -> usize {
        out.clear();
        if self.capacity == 0 {
            return 0;
        }
        let mut ring = self.ring.lock().unwrap_or_else(PoisonError::into_inner);
        ring.copy_latest(out, window);
        std::mem::take(&mut ring.unread)
    }

    /// Copy the latest `window` samples without touching the unread counter.
    #[must_use]
    pub fn peek(&self, window: usize) -> Vec<f32> {
        let mut out = Vec::new();
        if self.capacity > 0 {
            let ring = self.ring.lock().unwrap_or_else(PoisonError::into_inner);
            ring.copy_latest(&mut out, window);
        }
        out
    }

    /// Valid samples currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        if self.capacity == 0 {
            return 0;
        }
        self.ring.lock().unwrap_or_else(PoisonError::into_inner).len
    }

    /// `true` if nothing has been captured yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Samples dropped because the lock was contended.
    #[must_use]
    pub fn dropped_samples(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Default for CaptureBuffer {
    fn default() -> Self {
        Self::uninitialized()
    }
}

impl Ring {
    #[inline]
    fn write_slice(&mut self, samples: impl Iterator<Item = f32>, count: usize) {
        let cap = self.data.len();
        // Only the last `cap` samples survive.
        let skip = count.saturating_sub(cap);
        for sample in samples.skip(skip) {
            self.data[self.write] = sample;
            self.write += 1;
            if self.write == cap {
                self.write = 0;
            }
        }
        self.len = (self.len + count).min(cap);
        self.unread = self.unread.saturating_add(count);
    }

    fn copy_latest(&self, out: &mut Vec<f32>, window: usize) {
        let cap = self.data.len();
        let n = window.min(self.len);
        let start = (self.write + cap - n) % cap;
        if start + n <= cap {
            out.extend_from_slice(&self.data[start..start + n]);
        } else {
            out.extend_from_slice(&self.data[start..]);
            out.extend_from_slice(&self.data[..n - (cap - start)]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn uninitialized_buffer_yields_empty_snapshot() {
        let buf = CaptureBuffer::default();
        assert!(!buf.push(&[1.0, 2.0]));
        let snap = buf.drain_snapshot(1024);
        assert!(snap.samples.is_empty());
        assert_eq!(snap.new_samples, 0);
    }

    #[test]
    fn snapshot_is_chronological_across_wrap() {
        let buf = CaptureBuffer::new(5);
        buf.push(&[1.0, 2.0, 3.0]);
        buf.push(&[4.0, 5.0, 6.0, 7.0]);
        assert_eq!(buf.len(), 5);
        let snap = buf.drain_snapshot(5);
        assert_eq!(snap.samples, vec![3.0, 4.0, 5.0, 6.0, 7.0]);
        assert_eq!(snap.new_samples, 7);
        assert_eq!(buf.drain_snapshot(2).samples, vec![6.0, 7.0]);
    }

    #[test]
    fn drain_resets_unread_but_keeps_history() {
        let buf = CaptureBuffer::new(16);
        buf.push(&[0.5; 4]);
        assert_eq!(buf.drain_snapshot(16).new_samples, 4);
        let again = buf.drain_snapshot(16);
        assert_eq!(again.new_samples, 0);
        assert_eq!(again.samples.len(), 4);
    }

    #[test]
    fn push_drops_when_lock_is_held() {
        let buf = Arc::new(CaptureBuffer::new(8));
        let guard = buf.ring.lock().unwrap();
        assert!(!buf.push(&[1.0, 1.0, 1.0]));
        drop(guard);
        assert_eq!(buf.dropped_samples(), 3);
        assert!(buf.push(&[1.0]));
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn oversized_chunk_keeps_tail() {
        let buf = CaptureBuffer::new(3);
        let chunk: Vec<f32> = (0..10).map(|i| i as f32).collect();
        buf.push(&chunk);
        assert_eq!(buf.peek(3), vec![7.0, 8.0, 9.0]);
    }
}
