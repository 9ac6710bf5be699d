//! Lock-free ring buffer between the renderer and the audio output
//!
//! Single producer (render task) and single consumer (device callback). The
//! consumer side never locks, allocates or logs: shortfalls are only counted,
//! and the monitoring task reports them.

use crate::audio::types::AudioFrame;
use ringbuf::{traits::*, HeapRb};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Fill level below which the producer should render more
const TARGET_FILL_MIN_PERCENT: f32 = 0.50;

/// Counters shared by both halves
#[derive(Debug, Default)]
struct Counters {
    /// Frames the consumer wanted but did not get while audio was expected
    missing_frames: AtomicU64,
    /// Frames the producer could not push
    overruns: AtomicU64,
}

/// Ring buffer of stereo frames
pub struct AudioRingBuffer {
    buffer: HeapRb<AudioFrame>,
    counters: Arc<Counters>,
    /// Set once the producer has filled the buffer; shortfalls before that are startup, not underruns
    audio_expected: Arc<AtomicBool>,
}

impl AudioRingBuffer {
    /// Create a ring buffer holding `capacity` frames
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(2);
        debug!("Creating audio ring buffer with capacity: {} frames", capacity);
        Self {
            buffer: HeapRb::new(capacity),
            counters: Arc::new(Counters::default()),
            audio_expected: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Split into producer (render task) and consumer (device callback)
    pub fn split(self) -> (AudioProducer, AudioConsumer) {
        let (producer, consumer) = self.buffer.split();
        (
            AudioProducer {
                producer,
                counters: Arc::clone(&self.counters),
                audio_expected: Arc::clone(&self.audio_expected),
            },
            AudioConsumer {
                consumer,
                counters: self.counters,
                audio_expected: self.audio_expected,
            },
        )
    }
}

/// Producer half (render task)
pub struct AudioProducer {
    producer: ringbuf::HeapProd<AudioFrame>,
    counters: Arc<Counters>,
    audio_expected: Arc<AtomicBool>,
}

impl AudioProducer {
    /// Push frames; returns how many fit
    pub fn push_slice(&mut self, frames: &[AudioFrame]) -> usize {
        let pushed = self.producer.push_slice(frames);
        if pushed < frames.len() {
            let dropped = (frames.len() - pushed) as u64;
            let total = self.counters.overruns.fetch_add(dropped, Ordering::Relaxed) + dropped;
            warn!("Audio ring buffer overrun: {} frames dropped (total: {})", dropped, total);
        }
        if !self.audio_expected.load(Ordering::Relaxed) && !self.needs_frames() {
            self.audio_expected.store(true, Ordering::Release);
            debug!("Audio ring buffer primed with {} frames", self.occupied_len());
        }
        pushed
    }

    pub fn occupied_len(&self) -> usize {
        self.producer.occupied_len()
    }

    pub fn vacant_len(&self) -> usize {
        self.producer.vacant_len()
    }

    pub fn capacity(&self) -> usize {
        self.producer.capacity().into()
    }

    /// True while the fill level is below the target minimum
    pub fn needs_frames(&self) -> bool {
        let min = (self.capacity() as f32 * TARGET_FILL_MIN_PERCENT) as usize;
        self.occupied_len() < min
    }

    pub fn stats(&self) -> RingBufferStats {
        RingBufferStats {
            missing_frames: self.counters.missing_frames.load(Ordering::Relaxed),
            overruns: self.counters.overruns.load(Ordering::Relaxed),
            capacity: self.capacity(),
            occupied: self.occupied_len(),
        }
    }
}

/// Consumer half (device callback)
pub struct AudioConsumer {
    consumer: ringbuf::HeapCons<AudioFrame>,
    counters: Arc<Counters>,
    audio_expected: Arc<AtomicBool>,
}

impl AudioConsumer {
    /// Fill `out` from the buffer, padding with silence
    ///
    /// Returns the number of frames actually read. Real-time safe.
    pub fn pop_into(&mut self, out: &mut [AudioFrame]) -> usize {
        let read = self.consumer.pop_slice(out);
        if read < out.len() {
            out[read..].fill(AudioFrame::zero());
            if self.audio_expected.load(Ordering::Acquire) {
                self.counters
                    .missing_frames
                    .fetch_add((out.len() - read) as u64, Ordering::Relaxed);
            }
        }
        read
    }

    /// Whether a shortfall now counts as an underrun
    pub fn audio_expected(&self) -> bool {
        self.audio_expected.load(Ordering::Acquire)
    }

    pub fn occupied_len(&self) -> usize {
        self.consumer.occupied_len()
    }
}

/// Ring buffer statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingBufferStats {
    pub missing_frames: u64,
    pub overruns: u64,
    pub capacity: usize,
    pub occupied: usize,
}

impl RingBufferStats {
    /// Fill level (0.0 to 1.0)
    pub fn fill_percent(&self) -> f32 {
        self.occupied as f32 / self.capacity.max(1) as f32
    }
}
