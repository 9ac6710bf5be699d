//! Audio callback monitor
//!
//! Counts device callbacks and underruns with atomics only, so the audio
//! thread never logs or emits events. The pipeline monitor task polls
//! [`CallbackMonitor::take_new_underruns`] and turns the deltas into
//! performance reports and `AudioUnderrun` events.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::info;

/// Lock-free callback counters
#[derive(Debug)]
pub struct CallbackMonitor {
    expected_interval: Duration,
    callback_count: AtomicU64,
    underrun_count: AtomicU64,
    /// Underruns already handed to the monitoring task
    reported_underruns: AtomicU64,
}

/// Snapshot of the callback counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallbackStats {
    pub callback_count: u64,
    pub underrun_count: u64,
    pub expected_interval_ms: u64,
}

impl CallbackMonitor {
    pub fn new(sample_rate: u32, block_frames: u32) -> Self {
        let expected_interval = Duration::from_secs_f64(block_frames as f64 / sample_rate.max(1) as f64);
        info!(
            "CallbackMonitor initialized: sample_rate={}, block={} frames, expected_interval={:.2}ms",
            sample_rate,
            block_frames,
            expected_interval.as_secs_f64() * 1_000.0
        );
        Self {
            expected_interval,
            callback_count: AtomicU64::new(0),
            underrun_count: AtomicU64::new(0),
            reported_underruns: AtomicU64::new(0),
        }
    }

    /// Record a callback invocation (real-time safe)
    pub fn record_callback(&self) {
        self.callback_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a callback that could not be filled (real-time safe)
    pub fn record_underrun(&self) {
        self.underrun_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> CallbackStats {
        CallbackStats {
            callback_count: self.callback_count.load(Ordering::Relaxed),
            underrun_count: self.underrun_count.load(Ordering::Relaxed),
            expected_interval_ms: self.expected_interval.as_millis() as u64,
        }
    }

    /// Underruns since the previous call (monitoring task only)
    pub fn take_new_underruns(&self) -> u64 {
        let total = self.underrun_count.load(Ordering::Relaxed);
        let previous = self.reported_underruns.swap(total, Ordering::Relaxed);
        total.saturating_sub(previous)
    }
}
