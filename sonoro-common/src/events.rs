//! Event types and EventBus
//!
//! Pipeline stages announce noteworthy state changes (track lifecycle,
//! parameter changes, transitions, quality adjustments, health problems) on a
//! shared `EventBus`. Events are serde-tagged so they can be written out as
//! JSON lines by the command-line runner or forwarded to any UI.
//!
//! The real-time audio path never emits events directly; it only bumps
//! counters that a monitoring task turns into events.

use crate::music::{MusicStyle, MusicalParameters, SequenceSource};
use crate::vision::TrackId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Sonoro event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SonoroEvent {
    /// Track promoted from Tentative to Confirmed
    TrackConfirmed {
        track_id: TrackId,
        label: String,
        timestamp: DateTime<Utc>,
    },

    /// Track missed for the loss timeout
    TrackLost {
        track_id: TrackId,
        label: String,
        timestamp: DateTime<Utc>,
    },

    /// Lost track garbage-collected after its grace period
    TrackRemoved {
        track_id: TrackId,
        timestamp: DateTime<Utc>,
    },

    /// Mapper emitted a new active parameter set
    ParametersChanged {
        parameters: MusicalParameters,
        /// Distance from the previously active set (None for the first set)
        distance: Option<f32>,
        timestamp: DateTime<Utc>,
    },

    /// Blend towards a new sequence started
    TransitionStarted {
        sequence_id: u64,
        source: SequenceSource,
        blend_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// Newer parameters arrived before the running transition finished
    TransitionSuperseded {
        /// Generation request that was abandoned
        abandoned_request: u64,
        timestamp: DateTime<Utc>,
    },

    /// Blend finished; the sequence is now the sole active playback
    TransitionCompleted {
        sequence_id: u64,
        timestamp: DateTime<Utc>,
    },

    /// Generator failed, timed out or produced unusable output
    GeneratorFallback {
        style: MusicStyle,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// Adaptive quality level changed
    QualityChanged {
        old_level: u8,
        new_level: u8,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// Audio output found its buffer empty during active playback
    AudioUnderrun {
        underrun_count: u64,
        timestamp: DateTime<Utc>,
    },

    /// Detector health flipped (repeated failures or recovery)
    DetectorHealthChanged {
        healthy: bool,
        consecutive_failures: u32,
        timestamp: DateTime<Utc>,
    },
}

impl SonoroEvent {
    /// Event type name used for logging and JSON output
    pub fn event_type(&self) -> &'static str {
        match self {
            SonoroEvent::TrackConfirmed { .. } => "TrackConfirmed",
            SonoroEvent::TrackLost { .. } => "TrackLost",
            SonoroEvent::TrackRemoved { .. } => "TrackRemoved",
            SonoroEvent::ParametersChanged { .. } => "ParametersChanged",
            SonoroEvent::TransitionStarted { .. } => "TransitionStarted",
            SonoroEvent::TransitionSuperseded { .. } => "TransitionSuperseded",
            SonoroEvent::TransitionCompleted { .. } => "TransitionCompleted",
            SonoroEvent::GeneratorFallback { .. } => "GeneratorFallback",
            SonoroEvent::QualityChanged { .. } => "QualityChanged",
            SonoroEvent::AudioUnderrun { .. } => "AudioUnderrun",
            SonoroEvent::DetectorHealthChanged { .. } => "DetectorHealthChanged",
        }
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus
///
/// Uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use sonoro_common::events::{EventBus, SonoroEvent};
/// use sonoro_common::vision::TrackId;
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(SonoroEvent::TrackRemoved {
///     track_id: TrackId(7),
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert!(matches!(rx.try_recv(), Ok(SonoroEvent::TrackRemoved { .. })));
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SonoroEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// * `capacity` - Number of events buffered per subscriber before the
    ///   oldest are dropped for that subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, capacity: capacity.max(1) }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<SonoroEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists,
    /// `Err` (carrying the event back) if nobody is listening.
    pub fn emit(&self, event: SonoroEvent) -> Result<usize, broadcast::error::SendError<SonoroEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring the no-subscriber case
    pub fn emit_lossy(&self, event: SonoroEvent) {
        let _ = self.tx.send(event);
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

// ========================================
// Tests
// ========================================
