//! Shared playback state
//!
//! The transition manager is the only writer: it owns the non-cloneable
//! [`PlaybackPublisher`] and replaces the whole [`PlaybackSnapshot`] with a
//! pointer swap. The audio renderer holds a [`PlaybackReader`] and takes an
//! `Arc` to the current snapshot once per block, so it never observes a
//! partially updated state and never holds the lock while rendering.
//!
//! Snapshots are stamped on the renderer's timeline, which runs ahead of the
//! pipeline clock by the ring buffer fill. The render task publishes its
//! position through a [`RenderPlayhead`] after every block.

use serde::Serialize;
use sonoro_common::music::MusicSequence;
use sonoro_common::{FadeCurve, Timestamp};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Transition state visible to readers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackPhase {
    /// Steady state, one sequence (or silence before the first one)
    Idle,
    /// Waiting for, or blending towards, a new target
    Crossfading,
    /// Previous target abandoned; the frozen mix plays until the new target arrives
    Superseded,
}

impl std::fmt::Display for PlaybackPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackPhase::Idle => write!(f, "idle"),
            PlaybackPhase::Crossfading => write!(f, "crossfading"),
            PlaybackPhase::Superseded => write!(f, "superseded"),
        }
    }
}

/// A looping sequence placed on the pipeline timeline
#[derive(Debug, Clone)]
pub struct Layer {
    pub sequence: Arc<MusicSequence>,
    /// Pipeline time at which sequence offset 0 plays
    pub anchor: Timestamp,
    /// Static gain inside the outgoing mix
    pub gain: f32,
}

impl Layer {
    pub fn new(sequence: Arc<MusicSequence>, anchor: Timestamp, gain: f32) -> Self {
        Self { sequence, anchor, gain }
    }

    /// Loop position in seconds at `t`
    pub fn position_secs(&self, t: Timestamp) -> f64 {
        self.position_at(t.as_secs_f64())
    }

    /// Loop position at pipeline time `t_secs` (sample-accurate variant)
    pub fn position_at(&self, t_secs: f64) -> f64 {
        let length = self.sequence.length_secs().max(1e-3);
        (t_secs - self.anchor.as_secs_f64()).rem_euclid(length)
    }

    /// Beat phase in [0, 1) at `t`
    pub fn beat_phase(&self, t: Timestamp) -> f64 {
        let beat = self.sequence.beat_seconds();
        (self.position_secs(t) / beat).fract()
    }
}

/// Blend from the outgoing base layers to one incoming layer
#[derive(Debug, Clone)]
pub struct Blend {
    pub incoming: Layer,
    pub start: Timestamp,
    pub duration: Duration,
    pub curve: FadeCurve,
}

impl Blend {
    /// Fraction of the blend window elapsed at `t`, clamped to [0, 1]
    pub fn progress(&self, t: Timestamp) -> f32 {
        self.progress_from(t.secs_since(self.start))
    }

    /// Progress at pipeline time `t_secs` (sample-accurate variant)
    pub fn progress_at(&self, t_secs: f64) -> f32 {
        self.progress_from(t_secs - self.start.as_secs_f64())
    }

    fn progress_from(&self, elapsed: f64) -> f32 {
        if self.duration.is_zero() {
            return if elapsed >= 0.0 { 1.0 } else { 0.0 };
        }
        (elapsed / self.duration.as_secs_f64()).clamp(0.0, 1.0) as f32
    }

    /// (outgoing, incoming) weights at `t`
    pub fn weights(&self, t: Timestamp) -> (f32, f32) {
        self.curve.weights(self.progress(t))
    }

    pub fn weights_at(&self, t_secs: f64) -> (f32, f32) {
        self.curve.weights(self.progress_at(t_secs))
    }

    pub fn end(&self) -> Timestamp {
        self.start + self.duration
    }
}

/// Immutable view of what should be playing
#[derive(Debug, Clone)]
pub struct PlaybackSnapshot {
    /// Incremented on every publish
    pub version: u64,
    pub phase: PlaybackPhase,
    /// Outgoing mix (a single full-gain layer when idle)
    pub base: Vec<Layer>,
    pub blend: Option<Blend>,
}

impl PlaybackSnapshot {
    pub fn silent() -> Self {
        Self {
            version: 0,
            phase: PlaybackPhase::Idle,
            base: Vec::new(),
            blend: None,
        }
    }

    /// (outgoing, incoming) weights at `t`; (1, 0) when no blend is active
    pub fn blend_weights(&self, t: Timestamp) -> (f32, f32) {
        self.blend.as_ref().map_or((1.0, 0.0), |blend| blend.weights(t))
    }

    /// Every layer with its effective gain at `t`
    pub fn layer_weights(&self, t: Timestamp) -> Vec<(&Layer, f32)> {
        let (outgoing, incoming) = self.blend_weights(t);
        let mut layers: Vec<(&Layer, f32)> = self.base.iter().map(|layer| (layer, layer.gain * outgoing)).collect();
        if let Some(blend) = &self.blend {
            layers.push((&blend.incoming, incoming));
        }
        layers
    }

    /// Effective gain per sequence id at `t`, ordered by id
    pub fn sequence_weights(&self, t: Timestamp) -> Vec<(u64, f32)> {
        let mut weights: Vec<(u64, f32)> = Vec::new();
        for (layer, weight) in self.layer_weights(t) {
            match weights.iter_mut().find(|(id, _)| *id == layer.sequence.id) {
                Some(entry) => entry.1 += weight,
                None => weights.push((layer.sequence.id, weight)),
            }
        }
        weights.sort_by_key(|(id, _)| *id);
        weights
    }

    /// The mix at `t` flattened into static layers
    pub fn frozen_at(&self, t: Timestamp) -> Vec<Layer> {
        self.layer_weights(t)
            .into_iter()
            .map(|(layer, weight)| Layer::new(Arc::clone(&layer.sequence), layer.anchor, weight))
            .collect()
    }

    /// Sequence heard once any blend has finished
    pub fn target_sequence(&self) -> Option<&Arc<MusicSequence>> {
        match &self.blend {
            Some(blend) => Some(&blend.incoming.sequence),
            None => self
                .base
                .iter()
                .max_by(|a, b| a.gain.total_cmp(&b.gain))
                .map(|layer| &layer.sequence),
        }
    }

    pub fn is_silent(&self) -> bool {
        self.base.is_empty() && self.blend.is_none()
    }
}

/// Single writer of the playback state
///
/// Deliberately not `Clone`.
pub struct PlaybackPublisher {
    shared: Arc<RwLock<Arc<PlaybackSnapshot>>>,
    version: u64,
}

/// Read-only handle to the playback state
#[derive(Clone)]
pub struct PlaybackReader {
    shared: Arc<RwLock<Arc<PlaybackSnapshot>>>,
}

/// Create a publisher/reader pair starting from silence
pub fn playback_channel() -> (PlaybackPublisher, PlaybackReader) {
    let shared = Arc::new(RwLock::new(Arc::new(PlaybackSnapshot::silent())));
    (
        PlaybackPublisher {
            shared: Arc::clone(&shared),
            version: 0,
        },
        PlaybackReader { shared },
    )
}

impl PlaybackPublisher {
    /// Replace the visible snapshot; returns its version
    pub fn publish(&mut self, phase: PlaybackPhase, base: Vec<Layer>, blend: Option<Blend>) -> u64 {
        self.version += 1;
        let snapshot = Arc::new(PlaybackSnapshot {
            version: self.version,
            phase,
            base,
            blend,
        });
        let mut guard = self.shared.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = snapshot;
        self.version
    }

    pub fn current(&self) -> Arc<PlaybackSnapshot> {
        let guard = self.shared.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&guard)
    }

    pub fn reader(&self) -> PlaybackReader {
        PlaybackReader {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl PlaybackReader {
    pub fn snapshot(&self) -> Arc<PlaybackSnapshot> {
        let guard = self.shared.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&guard)
    }
}

/// Frames rendered so far, shared by the render task with the transition manager
#[derive(Debug, Clone)]
pub struct RenderPlayhead {
    frames: Arc<AtomicU64>,
    sample_rate: u32,
}

impl RenderPlayhead {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            frames: Arc::new(AtomicU64::new(0)),
            sample_rate: sample_rate.max(1),
        }
    }

    pub fn advance_to(&self, frames_rendered: u64) {
        self.frames.store(frames_rendered, Ordering::Release);
    }

    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }

    /// Pipeline time of the next frame the renderer will produce
    pub fn position(&self) -> Timestamp {
        Timestamp::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }
}
