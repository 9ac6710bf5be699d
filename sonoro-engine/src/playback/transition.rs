//! Transition manager
//!
//! Owns the playback state (single writer) and moves it between sequences:
//!
//! ```text
//!   Idle ──new params──▶ Crossfading ──blend elapsed──▶ Idle
//!                          │     ▲
//!               new params │     │ target adopted
//!                          ▼     │
//!                        Superseded
//! ```
//!
//! A parameter change starts a generation task and keeps the current mix
//! playing. The blend window opens when the generated (or fallback) sequence
//! is adopted; the generation deadline plus a grace period bounds the wait.
//! A change arriving mid-transition cancels the pending generation and freezes
//! whatever is audible at that instant into the outgoing side, so the next
//! blend starts exactly where the previous one was interrupted.
//!
//! "That instant" is the renderer's next frame. With a [`RenderPlayhead`]
//! attached, freezes, blend starts and blend completion are all evaluated on
//! the render timeline; scheduler time only drives generation deadlines.

use crate::config::{TransitionConfig, TransitionMode};
use crate::music::generator::{FallbackReason, GeneratedSequence, GeneratorAdapter, SeedContext};
use crate::playback::state::{
    Blend, Layer, PlaybackPhase, PlaybackPublisher, PlaybackReader, PlaybackSnapshot, RenderPlayhead,
};
use serde::Serialize;
use sonoro_common::events::{EventBus, SonoroEvent};
use sonoro_common::music::{MusicSequence, MusicalParameters};
use sonoro_common::Timestamp;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Layers below this gain are dropped when a mix is frozen
const MIN_LAYER_GAIN: f32 = 1e-4;
/// Upper bound on layers kept in a frozen mix
const MAX_FROZEN_LAYERS: usize = 4;

/// Transition counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransitionStats {
    pub requests: u64,
    pub started: u64,
    pub completed: u64,
    pub superseded: u64,
    pub fallbacks: u64,
}

struct PendingGeneration {
    request_id: u64,
    parameters: MusicalParameters,
    cancel: CancellationToken,
    result: oneshot::Receiver<Option<GeneratedSequence>>,
    requested_at: Timestamp,
    give_up_at: Timestamp,
}

/// Sole writer of the playback state
pub struct TransitionManager {
    generator: Arc<GeneratorAdapter>,
    publisher: PlaybackPublisher,
    events: EventBus,
    config: TransitionConfig,
    mode: TransitionMode,
    playhead: Option<RenderPlayhead>,

    phase: PlaybackPhase,
    base: Vec<Layer>,
    blend: Option<Blend>,
    /// Request id and parameters of the sequence being blended in
    blend_target: Option<(u64, MusicalParameters)>,
    pending: Option<PendingGeneration>,
    active: Option<MusicalParameters>,

    sequence_scale: f32,
    next_request: u64,
    stats: TransitionStats,
}

impl TransitionManager {
    pub fn new(
        generator: Arc<GeneratorAdapter>,
        publisher: PlaybackPublisher,
        config: &TransitionConfig,
        events: EventBus,
    ) -> Self {
        Self {
            generator,
            publisher,
            events,
            config: config.clone(),
            mode: config.mode,
            playhead: None,
            phase: PlaybackPhase::Idle,
            base: Vec::new(),
            blend: None,
            blend_target: None,
            pending: None,
            active: None,
            sequence_scale: 1.0,
            next_request: 1,
            stats: TransitionStats::default(),
        }
    }

    /// Stamp snapshots on the renderer's timeline instead of scheduler time
    pub fn with_playhead(mut self, playhead: RenderPlayhead) -> Self {
        self.playhead = Some(playhead);
        self
    }

    pub fn phase(&self) -> PlaybackPhase {
        self.phase
    }

    pub fn mode(&self) -> TransitionMode {
        self.mode
    }

    /// Applies from the next adopted sequence; a running blend keeps its shape
    pub fn set_mode(&mut self, mode: TransitionMode) {
        if mode != self.mode {
            info!("Transition mode {} -> {}", self.mode, mode);
            self.mode = mode;
        }
    }

    /// Parameters of the sequence playing alone after the last completed blend
    pub fn active_parameters(&self) -> Option<&MusicalParameters> {
        self.active.as_ref()
    }

    /// Parameters being generated or blended in
    pub fn target_parameters(&self) -> Option<&MusicalParameters> {
        self.pending
            .as_ref()
            .map(|p| &p.parameters)
            .or(self.blend_target.as_ref().map(|(_, params)| params))
    }

    pub fn has_pending_generation(&self) -> bool {
        self.pending.is_some()
    }

    pub fn stats(&self) -> TransitionStats {
        self.stats
    }

    pub fn reader(&self) -> PlaybackReader {
        self.publisher.reader()
    }

    pub fn snapshot(&self) -> Arc<PlaybackSnapshot> {
        self.publisher.current()
    }

    /// Sequence length factor applied to subsequent generations
    pub fn set_sequence_scale(&mut self, scale: f32) {
        self.sequence_scale = scale;
    }

    /// Time at which the renderer produces its next frame
    fn render_time(&self, now: Timestamp) -> Timestamp {
        self.playhead.as_ref().map_or(now, RenderPlayhead::position)
    }

    /// Start a transition towards `parameters`
    ///
    /// Returns the request id.
    pub fn request(&mut self, parameters: MusicalParameters, now: Timestamp) -> u64 {
        let request_id = self.next_request;
        self.next_request += 1;
        self.stats.requests += 1;

        let superseding = self.phase != PlaybackPhase::Idle;
        if superseding {
            let abandoned = self
                .pending
                .as_ref()
                .map(|p| p.request_id)
                .or(self.blend_target.as_ref().map(|(id, _)| *id))
                .unwrap_or(0);
            self.abandon_pending();

            let at = self.render_time(now);
            self.base = freeze(&self.publisher.current(), at);
            self.blend = None;
            self.blend_target = None;
            self.stats.superseded += 1;

            info!("Transition request {} superseded by {} at {}", abandoned, request_id, at);
            self.events.emit_lossy(SonoroEvent::TransitionSuperseded {
                abandoned_request: abandoned,
                timestamp: sonoro_common::time::now(),
            });
            self.phase = PlaybackPhase::Superseded;
        } else {
            self.phase = PlaybackPhase::Crossfading;
        }

        let seed_context = SeedContext::from_previous(
            self.base
                .iter()
                .max_by(|a, b| a.gain.total_cmp(&b.gain))
                .map(|layer| Arc::clone(&layer.sequence)),
        );

        let (tx, rx) = oneshot::channel();
        let cancel = CancellationToken::new();
        let generator = Arc::clone(&self.generator);
        let token = cancel.clone();
        let params = parameters.clone();
        let scale = self.sequence_scale;
        tokio::spawn(async move {
            let result = generator.generate(&params, seed_context, scale, &token).await;
            let _ = tx.send(result);
        });

        debug!("Transition request {} for {}", request_id, parameters);
        self.pending = Some(PendingGeneration {
            request_id,
            parameters,
            cancel,
            result: rx,
            requested_at: now,
            give_up_at: now + self.generator.deadline() + self.config.deadline_grace(),
        });
        self.publish();
        request_id
    }

    /// Advance the state machine to `now`
    ///
    /// Returns true when the published snapshot changed.
    pub fn tick(&mut self, now: Timestamp) -> bool {
        let mut changed = false;

        if let Some(mut pending) = self.pending.take() {
            match pending.result.try_recv() {
                Ok(Some(generated)) => {
                    self.adopt(pending, generated, now);
                    changed = true;
                }
                Err(TryRecvError::Empty) if now < pending.give_up_at => {
                    self.pending = Some(pending);
                }
                Err(TryRecvError::Empty) => {
                    pending.cancel.cancel();
                    let generated = self.generator.fallback_for(
                        &pending.parameters,
                        FallbackReason::Timeout(self.generator.deadline()),
                        now.saturating_since(pending.requested_at),
                    );
                    self.adopt(pending, generated, now);
                    changed = true;
                }
                Ok(None) | Err(TryRecvError::Closed) => {
                    warn!("Generation task for request {} ended without a result", pending.request_id);
                    let generated = self.generator.fallback_for(
                        &pending.parameters,
                        FallbackReason::ModelError("generation task ended without a result".to_string()),
                        now.saturating_since(pending.requested_at),
                    );
                    self.adopt(pending, generated, now);
                    changed = true;
                }
            }
        }

        let render_time = self.render_time(now);
        if self.blend.as_ref().is_some_and(|blend| render_time >= blend.end()) {
            self.complete(render_time);
            changed = true;
        }

        changed
    }

    fn adopt(&mut self, pending: PendingGeneration, generated: GeneratedSequence, now: Timestamp) {
        if generated.is_fallback() {
            self.stats.fallbacks += 1;
        }
        let sequence = generated.sequence;
        let start = self.render_time(now);
        let anchor = self.aligned_anchor(&sequence, start);
        let (duration, curve) = self.config.blend_for(self.mode);

        info!(
            "Blending to sequence {} ({:?}, {:.0} BPM) over {}ms, {} {}",
            sequence.id,
            sequence.source,
            sequence.tempo_bpm,
            duration.as_millis(),
            self.mode,
            curve.display_name()
        );
        self.events.emit_lossy(SonoroEvent::TransitionStarted {
            sequence_id: sequence.id,
            source: sequence.source,
            blend_ms: duration.as_millis() as u64,
            timestamp: sonoro_common::time::now(),
        });

        self.blend = Some(Blend {
            incoming: Layer::new(sequence, anchor, 1.0),
            start,
            duration,
            curve,
        });
        self.blend_target = Some((pending.request_id, pending.parameters));
        self.phase = PlaybackPhase::Crossfading;
        self.stats.started += 1;
        self.publish();
    }

    fn complete(&mut self, now: Timestamp) {
        let Some(blend) = self.blend.take() else {
            return;
        };
        let sequence_id = blend.incoming.sequence.id;
        self.base = vec![Layer::new(blend.incoming.sequence, blend.incoming.anchor, 1.0)];
        if let Some((_, parameters)) = self.blend_target.take() {
            self.active = Some(parameters);
        }
        self.phase = PlaybackPhase::Idle;
        self.stats.completed += 1;

        info!("Transition to sequence {} completed at {}", sequence_id, now);
        self.events.emit_lossy(SonoroEvent::TransitionCompleted {
            sequence_id,
            timestamp: sonoro_common::time::now(),
        });
        self.publish();
    }

    /// Anchor that puts `sequence` at the beat phase of the loudest outgoing layer
    fn aligned_anchor(&self, sequence: &MusicSequence, now: Timestamp) -> Timestamp {
        if !self.config.beat_align {
            return now;
        }
        match self.base.iter().max_by(|a, b| a.gain.total_cmp(&b.gain)) {
            Some(reference) => {
                let offset = reference.beat_phase(now) * sequence.beat_seconds();
                now.saturating_sub(Duration::from_secs_f64(offset))
            }
            None => now,
        }
    }

    fn abandon_pending(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.cancel.cancel();
            debug!("Cancelled generation for request {}", pending.request_id);
        }
    }

    fn publish(&mut self) {
        self.publisher.publish(self.phase, self.base.clone(), self.blend.clone());
    }
}

impl Drop for TransitionManager {
    fn drop(&mut self) {
        self.abandon_pending();
    }
}

/// Audible mix at `at` as static layers, pruned and capped
///
/// Whenever a layer is dropped the remaining gains are rescaled to the
/// audible total, so the frozen mix is never quieter than what was playing.
fn freeze(snapshot: &PlaybackSnapshot, at: Timestamp) -> Vec<Layer> {
    let audible = snapshot.frozen_at(at);
    let audible_count = audible.len();
    let audible_total: f32 = audible.iter().map(|layer| layer.gain).sum();
    let mut layers: Vec<Layer> = audible.into_iter().filter(|layer| layer.gain >= MIN_LAYER_GAIN).collect();

    if layers.len() > MAX_FROZEN_LAYERS {
        layers.sort_by(|a, b| b.gain.total_cmp(&a.gain));
        layers.truncate(MAX_FROZEN_LAYERS);
    }

    if layers.len() < audible_count {
        let kept: f32 = layers.iter().map(|layer| layer.gain).sum();
        if kept > 0.0 {
            for layer in &mut layers {
                layer.gain *= audible_total / kept;
            }
        }
        debug!("Froze {} of {} audible layers", layers.len(), audible_count);
    }
    layers
}
