//! Music generator adapter
//!
//! Wraps an external [`SequenceModel`] and guarantees the caller a usable
//! sequence within the generation deadline:
//!
//! - model error, timeout, invalid output or a style the model does not
//!   support → the stored fallback pattern for the requested style, logged and
//!   announced on the event bus
//! - cancellation (a newer request superseded this one) → no result at all
//!
//! Requested length scales with the adaptive-quality sequence factor and is
//! capped by configuration.

use crate::config::GeneratorConfig;
use crate::music::fallback::FallbackLibrary;
use async_trait::async_trait;
use serde::Serialize;
use sonoro_common::events::{EventBus, SonoroEvent};
use sonoro_common::music::{InstrumentFamily, MusicEvent, MusicSequence, MusicStyle, MusicalParameters, SequenceSource};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Lowest pitch accepted from a model (A0)
pub const MIN_PITCH: u8 = 21;
/// Highest pitch accepted from a model (C8)
pub const MAX_PITCH: u8 = 108;

/// Smoothing weight of a new latency observation
const LATENCY_EWMA_ALPHA: f64 = 0.3;

/// Context from the currently playing music
#[derive(Debug, Clone, Default)]
pub struct SeedContext {
    /// Sequence that will be blended out
    pub previous: Option<Arc<MusicSequence>>,
}

impl SeedContext {
    pub fn from_previous(previous: Option<Arc<MusicSequence>>) -> Self {
        Self { previous }
    }

    /// Last melodic pitch of the previous sequence
    pub fn last_pitch(&self) -> Option<u8> {
        self.previous
            .as_ref()
            .and_then(|sequence| sequence.events().iter().max_by_key(|e| (e.start_offset, e.pitch)))
            .map(|e| e.pitch)
    }
}

/// Everything a model needs for one generation
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub parameters: MusicalParameters,
    pub bars: u32,
    /// Sequence duration; no event may end after it
    pub length: Duration,
    pub seed: u64,
    pub seed_context: SeedContext,
}

/// External generative sequence model
#[async_trait]
pub trait SequenceModel: Send + Sync {
    fn name(&self) -> &str;

    /// Produce note events for `request`; offsets are relative to sequence start
    async fn generate(&self, request: &GenerationRequest) -> anyhow::Result<Vec<MusicEvent>>;

    fn supported_styles(&self) -> Vec<MusicStyle> {
        MusicStyle::all().to_vec()
    }

    fn supported_instruments(&self) -> Vec<InstrumentFamily> {
        InstrumentFamily::all().to_vec()
    }
}

/// Why the fallback sequence was used
#[derive(Debug, Clone, PartialEq)]
pub enum FallbackReason {
    ModelError(String),
    Timeout(Duration),
    InvalidOutput(String),
    UnsupportedStyle(MusicStyle),
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackReason::ModelError(e) => write!(f, "model error: {}", e),
            FallbackReason::Timeout(deadline) => write!(f, "deadline of {}ms exceeded", deadline.as_millis()),
            FallbackReason::InvalidOutput(why) => write!(f, "invalid output: {}", why),
            FallbackReason::UnsupportedStyle(style) => write!(f, "model does not support {} style", style),
        }
    }
}

/// Outcome of one generation
#[derive(Debug, Clone)]
pub struct GeneratedSequence {
    pub sequence: Arc<MusicSequence>,
    /// Set when the fallback was used
    pub fallback: Option<FallbackReason>,
    pub elapsed: Duration,
}

impl GeneratedSequence {
    pub fn is_fallback(&self) -> bool {
        self.fallback.is_some()
    }
}

/// Generator counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GeneratorStats {
    pub invocations: u64,
    pub fallbacks: u64,
    pub cancelled: u64,
}

/// Deadline-bounded adapter around a [`SequenceModel`]
pub struct GeneratorAdapter {
    model: Arc<dyn SequenceModel>,
    fallback: FallbackLibrary,
    deadline: Duration,
    bars: u32,
    max_length: Duration,
    base_seed: u64,
    events: Option<EventBus>,
    invocations: AtomicU64,
    fallbacks: AtomicU64,
    cancelled: AtomicU64,
    /// EWMA of successful model latency in microseconds, 0 = unknown
    latency_estimate_us: AtomicU64,
}

impl GeneratorAdapter {
    pub fn new(model: Arc<dyn SequenceModel>, config: &GeneratorConfig) -> Self {
        info!(
            "Generator adapter using model '{}' (deadline {}ms, {} bars, max {:.1}s)",
            model.name(),
            config.deadline_ms,
            config.bars,
            config.max_sequence_secs
        );
        Self {
            model,
            fallback: FallbackLibrary::new(),
            deadline: config.deadline(),
            bars: config.bars.max(1),
            max_length: config.max_sequence_length(),
            base_seed: config.seed,
            events: None,
            invocations: AtomicU64::new(0),
            fallbacks: AtomicU64::new(0),
            cancelled: AtomicU64::new(0),
            latency_estimate_us: AtomicU64::new(0),
        }
    }

    /// Announce fallbacks on `events`
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// Styles the model generates itself; every other style plays its fallback pattern
    pub fn supported_styles(&self) -> Vec<MusicStyle> {
        self.model.supported_styles()
    }

    pub fn supported_instruments(&self) -> Vec<InstrumentFamily> {
        self.model.supported_instruments()
    }

    pub fn stats(&self) -> GeneratorStats {
        GeneratorStats {
            invocations: self.invocations.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
        }
    }

    /// Build the request for `params` at the given quality sequence factor
    pub fn build_request(&self, params: &MusicalParameters, seed_context: SeedContext, sequence_scale: f32) -> GenerationRequest {
        let scale = if sequence_scale.is_finite() { sequence_scale.clamp(0.1, 1.0) } else { 1.0 };
        let bars = ((self.bars as f32 * scale).round() as u32).max(1);
        let bar_secs = params.beat_seconds() * params.time_signature.numerator.max(1) as f64;
        let length = Duration::from_secs_f64(bars as f64 * bar_secs).min(self.max_length);

        GenerationRequest {
            parameters: params.clone(),
            bars,
            length,
            seed: self.seed_for(params),
            seed_context,
        }
    }

    /// Deterministic seed per parameter set
    fn seed_for(&self, params: &MusicalParameters) -> u64 {
        let mut seed = self.base_seed ^ 0x9E37_79B9_7F4A_7C15;
        let parts = [
            params.tempo_bpm.to_bits() as u64,
            params.key.tonic.semitone() as u64,
            params.key.mode as u64,
            params.style as u64,
            params.source_track.map_or(0, |t| t.0),
        ];
        for part in parts {
            seed = (seed ^ part).wrapping_mul(0x0100_0000_01B3).rotate_left(23);
        }
        seed
    }

    /// Generate a sequence for `params`
    ///
    /// # Returns
    /// `None` only when `cancel` fired first; otherwise the model output or
    /// the fallback sequence.
    pub async fn generate(
        &self,
        params: &MusicalParameters,
        seed_context: SeedContext,
        sequence_scale: f32,
        cancel: &CancellationToken,
    ) -> Option<GeneratedSequence> {
        let request = self.build_request(params, seed_context, sequence_scale);
        self.invocations.fetch_add(1, Ordering::Relaxed);
        let started = tokio::time::Instant::now();

        if !self.model.supported_styles().contains(&params.style) {
            return Some(self.fallback_for(params, FallbackReason::UnsupportedStyle(params.style), Duration::ZERO));
        }

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                self.cancelled.fetch_add(1, Ordering::Relaxed);
                debug!("Generation for {} cancelled", params);
                return None;
            }
            result = tokio::time::timeout(self.deadline, self.model.generate(&request)) => result,
        };
        let elapsed = started.elapsed();

        let failure = match outcome {
            Ok(Ok(events)) => match self.validate(&request, events) {
                Ok(sequence) => {
                    self.observe_latency(elapsed);
                    debug!("Generated {} events for {} in {:?}", sequence.events().len(), params, elapsed);
                    return Some(GeneratedSequence {
                        sequence: Arc::new(sequence),
                        fallback: None,
                        elapsed,
                    });
                }
                Err(why) => FallbackReason::InvalidOutput(why),
            },
            Ok(Err(e)) => FallbackReason::ModelError(format!("{:#}", e)),
            Err(_) => FallbackReason::Timeout(self.deadline),
        };

        Some(self.fallback_for(&request.parameters, failure, elapsed))
    }

    /// Fallback sequence for `params` without consulting the model
    pub fn fallback_sequence(&self, params: &MusicalParameters) -> Arc<MusicSequence> {
        self.fallback.sequence_for(params, self.max_length)
    }

    /// Fallback result, counted and announced
    pub fn fallback_for(&self, params: &MusicalParameters, reason: FallbackReason, elapsed: Duration) -> GeneratedSequence {
        self.fallbacks.fetch_add(1, Ordering::Relaxed);
        warn!("Generator fallback for {} style: {}", params.style, reason);
        if let Some(events) = &self.events {
            events.emit_lossy(SonoroEvent::GeneratorFallback {
                style: params.style,
                reason: reason.to_string(),
                timestamp: sonoro_common::time::now(),
            });
        }
        GeneratedSequence {
            sequence: self.fallback_sequence(params),
            fallback: Some(reason),
            elapsed,
        }
    }

    fn validate(&self, request: &GenerationRequest, events: Vec<MusicEvent>) -> Result<MusicSequence, String> {
        if events.is_empty() {
            return Err("no events".to_string());
        }
        let tolerance = Duration::from_millis(1);
        for event in &events {
            if !(MIN_PITCH..=MAX_PITCH).contains(&event.pitch) {
                return Err(format!("pitch {} out of range", event.pitch));
            }
            if event.duration.is_zero() {
                return Err("zero-length note".to_string());
            }
            if event.start_offset + event.duration > request.length + tolerance {
                return Err(format!(
                    "event ends at {:.3}s beyond sequence length {:.3}s",
                    event.end_secs(),
                    request.length.as_secs_f64()
                ));
            }
        }

        let params = &request.parameters;
        Ok(MusicSequence::new(
            params.style,
            params.tempo_bpm,
            params.time_signature.numerator,
            request.length,
            params.brightness,
            SequenceSource::Model,
            events,
        ))
    }

    fn observe_latency(&self, elapsed: Duration) {
        let observed = elapsed.as_micros() as f64;
        let previous = self.latency_estimate_us.load(Ordering::Relaxed);
        let estimate = if previous == 0 {
            observed
        } else {
            previous as f64 + (observed - previous as f64) * LATENCY_EWMA_ALPHA
        };
        self.latency_estimate_us.store(estimate.max(1.0) as u64, Ordering::Relaxed);
    }

    /// Expected generation time at the given quality sequence factor
    ///
    /// Based on observed model latency scaled by requested bars; a quarter of
    /// the deadline before anything was observed. Never above the deadline.
    pub fn estimate_generation_time(&self, sequence_scale: f32) -> Duration {
        let observed = self.latency_estimate_us.load(Ordering::Relaxed);
        if observed == 0 {
            return self.deadline / 4;
        }
        let scale = if sequence_scale.is_finite() { sequence_scale.clamp(0.1, 1.0) } else { 1.0 };
        let bars = ((self.bars as f32 * scale).round() as u32).max(1);
        let factor = bars as f64 / self.bars as f64;
        Duration::from_micros((observed as f64 * factor) as u64).min(self.deadline)
    }
}
