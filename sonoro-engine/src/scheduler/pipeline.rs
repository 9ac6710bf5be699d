//! Pipeline scheduler
//!
//! Runs every stage as its own tokio task, connected by bounded queues:
//!
//! ```text
//! capture --frames--> perception --parameters--> transition ==snapshot==> render --ring--> output
//!    \__________________\________________________________________________________\
//!                                 metrics (mpsc) --> monitor --> quality (watch)
//! ```
//!
//! - capture: paced by the frame period, applies the quality frame stride
//! - perception: detector, tracker, feature extractor and mapper, in capture order
//! - transition: owns the [`TransitionManager`], the only playback writer
//! - render: keeps the ring buffer above its fill target
//! - monitor: closes a metrics window per interval and runs the quality controller
//!
//! The audio output only touches the ring buffer, so detector or generator
//! stalls never reach the device.
//!
//! The render task publishes its position through a [`RenderPlayhead`], which
//! the transition manager stamps blends and freezes against. Runtime controls
//! (transition mode, volume, mapping weights) travel to the owning task over
//! watch channels.

use crate::audio::callback_monitor::CallbackMonitor;
use crate::audio::output::AudioOutput;
use crate::audio::renderer::SequenceRenderer;
use crate::audio::ring_buffer::{AudioProducer, AudioRingBuffer};
use crate::audio::types::AudioFrame;
use crate::clock::PipelineClock;
use crate::config::{PipelineConfig, TransitionMode};
use crate::error::{Error, Result};
use crate::music::generator::{GeneratorAdapter, GeneratorStats, SequenceModel};
use crate::playback::state::{playback_channel, PlaybackPhase, PlaybackReader, RenderPlayhead};
use crate::playback::transition::{TransitionManager, TransitionStats};
use crate::scheduler::monitor::{metrics_channel, MetricsSink, MetricsWindow, PerformanceReport, Stage, StageMetric};
use crate::scheduler::quality::{AdaptiveQualityController, QualitySettings};
use crate::scheduler::queue::{PushOutcome, StageQueue};
use crate::semantic::features::{FeatureExtractor, ObjectContext};
use crate::semantic::mapper::{
    DefaultMapping, MappingDecision, MappingStrategy, MappingWeights, MusicalHistory, ParameterMapper,
};
use crate::source::FrameSource;
use crate::vision::detector::{DetectorAdapter, ObjectDetector};
use crate::vision::tracker::{ObjectTracker, TrackTransition};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sonoro_common::events::{EventBus, SonoroEvent};
use sonoro_common::music::{MusicStyle, MusicalParameters};
use sonoro_common::time;
use sonoro_common::vision::{Detection, Frame};
use sonoro_common::Timestamp;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const METRICS_CHANNEL_CAPACITY: usize = 4_096;

/// External collaborators plugged into the pipeline
pub struct PipelineComponents {
    pub source: Box<dyn FrameSource>,
    pub detector: Arc<dyn ObjectDetector>,
    pub model: Arc<dyn SequenceModel>,
    pub strategy: Arc<dyn MappingStrategy>,
    pub extractor: FeatureExtractor,
    pub output: Box<dyn AudioOutput>,
}

impl PipelineComponents {
    /// Components with the built-in mapping strategy and label table
    pub fn new(
        source: Box<dyn FrameSource>,
        detector: Arc<dyn ObjectDetector>,
        model: Arc<dyn SequenceModel>,
        output: Box<dyn AudioOutput>,
    ) -> Self {
        Self {
            source,
            detector,
            model,
            strategy: Arc::new(DefaultMapping),
            extractor: FeatureExtractor::new(),
            output,
        }
    }

    pub fn with_strategy(mut self, strategy: Arc<dyn MappingStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_extractor(mut self, extractor: FeatureExtractor) -> Self {
        self.extractor = extractor;
        self
    }
}

/// Transition state published by the transition task
#[derive(Debug, Clone, Serialize)]
pub struct TransitionStatus {
    pub phase: PlaybackPhase,
    pub mode: TransitionMode,
    /// A generation request is in flight
    pub generating: bool,
    pub active: Option<MusicalParameters>,
    pub target: Option<MusicalParameters>,
    pub stats: TransitionStats,
}

impl TransitionStatus {
    fn of(manager: &TransitionManager) -> Self {
        Self {
            phase: manager.phase(),
            mode: manager.mode(),
            generating: manager.has_pending_generation(),
            active: manager.active_parameters().cloned(),
            target: manager.target_parameters().cloned(),
            stats: manager.stats(),
        }
    }
}

/// Counters written by the stage tasks
#[derive(Debug, Default)]
struct StageCounters {
    frames_captured: AtomicU64,
    frames_skipped: AtomicU64,
    frames_processed: AtomicU64,
    parameter_changes: AtomicU64,
    detector_failures: AtomicU64,
    active_tracks: AtomicUsize,
    frames_rendered: AtomicU64,
    ring_overruns: AtomicU64,
}

/// Summary of a running (or finished) pipeline
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingStats {
    /// Wall-clock start of the run
    pub started_at: DateTime<Utc>,
    pub uptime_ms: u64,
    pub quality_level: u8,
    pub frames_captured: u64,
    /// Frames skipped by the quality frame stride
    pub frames_skipped: u64,
    /// Frames evicted from the frame queue
    pub frames_dropped: u64,
    pub frames_processed: u64,
    pub parameter_changes: u64,
    pub detector_failures: u64,
    pub active_tracks: usize,
    pub playback_phase: PlaybackPhase,
    pub transitions: TransitionStats,
    pub generator: GeneratorStats,
    pub audio_callbacks: u64,
    pub audio_underruns: u64,
    pub frames_rendered: u64,
    pub ring_overruns: u64,
    pub metrics_discarded: u64,
    pub last_report: Option<PerformanceReport>,
}

/// A running pipeline
pub struct Pipeline {
    clock: PipelineClock,
    started_at: DateTime<Utc>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    output: Box<dyn AudioOutput>,
    events: EventBus,
    generator: Arc<GeneratorAdapter>,
    playback: PlaybackReader,
    quality: watch::Receiver<QualitySettings>,
    transition: watch::Receiver<TransitionStatus>,
    reports: watch::Receiver<Option<PerformanceReport>>,
    mode: watch::Sender<TransitionMode>,
    volume: watch::Sender<f32>,
    weights: watch::Sender<MappingWeights>,
    playhead: RenderPlayhead,
    callback_monitor: Arc<CallbackMonitor>,
    frame_queue: StageQueue<Frame>,
    parameter_queue: StageQueue<MusicalParameters>,
    counters: Arc<StageCounters>,
    metrics: MetricsSink,
}

impl Pipeline {
    /// Validate `config`, start the audio output and spawn every stage task
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(config: PipelineConfig, components: PipelineComponents, events: EventBus) -> Result<Pipeline> {
        config.validate()?;
        let PipelineComponents {
            source,
            detector,
            model,
            strategy,
            mut extractor,
            mut output,
        } = components;

        if let Some(path) = &config.mapper.custom_mappings {
            let added = extractor.load_custom_mappings(path)?;
            info!("Loaded {} custom label mappings from {}", added, path.display());
        }

        let clock = PipelineClock::start();
        let started_at = time::now();
        let cancel = CancellationToken::new();
        let counters = Arc::new(StageCounters::default());
        let (metrics, metrics_rx) = metrics_channel(METRICS_CHANNEL_CAPACITY);
        let (quality_tx, quality_rx) = watch::channel(QualitySettings::default());
        let (reports_tx, reports_rx) = watch::channel(None);
        let (mode_tx, mode_rx) = watch::channel(config.transition.mode);
        let (volume_tx, volume_rx) = watch::channel(config.audio.master_gain);
        let (weights_tx, weights_rx) = watch::channel(config.mapper.weights);

        let frame_queue = StageQueue::new("frames", config.scheduler.frame_queue.capacity, config.scheduler.frame_queue.policy);
        let parameter_queue = StageQueue::new(
            "parameters",
            config.scheduler.parameter_queue.capacity,
            config.scheduler.parameter_queue.policy,
        );

        // Audio first: the device drains silence until the first sequence arrives
        let (producer, consumer) = AudioRingBuffer::new(config.audio.ring_capacity_frames).split();
        let callback_monitor = Arc::new(CallbackMonitor::new(config.audio.sample_rate, config.audio.block_frames as u32));
        output.start(consumer, Arc::clone(&callback_monitor))?;
        info!("Audio output '{}' started", output.name());

        let generator = Arc::new(GeneratorAdapter::new(model, &config.generator).with_events(events.clone()));
        let supported = generator.supported_styles();
        if supported.len() < MusicStyle::all().len() {
            info!(
                "Model '{}' generates {} of {} styles; the rest play fallback patterns",
                generator.model_name(),
                supported.len(),
                MusicStyle::all().len()
            );
        }

        let playhead = RenderPlayhead::new(config.audio.sample_rate);
        let (publisher, playback) = playback_channel();
        let manager = TransitionManager::new(Arc::clone(&generator), publisher, &config.transition, events.clone())
            .with_playhead(playhead.clone());
        let (transition_tx, transition_rx) = watch::channel(TransitionStatus::of(&manager));

        let perception = PerceptionStage {
            detector: DetectorAdapter::new(detector, config.detector.unhealthy_after_failures),
            tracker: ObjectTracker::new(config.tracker.clone()),
            extractor,
            mapper: ParameterMapper::new(strategy, &config.mapper),
            history: MusicalHistory::new(config.mapper.history_length),
        };
        let strategy_name = perception.mapper.strategy_name().to_string();

        let mut tasks = Vec::with_capacity(5);
        tasks.push(tokio::spawn(run_capture(
            source,
            frame_queue.clone(),
            clock,
            quality_rx.clone(),
            metrics.clone(),
            Arc::clone(&counters),
            config.capture.frame_period(),
            cancel.clone(),
        )));
        tasks.push(tokio::spawn(run_perception(
            perception,
            frame_queue.clone(),
            parameter_queue.clone(),
            clock,
            quality_rx.clone(),
            metrics.clone(),
            events.clone(),
            Arc::clone(&counters),
            weights_rx,
            cancel.clone(),
        )));
        tasks.push(tokio::spawn(run_transitions(
            manager,
            parameter_queue.clone(),
            clock,
            quality_rx.clone(),
            mode_rx,
            transition_tx,
            config.transition.tick_period(),
            cancel.clone(),
        )));
        tasks.push(tokio::spawn(run_render(
            SequenceRenderer::new(config.audio.sample_rate, config.audio.master_gain),
            producer,
            playback.clone(),
            playhead.clone(),
            quality_rx.clone(),
            volume_rx,
            metrics.clone(),
            Arc::clone(&counters),
            config.audio.block_frames,
            config.audio.block_period(),
            cancel.clone(),
        )));
        tasks.push(tokio::spawn(run_monitor(
            metrics_rx,
            AdaptiveQualityController::new(&config.scheduler),
            Arc::clone(&callback_monitor),
            clock,
            quality_tx,
            reports_tx,
            events.clone(),
            config.scheduler.monitor_interval(),
            cancel.clone(),
        )));

        info!(
            "Pipeline started: {:.1} fps capture, {}ms latency budget, {} Hz audio, '{}' mapping, {} transitions",
            config.capture.frame_rate,
            config.scheduler.latency_budget_ms,
            config.audio.sample_rate,
            strategy_name,
            config.transition.mode
        );

        Ok(Pipeline {
            clock,
            started_at,
            cancel,
            tasks,
            output,
            events,
            generator,
            playback,
            quality: quality_rx,
            transition: transition_rx,
            reports: reports_rx,
            mode: mode_tx,
            volume: volume_tx,
            weights: weights_tx,
            playhead,
            callback_monitor,
            frame_queue,
            parameter_queue,
            counters,
            metrics,
        })
    }

    pub fn clock(&self) -> PipelineClock {
        self.clock
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Read handle to the playback state
    pub fn playback(&self) -> PlaybackReader {
        self.playback.clone()
    }

    pub fn quality(&self) -> QualitySettings {
        *self.quality.borrow()
    }

    /// Watch quality changes
    pub fn subscribe_quality(&self) -> watch::Receiver<QualitySettings> {
        self.quality.clone()
    }

    pub fn transition_status(&self) -> TransitionStatus {
        self.transition.borrow().clone()
    }

    pub fn last_report(&self) -> Option<PerformanceReport> {
        self.reports.borrow().clone()
    }

    pub fn generator_stats(&self) -> GeneratorStats {
        self.generator.stats()
    }

    /// Pipeline time of the next frame the renderer will produce
    pub fn render_position(&self) -> Timestamp {
        self.playhead.position()
    }

    /// Shape of blends adopted from now on
    pub fn set_transition_mode(&self, mode: TransitionMode) {
        if self.mode.send_replace(mode) != mode {
            info!("Transition mode set to {}", mode);
        }
    }

    pub fn transition_mode(&self) -> TransitionMode {
        *self.mode.borrow()
    }

    /// Set the master output level, ramped over one render block
    pub fn set_volume(&self, volume: f32) -> Result<()> {
        if !(0.0..=1.0).contains(&volume) {
            return Err(Error::Config(format!("volume must be in [0, 1], got {}", volume)));
        }
        self.volume.send_replace(volume);
        info!("Volume set to {:.2}", volume);
        Ok(())
    }

    pub fn volume(&self) -> f32 {
        *self.volume.borrow()
    }

    /// Nudge the feature weights from named feedback scores in [-1, 1]
    ///
    /// Unknown feature names are ignored with a warning. Returns the weights
    /// the mapper will use from its next frame on.
    pub fn update_mapping_weights(&self, feedback: &BTreeMap<String, f32>) -> MappingWeights {
        let mut weights = *self.weights.borrow();
        let unknown = weights.apply_feedback(feedback);
        if !unknown.is_empty() {
            warn!("Ignoring feedback for unknown features: {}", unknown.join(", "));
        }
        self.weights.send_replace(weights);
        info!("Mapping weights updated: {:?}", weights);
        weights
    }

    pub fn mapping_weights(&self) -> MappingWeights {
        *self.weights.borrow()
    }

    pub fn processing_stats(&self) -> ProcessingStats {
        let status = self.transition.borrow().clone();
        let audio = self.callback_monitor.stats();
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        ProcessingStats {
            started_at: self.started_at,
            uptime_ms: self.clock.now().as_millis(),
            quality_level: self.quality.borrow().level,
            frames_captured: load(&self.counters.frames_captured),
            frames_skipped: load(&self.counters.frames_skipped),
            frames_dropped: self.frame_queue.dropped(),
            frames_processed: load(&self.counters.frames_processed),
            parameter_changes: load(&self.counters.parameter_changes),
            detector_failures: load(&self.counters.detector_failures),
            active_tracks: self.counters.active_tracks.load(Ordering::Relaxed),
            playback_phase: status.phase,
            transitions: status.stats,
            generator: self.generator.stats(),
            audio_callbacks: audio.callback_count,
            audio_underruns: audio.underrun_count,
            frames_rendered: load(&self.counters.frames_rendered),
            ring_overruns: load(&self.counters.ring_overruns),
            metrics_discarded: self.metrics.discarded(),
            last_report: self.reports.borrow().clone(),
        }
    }

    /// Stop every task and the audio output; returns the final statistics
    pub async fn shutdown(mut self) -> Result<ProcessingStats> {
        info!("Shutting down pipeline");
        self.cancel.cancel();
        self.frame_queue.close();
        self.parameter_queue.close();

        for result in futures::future::join_all(self.tasks.drain(..)).await {
            if let Err(e) = result {
                warn!("Pipeline task ended abnormally: {}", e);
                if e.is_panic() {
                    return Err(Error::Pipeline(format!("stage task panicked: {}", e)));
                }
            }
        }
        self.output.stop()?;

        let stats = self.processing_stats();
        info!(
            "Pipeline stopped after {}ms: {} frames processed, {} parameter changes, {} underruns",
            stats.uptime_ms, stats.frames_processed, stats.parameter_changes, stats.audio_underruns
        );
        Ok(stats)
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ========================================
// Stage tasks
// ========================================

#[allow(clippy::too_many_arguments)]
async fn run_capture(
    mut source: Box<dyn FrameSource>,
    frames: StageQueue<Frame>,
    clock: PipelineClock,
    quality: watch::Receiver<QualitySettings>,
    metrics: MetricsSink,
    counters: Arc<StageCounters>,
    period: Duration,
    cancel: CancellationToken,
) {
    info!("Capture task started on '{}' ({:?} frame period)", source.name(), period);
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut tick: u64 = 0;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let index = tick;
        tick += 1;

        let stride = quality.borrow().frame_stride.max(1) as u64;
        if index % stride != 0 {
            counters.frames_skipped.fetch_add(1, Ordering::Relaxed);
            continue;
        }

        let started = clock.now();
        let Some(frame) = source.capture(index, started) else {
            debug!("Frame source produced nothing for tick {}", index);
            continue;
        };
        counters.frames_captured.fetch_add(1, Ordering::Relaxed);
        metrics.record(StageMetric::FrameCaptured);
        metrics.record(StageMetric::StageLatency {
            stage: Stage::Capture,
            latency: clock.now().saturating_since(started),
        });

        let pushed = tokio::select! {
            _ = cancel.cancelled() => break,
            pushed = frames.push(frame) => pushed,
        };
        match pushed {
            Ok(PushOutcome::Queued) => {}
            Ok(PushOutcome::DroppedOldest) => {
                debug!("Frame queue full, dropped oldest frame");
                metrics.record(StageMetric::FramesDropped { count: 1 });
            }
            Err(_) => break,
        }
    }

    frames.close();
    debug!("Capture task stopped after {} ticks", tick);
}

/// State owned by the perception task
struct PerceptionStage {
    detector: DetectorAdapter,
    tracker: ObjectTracker,
    extractor: FeatureExtractor,
    mapper: ParameterMapper,
    history: MusicalHistory,
}

impl PerceptionStage {
    /// Track, extract and map one detected frame
    ///
    /// Returns newly active parameters, if any.
    fn process(
        &mut self,
        frame: &Frame,
        detections: &[Detection],
        clock: PipelineClock,
        metrics: &MetricsSink,
        events: &EventBus,
    ) -> Option<(MusicalParameters, Option<f32>)> {
        let now = frame.timestamp;

        let started = clock.now();
        self.tracker.update(detections, now);
        metrics.record(StageMetric::StageLatency {
            stage: Stage::Track,
            latency: clock.now().saturating_since(started),
        });
        for transition in self.tracker.take_transitions() {
            events.emit_lossy(track_event(transition));
        }

        let track = self.tracker.dominant()?.clone();
        let started = clock.now();
        let context = ObjectContext::for_track(&track, frame.area(), Some(frame.mean_luminance()), now);
        let features = self.extractor.extract(&track, &context);
        let decision = self.mapper.map(&features, &self.history, now);
        self.history.record(&decision, now);
        metrics.record(StageMetric::StageLatency {
            stage: Stage::Map,
            latency: clock.now().saturating_since(started),
        });

        match decision {
            MappingDecision::Changed { parameters, distance, .. } => Some((parameters, distance)),
            MappingDecision::Unchanged { .. } => None,
        }
    }
}

fn track_event(transition: TrackTransition) -> SonoroEvent {
    match transition {
        TrackTransition::Confirmed { id, label, .. } => SonoroEvent::TrackConfirmed {
            track_id: id,
            label,
            timestamp: time::now(),
        },
        TrackTransition::Lost { id, label, .. } => SonoroEvent::TrackLost {
            track_id: id,
            label,
            timestamp: time::now(),
        },
        TrackTransition::Removed { id, .. } => SonoroEvent::TrackRemoved {
            track_id: id,
            timestamp: time::now(),
        },
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_perception(
    mut stage: PerceptionStage,
    frames: StageQueue<Frame>,
    parameters: StageQueue<MusicalParameters>,
    clock: PipelineClock,
    quality: watch::Receiver<QualitySettings>,
    metrics: MetricsSink,
    events: EventBus,
    counters: Arc<StageCounters>,
    mut weights: watch::Receiver<MappingWeights>,
    cancel: CancellationToken,
) {
    info!("Perception task started");
    loop {
        if weights.has_changed().unwrap_or(false) {
            stage.mapper.set_weights(*weights.borrow_and_update());
        }

        let frame = tokio::select! {
            _ = cancel.cancelled() => break,
            frame = frames.pop() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };
        metrics.record(StageMetric::QueueDepth {
            queue: frames.name(),
            depth: frames.len(),
        });

        let scale = quality.borrow().detector_scale;
        let started = clock.now();
        let detections = tokio::select! {
            _ = cancel.cancelled() => break,
            detections = stage.detector.detect(&frame, scale) => detections,
        };
        metrics.record(StageMetric::StageLatency {
            stage: Stage::Detect,
            latency: clock.now().saturating_since(started),
        });
        counters
            .detector_failures
            .store(stage.detector.total_failures(), Ordering::Relaxed);
        if let Some(change) = stage.detector.take_health_change() {
            metrics.record(StageMetric::DetectorHealth { healthy: change.healthy });
            events.emit_lossy(SonoroEvent::DetectorHealthChanged {
                healthy: change.healthy,
                consecutive_failures: change.consecutive_failures,
                timestamp: time::now(),
            });
        }

        let changed = stage.process(&frame, &detections, clock, &metrics, &events);
        counters
            .active_tracks
            .store(stage.tracker.active_count(), Ordering::Relaxed);
        counters.frames_processed.fetch_add(1, Ordering::Relaxed);
        metrics.record(StageMetric::FrameProcessed {
            captured_at: frame.timestamp,
            completed_at: clock.now(),
        });

        if let Some((params, distance)) = changed {
            counters.parameter_changes.fetch_add(1, Ordering::Relaxed);
            info!("Parameters changed: {}", params);
            events.emit_lossy(SonoroEvent::ParametersChanged {
                parameters: params.clone(),
                distance,
                timestamp: time::now(),
            });
            let pushed = tokio::select! {
                _ = cancel.cancelled() => break,
                pushed = parameters.push(params) => pushed,
            };
            match pushed {
                Ok(PushOutcome::DroppedOldest) => debug!("Parameter queue full, superseded queued parameters"),
                Ok(PushOutcome::Queued) => {}
                Err(_) => break,
            }
        }
    }

    parameters.close();
    debug!("Perception task stopped");
}

async fn run_transitions(
    mut manager: TransitionManager,
    parameters: StageQueue<MusicalParameters>,
    clock: PipelineClock,
    quality: watch::Receiver<QualitySettings>,
    mut mode: watch::Receiver<TransitionMode>,
    status: watch::Sender<TransitionStatus>,
    tick_period: Duration,
    cancel: CancellationToken,
) {
    info!("Transition task started ({:?} tick)", tick_period);
    let mut ticker = tokio::time::interval(tick_period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut parameters_open = true;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            next = parameters.pop(), if parameters_open => match next {
                Some(params) => {
                    manager.set_sequence_scale(quality.borrow().sequence_scale);
                    let request = manager.request(params, clock.now());
                    debug!("Transition request {} issued", request);
                }
                None => parameters_open = false,
            },
            Ok(()) = mode.changed() => {
                manager.set_mode(*mode.borrow_and_update());
            }
            _ = ticker.tick() => {
                manager.tick(clock.now());
            }
        }
        status.send_replace(TransitionStatus::of(&manager));
    }

    debug!("Transition task stopped in phase {}", manager.phase());
}

#[allow(clippy::too_many_arguments)]
async fn run_render(
    mut renderer: SequenceRenderer,
    mut producer: AudioProducer,
    playback: PlaybackReader,
    playhead: RenderPlayhead,
    quality: watch::Receiver<QualitySettings>,
    mut volume: watch::Receiver<f32>,
    metrics: MetricsSink,
    counters: Arc<StageCounters>,
    block_frames: usize,
    block_period: Duration,
    cancel: CancellationToken,
) {
    info!(
        "Render task started ({} frames per block, ring capacity {})",
        block_frames,
        producer.capacity()
    );
    let mut block = vec![AudioFrame::zero(); block_frames.max(1)];
    let mut ticker = tokio::time::interval((block_period / 2).max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        if volume.has_changed().unwrap_or(false) {
            renderer.set_master_gain(*volume.borrow_and_update());
        }
        let render_quality = quality.borrow().render_quality();
        let mut rendered_blocks = 0u32;
        let started = Instant::now();
        while producer.needs_frames() {
            let snapshot = playback.snapshot();
            renderer.render_block(&snapshot, render_quality, &mut block);
            producer.push_slice(&block);
            playhead.advance_to(renderer.frames_rendered());
            rendered_blocks += 1;
        }
        if rendered_blocks > 0 {
            metrics.record(StageMetric::StageLatency {
                stage: Stage::Render,
                latency: started.elapsed() / rendered_blocks,
            });
        }

        let stats = producer.stats();
        counters.frames_rendered.store(renderer.frames_rendered(), Ordering::Relaxed);
        counters.ring_overruns.store(stats.overruns, Ordering::Relaxed);
    }

    debug!("Render task stopped after {} frames", renderer.frames_rendered());
}

#[allow(clippy::too_many_arguments)]
async fn run_monitor(
    mut metrics: mpsc::Receiver<StageMetric>,
    mut controller: AdaptiveQualityController,
    callback_monitor: Arc<CallbackMonitor>,
    clock: PipelineClock,
    quality: watch::Sender<QualitySettings>,
    reports: watch::Sender<Option<PerformanceReport>>,
    events: EventBus,
    interval: Duration,
    cancel: CancellationToken,
) {
    info!("Performance monitor started ({:?} interval)", interval);
    let mut window = MetricsWindow::new(clock.now());
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            Some(metric) = metrics.recv() => window.ingest(metric),
            _ = ticker.tick() => {
                while let Ok(metric) = metrics.try_recv() {
                    window.ingest(metric);
                }
                let underruns = callback_monitor.take_new_underruns();
                if underruns > 0 {
                    let total = callback_monitor.stats().underrun_count;
                    warn!("{} audio underruns in the last interval ({} total)", underruns, total);
                    window.ingest(StageMetric::Underruns { count: underruns });
                    events.emit_lossy(SonoroEvent::AudioUnderrun {
                        underrun_count: total,
                        timestamp: time::now(),
                    });
                }

                let report = window.report(clock.now());
                debug!(
                    "Performance report: {} captured, {} processed, {} dropped, mean latency {:?}ms",
                    report.frames_captured, report.frames_processed, report.frames_dropped, report.mean_latency_ms
                );
                if let Some(command) = controller.observe(&report) {
                    quality.send_replace(command.settings);
                    events.emit_lossy(SonoroEvent::QualityChanged {
                        old_level: command.from,
                        new_level: command.to,
                        reason: command.reason,
                        timestamp: time::now(),
                    });
                }
                reports.send_replace(Some(report));
            }
        }
    }

    debug!("Performance monitor stopped at quality level {}", controller.level());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::output::NullOutput;
    use crate::music::procedural::ProceduralModel;
    use crate::semantic::features::{LabelProfile, SemanticFeatures};
    use crate::source::SyntheticFrameSource;
    use crate::vision::detector::{SceneObject, ScriptedDetector};
    use sonoro_common::vision::BoundingBox;

    fn small_config() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.audio.sample_rate = 8_000;
        config.audio.block_frames = 128;
        config.audio.ring_capacity_frames = 1_024;
        config.capture.width = 64;
        config.capture.height = 48;
        config
    }

    fn components(config: &PipelineConfig, objects: Vec<SceneObject>) -> PipelineComponents {
        PipelineComponents::new(
            Box::new(SyntheticFrameSource::new(config.capture.width, config.capture.height, [90, 110, 90])),
            Arc::new(ScriptedDetector::new(objects, config.capture.width, config.capture.height)),
            Arc::new(ProceduralModel::new()),
            Box::new(NullOutput::new(config.audio.sample_rate, config.audio.block_frames as u32)),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_scene_stays_silent() {
        let config = small_config();
        let pipeline = Pipeline::start(config.clone(), components(&config, Vec::new()), EventBus::new(64)).unwrap();

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(pipeline.playback().snapshot().is_silent());
        assert_eq!(pipeline.quality().level, 0);

        let stats = pipeline.shutdown().await.unwrap();
        assert!(stats.frames_processed > 30);
        assert_eq!(stats.parameter_changes, 0);
        assert_eq!(stats.generator.invocations, 0);
        assert_eq!(stats.audio_underruns, 0);
        assert!(stats.last_report.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_config_rejected_before_start() {
        let mut config = small_config();
        config.tracker.iou_threshold = 0.0;
        let result = Pipeline::start(config.clone(), components(&config, Vec::new()), EventBus::new(8));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_object_drives_one_transition() {
        let config = small_config();
        let objects = vec![SceneObject::new("cup", 0.9, BoundingBox::new(10.0, 10.0, 20.0, 16.0))];
        let pipeline = Pipeline::start(config.clone(), components(&config, objects), EventBus::new(256)).unwrap();

        tokio::time::sleep(Duration::from_secs(6)).await;
        let status = pipeline.transition_status();
        assert_eq!(status.phase, PlaybackPhase::Idle);
        assert_eq!(status.active.and_then(|p| p.source_label).as_deref(), Some("cup"));
        assert!(!pipeline.playback().snapshot().is_silent());

        let stats = pipeline.shutdown().await.unwrap();
        assert_eq!(stats.parameter_changes, 1);
        assert_eq!(stats.transitions.completed, 1);
        assert_eq!(stats.active_tracks, 1);
    }

    struct JazzOnly;

    impl MappingStrategy for JazzOnly {
        fn name(&self) -> &str {
            "jazz-only"
        }

        fn map(&self, features: &SemanticFeatures) -> MusicalParameters {
            MusicalParameters {
                style: MusicStyle::Jazz,
                tempo_bpm: 100.0,
                ..DefaultMapping.map(features)
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_strategy_and_label_table() {
        let config = small_config();
        let mut extractor = FeatureExtractor::new();
        extractor.insert(
            "fern",
            LabelProfile {
                energy: 0.2,
                warmth: 0.65,
                complexity: 0.25,
                brightness: 0.5,
                tension: 0.1,
            },
        );
        let objects = vec![SceneObject::new("fern", 0.9, BoundingBox::new(10.0, 10.0, 20.0, 16.0))];
        let components = components(&config, objects)
            .with_strategy(Arc::new(JazzOnly))
            .with_extractor(extractor);
        let pipeline = Pipeline::start(config, components, EventBus::new(256)).unwrap();

        tokio::time::sleep(Duration::from_secs(6)).await;
        let active = pipeline.transition_status().active.expect("fern mapped");
        assert_eq!(active.style, MusicStyle::Jazz);
        assert_eq!(active.tempo_bpm, 100.0);
        assert_eq!(active.source_label.as_deref(), Some("fern"));
        assert_eq!(pipeline.generator_stats().invocations, 1);
        pipeline.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_runtime_controls_reach_their_tasks() {
        let config = small_config();
        let objects = vec![SceneObject::new("cup", 0.9, BoundingBox::new(10.0, 10.0, 20.0, 16.0))];
        let pipeline = Pipeline::start(config.clone(), components(&config, objects), EventBus::new(256)).unwrap();
        assert_eq!(pipeline.transition_mode(), TransitionMode::Crossfade);

        pipeline.set_transition_mode(TransitionMode::Instant);
        assert!(pipeline.set_volume(0.1).is_ok());
        assert!(matches!(pipeline.set_volume(1.5), Err(Error::Config(_))));
        assert_eq!(pipeline.volume(), 0.1);

        let feedback = BTreeMap::from([("Warmth".to_string(), 1.0), ("loudness".to_string(), 1.0)]);
        let weights = pipeline.update_mapping_weights(&feedback);
        assert!((weights.warmth - 1.25).abs() < 1e-6);
        assert_eq!(weights.energy, 1.0);
        assert_eq!(pipeline.mapping_weights(), weights);

        tokio::time::sleep(Duration::from_secs(4)).await;
        let status = pipeline.transition_status();
        assert_eq!(status.mode, TransitionMode::Instant);
        assert!(!status.generating);
        // an instant cut leaves no blend behind
        assert_eq!(status.phase, PlaybackPhase::Idle);
        assert!(pipeline.playback().snapshot().blend.is_none());
        assert!(pipeline.render_position() > pipeline.clock().now());

        let stats = pipeline.shutdown().await.unwrap();
        assert_eq!(stats.transitions.completed, 1);
    }
}
