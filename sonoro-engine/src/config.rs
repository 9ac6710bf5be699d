//! Pipeline configuration
//!
//! Loaded from a TOML file where every field is optional and falls back to a
//! built-in default. Resolution order for the file itself is handled by
//! `sonoro_common::config::resolve_config_path`:
//!
//! 1. `--config` command-line argument
//! 2. `SONORO_CONFIG` environment variable
//! 3. `<user config dir>/sonoro/config.toml`
//! 4. Built-in defaults (no file)
//!
//! Invalid values are fatal: [`PipelineConfig::validate`] runs before the
//! pipeline starts and rejects the whole configuration.

use crate::error::{Error, Result};
use crate::scheduler::queue::QueuePolicy;
use crate::semantic::mapper::MappingWeights;
use serde::{Deserialize, Serialize};
use sonoro_common::config::{load_toml, resolve_config_path, CONFIG_ENV_VAR};
use sonoro_common::FadeCurve;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Complete pipeline configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PipelineConfig {
    pub capture: CaptureConfig,
    pub detector: DetectorConfig,
    pub tracker: TrackerConfig,
    pub mapper: MapperConfig,
    pub generator: GeneratorConfig,
    pub transition: TransitionConfig,
    pub scheduler: SchedulerConfig,
    pub audio: AudioConfig,
    pub logging: LoggingConfig,
}

/// Frame source settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Nominal capture rate in frames per second
    pub frame_rate: f32,
    pub width: u32,
    pub height: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            frame_rate: 15.0,
            width: 640,
            height: 480,
        }
    }
}

impl CaptureConfig {
    pub fn frame_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.frame_rate.max(0.1) as f64)
    }
}

/// Detector adapter settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Consecutive failures before the detector is reported unhealthy
    pub unhealthy_after_failures: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            unhealthy_after_failures: 3,
        }
    }
}

/// Object tracker settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Minimum IoU for a detection to match a track
    pub iou_threshold: f32,
    /// Consecutive matches before a Tentative track is Confirmed
    pub confirm_hits: u32,
    /// Consecutive processed frames without a match before a track is Lost
    pub loss_timeout_frames: u32,
    /// Processed frames a Lost track is kept before removal
    pub lost_grace_frames: u32,
    /// Detections below this confidence are ignored
    pub min_confidence: f32,
    /// Weight of a new detection when smoothing the track box (1.0 = no smoothing)
    pub box_smoothing: f32,
    /// Relative salience lead a challenger needs to replace the dominant track
    pub dominance_margin: f32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            iou_threshold: 0.3,
            confirm_hits: 3,
            loss_timeout_frames: 10,
            lost_grace_frames: 15,
            min_confidence: 0.25,
            box_smoothing: 0.6,
            dominance_margin: 0.2,
        }
    }
}

/// Semantic mapping settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MapperConfig {
    /// Exponential smoothing weight of new features (1.0 = no smoothing)
    pub smoothing_alpha: f32,
    /// Parameter distance that must be exceeded before a new set is emitted
    pub hysteresis_threshold: f32,
    /// Number of emitted parameter sets kept in history
    pub history_length: usize,
    /// Smoothed state older than this is discarded
    pub smoothing_reset_ms: u64,
    /// Optional TOML file extending the built-in label table
    pub custom_mappings: Option<PathBuf>,
    /// Initial per-feature response weights (adjusted at runtime by feedback)
    pub weights: MappingWeights,
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            smoothing_alpha: 0.3,
            hysteresis_threshold: 0.12,
            history_length: 8,
            smoothing_reset_ms: 5_000,
            custom_mappings: None,
            weights: MappingWeights::default(),
        }
    }
}

impl MapperConfig {
    pub fn smoothing_reset(&self) -> Duration {
        Duration::from_millis(self.smoothing_reset_ms)
    }
}

/// Music generator settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Hard deadline for one generation call
    pub deadline_ms: u64,
    /// Bars requested at full quality
    pub bars: u32,
    /// Upper bound on generated sequence duration
    pub max_sequence_secs: f32,
    /// Base seed mixed into every generation request
    pub seed: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            deadline_ms: 2_000,
            bars: 4,
            max_sequence_secs: 16.0,
            seed: 0x5EED,
        }
    }
}

impl GeneratorConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }

    pub fn max_sequence_length(&self) -> Duration {
        Duration::from_secs_f32(self.max_sequence_secs.max(0.0))
    }
}

/// How the transition manager moves to a new sequence
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionMode {
    /// Cut over at adoption, no blend window
    Instant,
    /// S-curve over the crossfade window
    Smooth,
    /// Linear over half the crossfade window
    Fade,
    /// Configured curve over the crossfade window
    #[default]
    Crossfade,
}

impl TransitionMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "instant" | "cut" => Some(TransitionMode::Instant),
            "smooth" => Some(TransitionMode::Smooth),
            "fade" => Some(TransitionMode::Fade),
            "crossfade" => Some(TransitionMode::Crossfade),
            _ => None,
        }
    }
}

impl std::fmt::Display for TransitionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransitionMode::Instant => write!(f, "instant"),
            TransitionMode::Smooth => write!(f, "smooth"),
            TransitionMode::Fade => write!(f, "fade"),
            TransitionMode::Crossfade => write!(f, "crossfade"),
        }
    }
}

/// Transition manager settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransitionConfig {
    /// Initial transition mode; can be changed at runtime
    pub mode: TransitionMode,
    /// Blend window length
    pub crossfade_ms: u64,
    pub curve: FadeCurve,
    /// Align the incoming sequence to the outgoing beat phase
    pub beat_align: bool,
    /// Extra wait beyond the generation deadline before adopting the fallback directly
    pub deadline_grace_ms: u64,
    /// Transition tick period
    pub tick_ms: u64,
}

impl Default for TransitionConfig {
    fn default() -> Self {
        Self {
            mode: TransitionMode::Crossfade,
            crossfade_ms: 3_000,
            curve: FadeCurve::SCurve,
            beat_align: true,
            deadline_grace_ms: 250,
            tick_ms: 20,
        }
    }
}

impl TransitionConfig {
    pub fn crossfade_duration(&self) -> Duration {
        Duration::from_millis(self.crossfade_ms)
    }

    /// Blend window and curve used in `mode`
    pub fn blend_for(&self, mode: TransitionMode) -> (Duration, FadeCurve) {
        match mode {
            TransitionMode::Instant => (Duration::ZERO, self.curve),
            TransitionMode::Smooth => (self.crossfade_duration(), FadeCurve::SCurve),
            TransitionMode::Fade => (self.crossfade_duration() / 2, FadeCurve::Linear),
            TransitionMode::Crossfade => (self.crossfade_duration(), self.curve),
        }
    }

    pub fn deadline_grace(&self) -> Duration {
        Duration::from_millis(self.deadline_grace_ms)
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }
}

/// Bounded queue between two stages
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct QueueConfig {
    pub capacity: usize,
    pub policy: QueuePolicy,
}

/// Scheduler and adaptive-quality settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Target capture-to-parameters latency
    pub latency_budget_ms: u64,
    /// Performance report period
    pub monitor_interval_ms: u64,
    /// Consecutive over-budget reports before degrading
    pub degrade_after: u32,
    /// Consecutive comfortable reports before recovering
    pub recover_after: u32,
    /// Fraction of the budget the predicted latency must stay under to recover
    pub recover_ratio: f32,
    pub frame_queue: QueueConfig,
    pub parameter_queue: QueueConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            latency_budget_ms: 250,
            monitor_interval_ms: 1_000,
            degrade_after: 1,
            recover_after: 3,
            recover_ratio: 0.7,
            frame_queue: QueueConfig {
                capacity: 2,
                policy: QueuePolicy::DropOldest,
            },
            parameter_queue: QueueConfig {
                capacity: 4,
                policy: QueuePolicy::DropOldest,
            },
        }
    }
}

impl SchedulerConfig {
    pub fn latency_budget(&self) -> Duration {
        Duration::from_millis(self.latency_budget_ms)
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms)
    }
}

/// Audio render settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    /// Frames rendered (and consumed by the output) per block
    pub block_frames: usize,
    /// Ring buffer capacity in frames
    pub ring_capacity_frames: usize,
    /// Output gain applied after mixing
    pub master_gain: f32,
    /// Use the audio device instead of the paced null output
    pub device_output: bool,
    /// Device name (None = default device)
    pub device_name: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            block_frames: 512,
            ring_capacity_frames: 8_192,
            master_gain: 0.25,
            device_output: false,
            device_name: None,
        }
    }
}

impl AudioConfig {
    pub fn block_period(&self) -> Duration {
        Duration::from_secs_f64(self.block_frames as f64 / self.sample_rate.max(1) as f64)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl PipelineConfig {
    /// Resolve, load and validate the configuration
    ///
    /// Falls back to built-in defaults when no file is found through any of the
    /// resolution sources. An explicitly named file that cannot be read is an
    /// error.
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        let config: PipelineConfig = match resolve_config_path(cli_path, CONFIG_ENV_VAR) {
            Some(path) => {
                info!("Loading configuration from {}", path.display());
                load_toml(&path)?
            }
            None => {
                warn!("No configuration file found, using built-in defaults");
                PipelineConfig::default()
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string and validate it
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: PipelineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        fn check(ok: bool, message: &str) -> Result<()> {
            if ok {
                Ok(())
            } else {
                Err(Error::Config(message.to_string()))
            }
        }

        check(self.capture.frame_rate > 0.0 && self.capture.frame_rate <= 120.0, "capture.frame_rate must be in (0, 120]")?;
        check(self.capture.width > 0 && self.capture.height > 0, "capture dimensions must be non-zero")?;

        check(self.detector.unhealthy_after_failures >= 1, "detector.unhealthy_after_failures must be at least 1")?;

        let t = &self.tracker;
        check(t.iou_threshold > 0.0 && t.iou_threshold <= 1.0, "tracker.iou_threshold must be in (0, 1]")?;
        check(t.confirm_hits >= 1, "tracker.confirm_hits must be at least 1")?;
        check(t.loss_timeout_frames >= 1, "tracker.loss_timeout_frames must be at least 1")?;
        check((0.0..=1.0).contains(&t.min_confidence), "tracker.min_confidence must be in [0, 1]")?;
        check(t.box_smoothing > 0.0 && t.box_smoothing <= 1.0, "tracker.box_smoothing must be in (0, 1]")?;
        check(t.dominance_margin >= 0.0 && t.dominance_margin.is_finite(), "tracker.dominance_margin must be non-negative")?;

        let m = &self.mapper;
        check(m.smoothing_alpha > 0.0 && m.smoothing_alpha <= 1.0, "mapper.smoothing_alpha must be in (0, 1]")?;
        check(m.hysteresis_threshold >= 0.0 && m.hysteresis_threshold < 1.0, "mapper.hysteresis_threshold must be in [0, 1)")?;
        check(m.history_length >= 1, "mapper.history_length must be at least 1")?;
        check(m.weights.is_valid(), "mapper.weights must each be in [0, 2]")?;

        let g = &self.generator;
        check(g.deadline_ms > 0, "generator.deadline_ms must be positive")?;
        check(g.bars >= 1, "generator.bars must be at least 1")?;
        check(g.max_sequence_secs >= 1.0, "generator.max_sequence_secs must be at least 1")?;

        check(self.transition.crossfade_ms > 0, "transition.crossfade_ms must be positive")?;
        check(self.transition.tick_ms > 0, "transition.tick_ms must be positive")?;

        let s = &self.scheduler;
        check(s.latency_budget_ms > 0, "scheduler.latency_budget_ms must be positive")?;
        check(s.monitor_interval_ms > 0, "scheduler.monitor_interval_ms must be positive")?;
        check(s.degrade_after >= 1 && s.recover_after >= 1, "scheduler degrade/recover counters must be at least 1")?;
        check(s.recover_ratio > 0.0 && s.recover_ratio < 1.0, "scheduler.recover_ratio must be in (0, 1)")?;
        check(s.frame_queue.capacity >= 1 && s.parameter_queue.capacity >= 1, "queue capacities must be at least 1")?;

        let a = &self.audio;
        check((8_000..=192_000).contains(&a.sample_rate), "audio.sample_rate must be in [8000, 192000]")?;
        check(a.block_frames >= 16, "audio.block_frames must be at least 16")?;
        check(a.ring_capacity_frames >= a.block_frames * 2, "audio.ring_capacity_frames must hold at least two blocks")?;
        check(a.master_gain >= 0.0 && a.master_gain <= 1.0, "audio.master_gain must be in [0, 1]")?;

        Ok(())
    }
}
