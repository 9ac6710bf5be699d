//! # Sonoro Engine Library (sonoro-engine)
//!
//! Real-time perception-to-music pipeline: camera frames in, a continuously
//! updated and musically coherent audio stream out.
//!
//! **Stages:** frame source → detector adapter → object tracker → semantic
//! feature extractor → musical parameter mapper → generator adapter →
//! transition manager → audio sink, all scheduled by [`scheduler::Pipeline`]
//! with an adaptive-quality feedback loop.
//!
//! External models (object detection, sequence generation) and audio devices
//! plug in through the [`vision::ObjectDetector`], [`music::SequenceModel`]
//! and [`audio::AudioOutput`] traits.

pub mod audio;
pub mod clock;
pub mod config;
pub mod error;
pub mod music;
pub mod playback;
pub mod scheduler;
pub mod semantic;
pub mod source;
pub mod vision;

pub use config::PipelineConfig;
pub use error::{Error, Result};
pub use scheduler::{Pipeline, PipelineComponents};
