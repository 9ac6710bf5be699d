//! # Sonoro Common Library
//!
//! Shared code for the Sonoro perception-to-music pipeline:
//! - Vision data model (frames, bounding boxes, detections)
//! - Music data model (musical parameters, events, sequences)
//! - Event types (SonoroEvent enum) and the EventBus
//! - Fade curve definitions used by the transition blend
//! - Configuration file resolution
//! - Pipeline timestamps

pub mod config;
pub mod error;
pub mod events;
pub mod fade_curves;
pub mod music;
pub mod time;
pub mod vision;

pub use error::{Error, Result};
pub use fade_curves::FadeCurve;
pub use time::Timestamp;
