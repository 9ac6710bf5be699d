//! Perception stages: detector adapter and object tracker

pub mod detector;
pub mod tracker;

pub use detector::{DetectorAdapter, ObjectDetector, ScriptedDetector};
pub use tracker::{ObjectTracker, TrackTransition, TrackedObject};
