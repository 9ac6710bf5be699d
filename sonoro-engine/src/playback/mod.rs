//! Playback state and the transition manager that owns it

pub mod state;
pub mod transition;

pub use state::{
    playback_channel, Blend, Layer, PlaybackPhase, PlaybackPublisher, PlaybackReader, PlaybackSnapshot, RenderPlayhead,
};
pub use transition::{TransitionManager, TransitionStats};
