//! Error types for sonoro-engine
//!
//! Model adapters absorb their own failures (empty detections, fallback
//! sequences), so these errors mostly surface at startup and shutdown.

use thiserror::Error;

/// Main error type for sonoro-engine
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid or unreadable configuration (fatal at startup)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors bubbled up from the shared library
    #[error(transparent)]
    Common(#[from] sonoro_common::Error),

    /// TOML parse errors
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Audio output device errors
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// Pipeline lifecycle errors (start, shutdown, task failures)
    #[error("Pipeline error: {0}")]
    Pipeline(String),

    /// Stage queue closed while producing into it
    #[error("Queue closed: {0}")]
    QueueClosed(String),
}

/// Convenience Result type using sonoro-engine Error
pub type Result<T> = std::result::Result<T, Error>;
