//! Errors raised by the shared library

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file missing or unreadable
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Rejected constructor argument, e.g. a frame with a zero dimension
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
