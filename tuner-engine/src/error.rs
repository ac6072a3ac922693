//! Error types for the tuner engine.

use thiserror::Error;

/// Result type used throughout the engine.
pub type Result<T> = std::result::Result<T, TunerError>;

/// Errors raised by the tuner engine.
///
/// Only `InvalidFrequency` comes out of pitch classification itself. Missing
/// or implausible samples are data (`None`), never errors.
#[derive(Error, Debug)]
pub enum TunerError {
    /// Classification input was zero, negative, NaN or infinite.
    #[error("invalid frequency: {0} Hz (must be finite and greater than zero)")]
    InvalidFrequency(f64),

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Audio device or stream failure.
    #[error("audio error: {0}")]
    Audio(String),

    /// I/O failure (config files, thread spawning).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed JSON configuration.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
