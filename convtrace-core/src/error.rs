//! Error types for convtrace-core

use thiserror::Error;

/// Main error type for the convtrace-core library
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Transcript line failed to decode
    #[error("decode error at line {line}: {message}")]
    Decode { line: usize, message: String },

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Cursor store error
    #[error("cursor store error: {0}")]
    Cursor(String),

    /// Trace sink error
    #[error("sink error: {0}")]
    Sink(String),
}

/// Result type alias for convtrace-core
pub type Result<T> = std::result::Result<T, Error>;
