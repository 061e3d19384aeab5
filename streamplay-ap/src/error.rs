//! Error types for streamplay-ap
//!
//! Defines module-specific error types using thiserror for clear error propagation.
//! `InsufficientData` is the explicit "try again with more bytes" signal used by
//! the patcher and codecs while a download is still growing.

use thiserror::Error;

/// Main error type for streamplay-ap
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid player settings or command-line values
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transport failure while fetching the byte stream
    #[error("Network error: {0}")]
    Network(String),

    /// Prefix is too short to parse or decode yet
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// Malformed audio bytes (bad signature, decoder failure)
    #[error("Audio decode error: {0}")]
    Decode(String),

    /// Format tag or container feature this player does not handle
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Audio output device errors
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// Invalid state for operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether a later decode attempt over a longer prefix may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::InsufficientData(_) | Error::Decode(_))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Network(err.to_string())
    }
}

/// Convenience Result type using streamplay-ap Error
pub type Result<T> = std::result::Result<T, Error>;
