//! Error types for ssewire.

use thiserror::Error;

/// Main error type for all ssewire operations.
#[derive(Debug, Error)]
pub enum SsewireError {
    /// I/O error while reading from or writing to a stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Invalid UTF-8 byte sequence in the incoming stream.
    #[error("Invalid UTF-8 sequence at byte offset {offset}")]
    Decode { offset: u64 },

    /// Protocol error (oversized frame, newline in payload, etc.).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Connection closed unexpectedly.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Sink write buffer is full.
    #[error("Backpressure: sink buffer full")]
    Backpressure,
}

/// Result type alias using SsewireError.
pub type Result<T> = std::result::Result<T, SsewireError>;
