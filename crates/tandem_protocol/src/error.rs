//! Protocol error type shared across the workspace.

use thiserror::Error;

/// Errors surfaced by wire encoding, framing, and timestamp handling.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Invalid wire timestamp: {0:?}")]
    InvalidTimestamp(String),
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
