//! Protocol error types.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while framing messages or parsing payloads.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Message exceeds maximum allowed size.
    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: u32, max: u32 },

    /// IO error during read/write.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Not enough bytes for what the header announced.
    #[error("incomplete message: expected {expected} bytes, got {received}")]
    IncompleteMessage { expected: usize, received: usize },

    /// Empty message received.
    #[error("empty message")]
    EmptyMessage,

    /// A frame is not valid UTF-8.
    #[error("frame {index} is not valid UTF-8")]
    InvalidUtf8 { index: usize },

    /// Body carries bytes past the last announced frame.
    #[error("{0} trailing bytes after last frame")]
    TrailingBytes(usize),

    /// Event payload is not valid JSON.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Event payload is JSON but not a single-entry object.
    #[error("invalid event payload: {0}")]
    InvalidEvent(String),
}
