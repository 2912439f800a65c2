//! Client error types.

use std::fmt;

use skylink_core::IdentityError;
use skylink_protocol::ErrorCode;

use crate::transport::TransportError;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors returned by [`crate::Client`] operations.
#[derive(Debug)]
pub enum ClientError {
    /// The broker answered with an error code.
    Broker(ErrorCode),
    /// The broker answered with something that is neither success nor a coded error.
    UnknownServerError,
    /// A success reply with an unexpected payload.
    UnexpectedReply(String),
    /// Sending or receiving took longer than the configured timeout.
    Timeout { operation: &'static str },
    /// No address to (re)connect to.
    NotConnected,
    /// Transport failure.
    Transport(TransportError),
    /// Invalid identity or settings.
    Config(String),
    /// Payload serialization failed.
    Serialization(serde_json::Error),
}

impl ClientError {
    /// Numeric outcome: the broker code for [`ClientError::Broker`], `-1` otherwise.
    pub fn code(&self) -> i32 {
        match self {
            Self::Broker(code) => i32::from(code.as_u16()),
            _ => -1,
        }
    }

    /// The broker error code, if this is a broker-side error.
    pub fn broker_code(&self) -> Option<ErrorCode> {
        match self {
            Self::Broker(code) => Some(*code),
            _ => None,
        }
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Broker(code) => write!(f, "broker error {code}"),
            Self::UnknownServerError => write!(f, "unknown server error"),
            Self::UnexpectedReply(msg) => write!(f, "unexpected reply: {msg}"),
            Self::Timeout { operation } => write!(f, "timeout while {operation}"),
            Self::NotConnected => write!(f, "not connected"),
            Self::Transport(err) => write!(f, "transport error: {err}"),
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
            Self::Serialization(err) => write!(f, "serialization error: {err}"),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport(err) => Some(err),
            Self::Serialization(err) => Some(err),
            _ => None,
        }
    }
}

impl From<TransportError> for ClientError {
    fn from(err: TransportError) -> Self {
        Self::Transport(err)
    }
}

impl From<IdentityError> for ClientError {
    fn from(err: IdentityError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err)
    }
}
