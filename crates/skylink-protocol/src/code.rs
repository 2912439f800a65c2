//! Broker error codes.

use std::fmt;

/// Numeric outcome carried by an `ER` reply.
///
/// Codes outside the known set are kept as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ErrorCode(u16);

impl ErrorCode {
    pub const BAD_REQUEST: ErrorCode = ErrorCode(400);
    pub const UNAUTHORIZED: ErrorCode = ErrorCode(402);
    pub const FORBIDDEN: ErrorCode = ErrorCode(403);
    pub const INVALID_CHANNEL_NAME: ErrorCode = ErrorCode(451);
    pub const CHANNEL_NOT_FOUND: ErrorCode = ErrorCode(454);
    pub const INTERNAL_ERROR: ErrorCode = ErrorCode(597);
    /// Also used when an error reply carries no usable code.
    pub const END_OF_FILE: ErrorCode = ErrorCode(598);

    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    pub const fn as_u16(&self) -> u16 {
        self.0
    }

    /// Parse the code frame of an `ER` reply.
    pub fn parse(frame: &str) -> Option<Self> {
        frame.trim().parse().ok().map(Self)
    }

    /// Description of a known code.
    pub fn description(&self) -> Option<&'static str> {
        match self.0 {
            400 => Some("bad request"),
            402 => Some("unauthorized"),
            403 => Some("forbidden"),
            451 => Some("invalid channel name"),
            454 => Some("channel not found"),
            597 => Some("internal error"),
            598 => Some("end of file"),
            _ => None,
        }
    }
}

impl From<u16> for ErrorCode {
    fn from(code: u16) -> Self {
        Self(code)
    }
}

impl From<ErrorCode> for u16 {
    fn from(code: ErrorCode) -> Self {
        code.0
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.description() {
            Some(description) => write!(f, "{}: {description}", self.0),
            None => write!(f, "{}", self.0),
        }
    }
}
