//! Reply decoding for request/response exchanges.

use crate::{Command, ErrorCode, FrameSet};

/// Decoded broker reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyOutcome {
    /// `OK` or `AT`, with the remaining frames.
    Success(Vec<String>),
    /// `ER` with its code, or `None` when the reply could not be understood.
    Failure(Option<ErrorCode>),
}

impl ReplyOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ReplyOutcome::Success(_))
    }
}

/// Classify a reply frame set.
pub fn decode_reply(mut frames: FrameSet) -> ReplyOutcome {
    let Some(tag) = frames.pop_front() else {
        return ReplyOutcome::Failure(None);
    };

    match Command::from_tag(&tag) {
        Some(Command::Ok | Command::AccessToken) => ReplyOutcome::Success(frames.into_vec()),
        Some(Command::Error) => {
            ReplyOutcome::Failure(frames.pop_front().as_deref().and_then(ErrorCode::parse))
        }
        _ => ReplyOutcome::Failure(None),
    }
}
