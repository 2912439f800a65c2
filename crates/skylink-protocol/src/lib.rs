//! Wire protocol for skylink clients and workers.
//!
//! # Protocol Overview
//!
//! Every exchange with the broker is a multipart message: an ordered list
//! of UTF-8 frames. A command message starts with a two-letter [`Command`]
//! tag followed by its arguments:
//!
//! - client request: `[BC, channel, event, data]`, answered by `[OK]` or
//!   `[ER, code]`
//! - worker traffic: frames carry a leading empty envelope frame, e.g.
//!   `["", HB]` or `["", TR, payload]`
//!
//! On stream transports each message is length-prefixed, see
//! [`encode_message`].
//!
//! # Example
//!
//! ```rust
//! use skylink_protocol::{Command, ReplyOutcome, decode_reply, encode, FrameSet};
//!
//! let request = encode(Command::CloseChannel, ["room"]);
//! assert_eq!(request.front(), Some("CC"));
//!
//! let reply = decode_reply(FrameSet::from(["ER", "454"]));
//! assert!(matches!(reply, ReplyOutcome::Failure(Some(_))));
//! ```

mod channel;
mod code;
mod command;
mod error;
mod event;
mod frames;
mod framing;
mod reply;

pub use channel::ChannelKind;
pub use code::ErrorCode;
pub use command::Command;
pub use error::{ProtocolError, ProtocolResult};
pub use event::Event;
pub use frames::{FrameSet, encode};
pub use framing::{FrameReader, FrameWriter, decode_message, encode_message};
pub use reply::{ReplyOutcome, decode_reply};

/// Maximum message body size (1 MB).
pub const MAX_MESSAGE_SIZE: u32 = 1024 * 1024;

/// Length of a single access token.
pub const ACCESS_TOKEN_LENGTH: usize = 128;
