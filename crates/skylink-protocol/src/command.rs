//! Command vocabulary shared by clients, workers and the broker.

use std::fmt;

/// A protocol command. Each command travels as a two-letter tag frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Ok,
    Error,
    Broadcast,
    OpenChannel,
    CloseChannel,
    AccessToken,
    Heartbeat,
    Ready,
    Trigger,
    Quit,
}

impl Command {
    /// Every command, in tag order.
    pub const ALL: [Command; 10] = [
        Command::Ok,
        Command::Error,
        Command::Broadcast,
        Command::OpenChannel,
        Command::CloseChannel,
        Command::AccessToken,
        Command::Heartbeat,
        Command::Ready,
        Command::Trigger,
        Command::Quit,
    ];

    /// Wire tag.
    pub fn tag(&self) -> &'static str {
        match self {
            Command::Ok => "OK",
            Command::Error => "ER",
            Command::Broadcast => "BC",
            Command::OpenChannel => "OC",
            Command::CloseChannel => "CC",
            Command::AccessToken => "AT",
            Command::Heartbeat => "HB",
            Command::Ready => "RD",
            Command::Trigger => "TR",
            Command::Quit => "QT",
        }
    }

    /// Parse a wire tag. Unrecognised tags yield `None`.
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|command| command.tag() == tag)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}
