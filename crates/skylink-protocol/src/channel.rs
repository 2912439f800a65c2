//! Channel kinds.
//!
//! The broker tells private and presence channels apart by name prefix, so
//! the kind never travels as a separate frame.

use std::borrow::Cow;

/// Channel visibility.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    #[default]
    Normal,
    Private,
    Presence,
}

impl ChannelKind {
    /// Name prefix identifying the kind, empty for normal channels.
    pub fn prefix(&self) -> &'static str {
        match self {
            ChannelKind::Normal => "",
            ChannelKind::Private => "private-",
            ChannelKind::Presence => "presence-",
        }
    }

    /// Numeric kind (0 normal, 1 private, 2 presence).
    pub fn as_u8(&self) -> u8 {
        match self {
            ChannelKind::Normal => 0,
            ChannelKind::Private => 1,
            ChannelKind::Presence => 2,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(ChannelKind::Normal),
            1 => Some(ChannelKind::Private),
            2 => Some(ChannelKind::Presence),
            _ => None,
        }
    }

    /// Kind implied by a channel name.
    pub fn of(name: &str) -> Self {
        if name.starts_with(ChannelKind::Private.prefix()) {
            ChannelKind::Private
        } else if name.starts_with(ChannelKind::Presence.prefix()) {
            ChannelKind::Presence
        } else {
            ChannelKind::Normal
        }
    }

    /// Channel name as sent to the broker, carrying this kind's prefix.
    pub fn qualify<'a>(&self, name: &'a str) -> Cow<'a, str> {
        let prefix = self.prefix();
        if name.starts_with(prefix) {
            Cow::Borrowed(name)
        } else {
            Cow::Owned(format!("{prefix}{name}"))
        }
    }
}
