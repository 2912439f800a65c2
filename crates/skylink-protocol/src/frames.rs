//! Multipart messages.

use std::collections::VecDeque;

use crate::Command;

/// An ordered list of string frames forming one message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameSet {
    frames: VecDeque<String>,
}

impl FrameSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn push_back(&mut self, frame: impl Into<String>) {
        self.frames.push_back(frame.into());
    }

    pub fn push_front(&mut self, frame: impl Into<String>) {
        self.frames.push_front(frame.into());
    }

    pub fn pop_front(&mut self) -> Option<String> {
        self.frames.pop_front()
    }

    pub fn front(&self) -> Option<&str> {
        self.frames.front().map(String::as_str)
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.frames.get(index).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.frames.iter().map(String::as_str)
    }

    pub fn into_vec(self) -> Vec<String> {
        self.frames.into()
    }

    /// Builder-style [`FrameSet::push_front`].
    #[must_use]
    pub fn with_envelope(mut self, frame: impl Into<String>) -> Self {
        self.push_front(frame);
        self
    }
}

impl<S: Into<String>> FromIterator<S> for FrameSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            frames: iter.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<Vec<String>> for FrameSet {
    fn from(frames: Vec<String>) -> Self {
        Self {
            frames: frames.into(),
        }
    }
}

impl<const N: usize> From<[&str; N]> for FrameSet {
    fn from(frames: [&str; N]) -> Self {
        frames.into_iter().collect()
    }
}

impl IntoIterator for FrameSet {
    type Item = String;
    type IntoIter = std::collections::vec_deque::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.frames.into_iter()
    }
}

/// Build a command message: the tag frame followed by `args`.
pub fn encode<I, S>(command: Command, args: I) -> FrameSet
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut frames: FrameSet = args.into_iter().collect();
    frames.push_front(command.tag());
    frames
}
