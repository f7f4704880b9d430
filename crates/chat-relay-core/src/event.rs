//! Chat events flowing through a relay
//!
//! A `ChatEvent` is transient: it is built by whichever transport produced
//! the text and consumed by the relay channel in the same reaction.

use crate::address::RemoteAddress;
use crate::ids::ThreadId;

/// Which way a chat event travels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Game server -> chat thread
    Inbound,
    /// Chat thread -> game server
    Outbound,
}

/// Where a chat event originated
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatSource {
    Thread(ThreadId),
    Remote(RemoteAddress),
}

/// One unit of relayed chat
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatEvent {
    pub source: ChatSource,
    /// Author shown to the other side; empty for remote lines, which carry
    /// their own attribution in the text
    pub author_label: String,
    pub text: String,
    pub direction: Direction,
}

impl ChatEvent {
    /// A message typed by a user in a bound thread
    pub fn from_thread(
        thread_id: ThreadId,
        author_label: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            source: ChatSource::Thread(thread_id),
            author_label: author_label.into(),
            text: text.into(),
            direction: Direction::Outbound,
        }
    }

    /// A chat line emitted by the remote server
    pub fn from_remote(address: RemoteAddress, line: impl Into<String>) -> Self {
        Self {
            source: ChatSource::Remote(address),
            author_label: String::new(),
            text: line.into(),
            direction: Direction::Inbound,
        }
    }
}
