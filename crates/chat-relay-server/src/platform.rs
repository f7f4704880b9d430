//! Chat-platform collaborator traits and events

use async_trait::async_trait;
use chat_relay_core::{ChannelId, Result, ThreadId};
use std::fmt;

/// Outbound calls the relay makes into the chat platform
#[async_trait]
pub trait ChatPlatform: Send + Sync + 'static {
    /// Create a thread under `parent` and return its id
    async fn create_thread(&self, parent: &ChannelId, name: &str, reason: &str)
    -> Result<ThreadId>;

    /// Post plain text into a thread
    async fn send_to_thread(&self, thread_id: &ThreadId, text: &str) -> Result<()>;

    /// How a reply refers to a thread
    fn mention(&self, thread_id: &ThreadId) -> String {
        thread_id.to_string()
    }
}

/// Reply channel for one command invocation
#[async_trait]
pub trait CommandResponder: Send + Sync + 'static {
    /// Acknowledge the command; the final answer follows via `respond`
    async fn defer(&self) -> Result<()>;

    /// Send (or replace the deferred placeholder with) the final answer
    async fn respond(&self, text: &str) -> Result<()>;
}

/// Event delivered by the chat platform
pub enum PlatformEvent {
    /// A slash command was invoked in `channel`
    Command {
        name: String,
        channel: ChannelId,
        /// Option name -> value
        options: serde_json::Value,
        responder: Box<dyn CommandResponder>,
    },
    /// A message was posted in a channel or thread
    Message {
        thread_id: ThreadId,
        author_label: String,
        text: String,
        is_bot: bool,
    },
    /// A thread was deleted
    ThreadDeleted { thread_id: ThreadId },
}

impl fmt::Debug for PlatformEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlatformEvent::Command {
                name,
                channel,
                options,
                ..
            } => f
                .debug_struct("Command")
                .field("name", name)
                .field("channel", channel)
                .field("options", options)
                .finish_non_exhaustive(),
            PlatformEvent::Message {
                thread_id,
                author_label,
                text,
                is_bot,
            } => f
                .debug_struct("Message")
                .field("thread_id", thread_id)
                .field("author_label", author_label)
                .field("text", text)
                .field("is_bot", is_bot)
                .finish(),
            PlatformEvent::ThreadDeleted { thread_id } => f
                .debug_struct("ThreadDeleted")
                .field("thread_id", thread_id)
                .finish(),
        }
    }
}
