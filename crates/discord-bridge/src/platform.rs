//! Relay collaborators backed by the Discord REST API

use crate::rest::DiscordRest;
use async_trait::async_trait;
use chat_relay_core::{BridgeError, ChannelId, Result, ThreadId};
use chat_relay_server::{ChatPlatform, CommandResponder};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// `ChatPlatform` over Discord threads
pub struct DiscordPlatform {
    rest: Arc<DiscordRest>,
}

impl DiscordPlatform {
    pub fn new(rest: Arc<DiscordRest>) -> Self {
        Self { rest }
    }
}

#[async_trait]
impl ChatPlatform for DiscordPlatform {
    async fn create_thread(
        &self,
        parent: &ChannelId,
        name: &str,
        reason: &str,
    ) -> Result<ThreadId> {
        self.rest
            .create_thread(parent.as_str(), name, reason)
            .await
            .map(ThreadId::new)
            .map_err(|e| BridgeError::ThreadCreation(e.to_string()))
    }

    async fn send_to_thread(&self, thread_id: &ThreadId, text: &str) -> Result<()> {
        self.rest.send_message(thread_id.as_str(), text).await
    }

    fn mention(&self, thread_id: &ThreadId) -> String {
        channel_mention(thread_id)
    }
}

/// Discord markup linking to a channel or thread
pub fn channel_mention(thread_id: &ThreadId) -> String {
    format!("<#{}>", thread_id)
}

/// Replies to one slash command interaction.
///
/// Replies are ephemeral. After `defer` the answer edits the placeholder;
/// otherwise it is sent as the initial response.
pub struct InteractionResponder {
    rest: Arc<DiscordRest>,
    application_id: String,
    interaction_id: String,
    token: String,
    deferred: AtomicBool,
}

impl InteractionResponder {
    pub fn new(
        rest: Arc<DiscordRest>,
        application_id: impl Into<String>,
        interaction_id: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            rest,
            application_id: application_id.into(),
            interaction_id: interaction_id.into(),
            token: token.into(),
            deferred: AtomicBool::new(false),
        }
    }

    pub fn is_deferred(&self) -> bool {
        self.deferred.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CommandResponder for InteractionResponder {
    async fn defer(&self) -> Result<()> {
        if self.deferred.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let result = self
            .rest
            .defer_interaction(&self.interaction_id, &self.token, true)
            .await;
        if result.is_err() {
            self.deferred.store(false, Ordering::SeqCst);
        }
        result
    }

    async fn respond(&self, text: &str) -> Result<()> {
        if self.is_deferred() {
            self.rest
                .edit_original_response(&self.application_id, &self.token, text)
                .await
        } else {
            self.rest
                .reply_interaction(&self.interaction_id, &self.token, text, true)
                .await
        }
    }
}
