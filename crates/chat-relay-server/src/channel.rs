//! Relay channel: one thread bound to one remote session
//!
//! Translates between the two transports' message shapes:
//! - Outbound: `"<author>: <text>"` sent through the remote session
//! - Inbound: remote chat lines posted into the thread, minus echoes

use crate::platform::ChatPlatform;
use crate::remote::RemoteSession;
use chat_relay_core::{BridgeError, ChatEvent, Direction, Result, ThreadId};
use std::sync::Arc;
use tracing::{debug, warn};

/// Whether a remote line looks like the echo of something we sent.
///
/// Matches any line with a non-empty label before the first `": "`. This is
/// lossy: remote chat from other clients has the same shape and is dropped
/// too.
pub fn is_echo(line: &str) -> bool {
    line.split_once(": ")
        .is_some_and(|(label, _)| !label.is_empty())
}

/// Prefix outbound text with its author
pub fn prefix_author(author_label: &str, text: &str) -> String {
    format!("{}: {}", author_label, text)
}

/// Binds one thread to one remote session handle
pub struct RelayChannel {
    thread_id: ThreadId,
    handle: Arc<dyn RemoteSession>,
    platform: Arc<dyn ChatPlatform>,
    /// Server name used in the in-thread send failure notice
    server_label: String,
}

impl RelayChannel {
    pub fn new(
        thread_id: ThreadId,
        handle: Arc<dyn RemoteSession>,
        platform: Arc<dyn ChatPlatform>,
        server_label: impl Into<String>,
    ) -> Self {
        Self {
            thread_id,
            handle,
            platform,
            server_label: server_label.into(),
        }
    }

    pub fn thread_id(&self) -> &ThreadId {
        &self.thread_id
    }

    pub fn handle(&self) -> &Arc<dyn RemoteSession> {
        &self.handle
    }

    /// Route a chat event by direction
    pub async fn relay(&self, event: &ChatEvent) -> Result<()> {
        match event.direction {
            Direction::Inbound => self.forward_inbound(&event.text).await.map(|_| ()),
            Direction::Outbound => self.forward_outbound(&event.author_label, &event.text).await,
        }
    }

    /// Post a remote chat line into the thread.
    ///
    /// Returns `Ok(false)` when the line was suppressed.
    pub async fn forward_inbound(&self, line: &str) -> Result<bool> {
        if is_echo(line) {
            debug!(thread = %self.thread_id, "Suppressed echo: {}", line);
            return Ok(false);
        }
        // Chat platforms reject empty messages
        if line.trim().is_empty() {
            return Ok(false);
        }

        self.platform.send_to_thread(&self.thread_id, line).await?;
        debug!(thread = %self.thread_id, "[Remote→Thread] {}", line);
        Ok(true)
    }

    /// Send a thread message to the remote server as `"<author>: <text>"`.
    ///
    /// A failed send is reported in the thread and returned; it is never
    /// retried and does not end the session.
    pub async fn forward_outbound(&self, author_label: &str, text: &str) -> Result<()> {
        let line = prefix_author(author_label, text);

        match self.handle.send_chat(&line).await {
            Ok(()) => {
                debug!(thread = %self.thread_id, "[Thread→Remote] {}", line);
                Ok(())
            }
            Err(e) => {
                warn!(
                    thread = %self.thread_id,
                    "Failed to send to {}: {}",
                    self.handle.address(),
                    e
                );
                let notice = format!(
                    "Error: Unable to send message to the {} server.",
                    self.server_label
                );
                if let Err(post_err) = self.platform.send_to_thread(&self.thread_id, &notice).await
                {
                    warn!(thread = %self.thread_id, "Failed to post send error: {}", post_err);
                }
                Err(match e {
                    BridgeError::Send(_) => e,
                    other => BridgeError::Send(other.to_string()),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakePlatform, FakeRemote};
    use chat_relay_core::RemoteAddress;
    use std::sync::atomic::Ordering;

    fn channel() -> (RelayChannel, Arc<FakeRemote>, Arc<FakePlatform>) {
        let remote = FakeRemote::new(RemoteAddress::new("example.com", 38281), "Runner");
        let platform = FakePlatform::new();
        let channel = RelayChannel::new(
            ThreadId::new("t1"),
            remote.clone(),
            platform.clone(),
            "TreZapalooza",
        );
        (channel, remote, platform)
    }

    #[test]
    fn test_echo_heuristic() {
        assert!(is_echo("Alice: hello"));
        assert!(is_echo("Runner2: nice find: really"));
        assert!(!is_echo("hello there"));
        assert!(!is_echo(": no label"));
        assert!(!is_echo("time 12:30"));
        // Lossy: genuine chat from other clients is dropped as well
        assert!(is_echo("Server: Player joined"));
    }

    #[tokio::test]
    async fn test_inbound_echo_suppressed() {
        let (channel, _remote, platform) = channel();

        assert!(!channel.forward_inbound("Alice: hello").await.unwrap());
        assert!(platform.posts_in(&ThreadId::new("t1")).is_empty());
    }

    #[tokio::test]
    async fn test_inbound_plain_line_posted_once() {
        let (channel, _remote, platform) = channel();

        assert!(channel.forward_inbound("hello there").await.unwrap());
        assert_eq!(platform.posts_in(&ThreadId::new("t1")), vec!["hello there"]);
    }

    #[tokio::test]
    async fn test_inbound_blank_line_dropped() {
        let (channel, _remote, platform) = channel();

        assert!(!channel.forward_inbound("   ").await.unwrap());
        assert!(platform.posts.lock().is_empty());
    }

    #[tokio::test]
    async fn test_outbound_prefixed() {
        let (channel, remote, _platform) = channel();

        channel.forward_outbound("Bob", "gg").await.unwrap();
        assert_eq!(remote.sent(), vec!["Bob: gg"]);
    }

    #[tokio::test]
    async fn test_outbound_failure_reported_in_thread() {
        let (channel, remote, platform) = channel();
        remote.fail_send.store(true, Ordering::SeqCst);

        let err = channel.forward_outbound("Bob", "gg").await.unwrap_err();
        assert!(matches!(err, BridgeError::Send(_)));
        assert!(remote.sent().is_empty());
        assert_eq!(
            platform.posts_in(&ThreadId::new("t1")),
            vec!["Error: Unable to send message to the TreZapalooza server."]
        );
    }

    #[tokio::test]
    async fn test_relay_routes_by_direction() {
        let (channel, remote, platform) = channel();

        let out = ChatEvent::from_thread(ThreadId::new("t1"), "Bob", "hi");
        channel.relay(&out).await.unwrap();
        let inbound = ChatEvent::from_remote(remote.address().clone(), "Bob found a Sword");
        channel.relay(&inbound).await.unwrap();

        assert_eq!(remote.sent(), vec!["Bob: hi"]);
        assert_eq!(platform.posts_in(&ThreadId::new("t1")), vec!["Bob found a Sword"]);
    }
}
