//! Remote game-server session traits
//!
//! Implement these to plug a game-coordination protocol into the relay.

use async_trait::async_trait;
use chat_relay_core::{RemoteAddress, Result};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Event emitted by a remote session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteEvent {
    /// One chat line, in the order the server emitted it
    Chat(String),
    /// The connection failed and will not recover
    Closed { reason: String },
}

/// Receiver side handed to the lifecycle controller
pub type EventListener = mpsc::UnboundedSender<RemoteEvent>;

/// A live, logged-in connection to a game-coordination server
#[async_trait]
pub trait RemoteSession: Send + Sync + 'static {
    /// Address this session is connected to
    fn address(&self) -> &RemoteAddress;

    /// Slot name presented at login
    fn slot_name(&self) -> &str;

    /// Deliver one chat line to the server.
    ///
    /// Fails with `BridgeError::Send` when the connection is not
    /// established. Never retries.
    async fn send_chat(&self, text: &str) -> Result<()>;

    /// Install the single inbound listener, replacing any previous one.
    fn on_event(&self, listener: EventListener);

    /// Release the connection. Idempotent; a closed handle returns `Ok`.
    async fn disconnect(&self) -> Result<()>;
}

/// Opens remote sessions
#[async_trait]
pub trait RemoteConnector: Send + Sync + 'static {
    /// Log into `address` as `slot_name`.
    ///
    /// Fails with `BridgeError::Connection` when the server is unreachable,
    /// rejects the slot or the handshake times out.
    async fn connect(
        &self,
        address: &RemoteAddress,
        slot_name: &str,
    ) -> Result<Arc<dyn RemoteSession>>;
}
