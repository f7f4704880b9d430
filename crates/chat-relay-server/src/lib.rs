//! # chat-relay-server
//!
//! Session bridging between a chat platform and a game-coordination server.
//!
//! This crate provides:
//! - `RemoteSession` / `RemoteConnector` traits for game-server adapters
//! - `ChatPlatform` / `CommandResponder` traits for chat adapters
//! - `RelayChannel` for echo suppression and author prefixing
//! - `SessionRegistry` keyed by thread id
//! - `LifecycleController` for connect, relay and teardown
//! - `EventDispatcher` for ordered per-thread event handling

pub mod channel;
pub mod command;
pub mod controller;
pub mod dispatch;
pub mod platform;
pub mod registry;
pub mod remote;

#[cfg(test)]
mod testing;

pub use channel::RelayChannel;
pub use command::{CONNECT_COMMAND, CommandSchema, connect_command};
pub use controller::{ConnectOutcome, ControllerConfig, LifecycleController};
pub use dispatch::EventDispatcher;
pub use platform::{ChatPlatform, CommandResponder, PlatformEvent};
pub use registry::{BindGuard, RegistryError, Session, SessionRegistry};
pub use remote::{RemoteConnector, RemoteEvent, RemoteSession};

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Chat relay server
pub struct RelayServer {
    controller: Arc<LifecycleController>,
}

impl RelayServer {
    /// Create a new server over the given collaborators
    pub fn new(
        connector: Arc<dyn RemoteConnector>,
        platform: Arc<dyn ChatPlatform>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            controller: LifecycleController::new(connector, platform, config),
        }
    }

    /// Handle platform events until the stream ends or `shutdown` fires
    pub async fn run(self, events: mpsc::Receiver<PlatformEvent>, shutdown: CancellationToken) {
        EventDispatcher::new(self.controller).run(events, shutdown).await;
    }

    /// Get the lifecycle controller
    pub fn controller(&self) -> &Arc<LifecycleController> {
        &self.controller
    }

    /// Get the connect command schema for registration with the platform
    pub fn connect_command(&self) -> CommandSchema {
        let config = self.controller.config();
        connect_command(&config.server_label, &config.default_host)
    }
}
