//! Lifecycle controller: connect, relay and teardown
//!
//! Per thread key: `Unbound -> Connecting -> Bound -> Unbound`.
//! - Connect: validate, log into the remote server, create the thread,
//!   register the session, then wire the inbound pump. Nothing is registered
//!   unless every earlier step succeeded.
//! - Relay: thread messages go out through the bound channel, remote lines
//!   come in through the pump.
//! - Teardown: thread deletion or a fatal remote close removes the session
//!   and disconnects its handle exactly once.
//!
//! Every failure is caught here and turned into a log line or a user-facing
//! reply; nothing propagates past the event that triggered it.

use crate::channel::RelayChannel;
use crate::command::{CONNECT_COMMAND, parse_connect_options};
use crate::platform::{ChatPlatform, CommandResponder};
use crate::registry::{RegistryError, Session, SessionRegistry};
use crate::remote::{RemoteConnector, RemoteEvent, RemoteSession};
use chat_relay_core::{
    BridgeError, ChannelId, ChatEvent, ConnectRequest, DEFAULT_HOST, RemoteAddress, Result,
    ThreadId,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Controller settings
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Host used when a connect request leaves it out
    pub default_host: String,
    /// Product name shown to users
    pub server_label: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            default_host: DEFAULT_HOST.to_string(),
            server_label: "TreZapalooza".to_string(),
        }
    }
}

/// Result of a successful connect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOutcome {
    pub thread_id: ThreadId,
    pub address: RemoteAddress,
    pub slot_name: String,
}

/// Drives the session registry and relay channels
pub struct LifecycleController {
    registry: Arc<SessionRegistry>,
    connector: Arc<dyn RemoteConnector>,
    platform: Arc<dyn ChatPlatform>,
    config: ControllerConfig,
}

impl LifecycleController {
    /// Create a controller with an empty registry
    pub fn new(
        connector: Arc<dyn RemoteConnector>,
        platform: Arc<dyn ChatPlatform>,
        config: ControllerConfig,
    ) -> Arc<Self> {
        Self::with_registry(Arc::new(SessionRegistry::new()), connector, platform, config)
    }

    /// Create a controller over an existing registry
    pub fn with_registry(
        registry: Arc<SessionRegistry>,
        connector: Arc<dyn RemoteConnector>,
        platform: Arc<dyn ChatPlatform>,
        config: ControllerConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            connector,
            platform,
            config,
        })
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Handle a command invocation end to end, replying through `responder`
    pub async fn on_command(
        self: &Arc<Self>,
        name: &str,
        channel: &ChannelId,
        options: &serde_json::Value,
        responder: &dyn CommandResponder,
    ) {
        if name != CONNECT_COMMAND {
            debug!("Ignoring unknown command: {}", name);
            return;
        }

        if let Err(e) = responder.defer().await {
            warn!("Failed to defer command reply: {}", e);
        }

        let result = match parse_connect_options(options) {
            Ok(request) => self.connect(channel, &request).await,
            Err(e) => Err(e),
        };

        let reply = match result {
            Ok(outcome) => format!(
                "Connected to {} at {} as {}. A thread has been created: {}",
                self.config.server_label,
                outcome.address,
                outcome.slot_name,
                self.platform.mention(&outcome.thread_id)
            ),
            Err(e) => {
                warn!("Connect from channel {} failed: {}", channel, e);
                format!("Failed to connect: {}", e)
            }
        };

        if let Err(e) = responder.respond(&reply).await {
            warn!("Failed to send command reply: {}", e);
        }
    }

    /// Open a remote session and bind it to a freshly created thread
    pub async fn connect(
        self: &Arc<Self>,
        parent: &ChannelId,
        request: &ConnectRequest,
    ) -> Result<ConnectOutcome> {
        let target = request.validate(&self.config.default_host)?;
        let _bind = self.registry.begin_bind();
        info!(
            "Connecting to {} as {} (requested in {})",
            target.address, target.slot_name, parent
        );

        let handle = self
            .connector
            .connect(&target.address, &target.slot_name)
            .await
            .map_err(|e| match e {
                BridgeError::Connection(_) => e,
                other => BridgeError::Connection(other.to_string()),
            })?;

        let reason = format!(
            "{} session: {} as {}",
            self.config.server_label, target.address, target.slot_name
        );
        let thread_id = match self
            .platform
            .create_thread(parent, &target.thread_name(), &reason)
            .await
        {
            Ok(id) => id,
            Err(e) => {
                release(handle.as_ref()).await;
                return Err(match e {
                    BridgeError::ThreadCreation(_) => e,
                    other => BridgeError::ThreadCreation(other.to_string()),
                });
            }
        };

        let channel = Arc::new(RelayChannel::new(
            thread_id.clone(),
            handle.clone(),
            self.platform.clone(),
            self.config.server_label.clone(),
        ));
        let subscription = CancellationToken::new();
        let session = Session::new(channel, subscription.clone());

        match self.registry.create(session) {
            Ok(_) => {}
            Err(RegistryError::Retired(_)) => {
                warn!(thread = %thread_id, "Thread deleted before its session was bound");
                release(handle.as_ref()).await;
                return Err(BridgeError::ThreadCreation(format!(
                    "Thread {} was deleted before the session was bound",
                    thread_id
                )));
            }
            Err(e @ RegistryError::AlreadyBound(_)) => {
                error!("Session registry invariant violated: {}", e);
                release(handle.as_ref()).await;
                return Err(BridgeError::DuplicateSession(thread_id.to_string()));
            }
        }

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        handle.on_event(event_tx);
        tokio::spawn(Arc::clone(self).pump(thread_id.clone(), event_rx, subscription));

        info!(
            thread = %thread_id,
            "Session bound to {} as {}", target.address, target.slot_name
        );

        Ok(ConnectOutcome {
            thread_id,
            address: target.address,
            slot_name: target.slot_name,
        })
    }

    /// Relay a chat-platform message posted in `thread_id`.
    ///
    /// Bot-authored messages and unbound threads are ignored.
    pub async fn on_message(
        &self,
        thread_id: &ThreadId,
        author_label: &str,
        text: &str,
        is_bot: bool,
    ) -> Result<()> {
        if is_bot {
            return Ok(());
        }
        let Some(session) = self.registry.get(thread_id) else {
            return Ok(());
        };

        let event = ChatEvent::from_thread(thread_id.clone(), author_label, text);
        session.channel().relay(&event).await
    }

    /// Tear down the session of a deleted thread
    pub async fn on_thread_deleted(&self, thread_id: &ThreadId) -> bool {
        self.teardown(thread_id).await
    }

    /// Tear down a session whose remote connection failed for good,
    /// telling the thread first
    pub async fn on_remote_closed(&self, thread_id: &ThreadId, reason: &str) -> bool {
        if !self.registry.contains(thread_id) {
            return false;
        }

        warn!(thread = %thread_id, "Remote connection lost: {}", reason);
        let notice = format!(
            "Connection to the {} server was lost: {}",
            self.config.server_label, reason
        );
        if let Err(e) = self.platform.send_to_thread(thread_id, &notice).await {
            debug!(thread = %thread_id, "Could not post disconnect notice: {}", e);
        }

        self.teardown(thread_id).await
    }

    /// Tear down every bound session
    pub async fn shutdown(&self) {
        for thread_id in self.registry.thread_ids() {
            self.teardown(&thread_id).await;
        }
    }

    async fn teardown(&self, thread_id: &ThreadId) -> bool {
        let Some(session) = self.registry.remove(thread_id) else {
            return false;
        };

        session.subscription().cancel();
        release(session.handle().as_ref()).await;
        info!("Session closed for thread {}", thread_id);
        true
    }

    /// Forward remote events for one session in the order received
    async fn pump(
        self: Arc<Self>,
        thread_id: ThreadId,
        mut events: mpsc::UnboundedReceiver<RemoteEvent>,
        subscription: CancellationToken,
    ) {
        loop {
            let event = tokio::select! {
                biased;
                _ = subscription.cancelled() => break,
                event = events.recv() => event,
            };

            match event {
                Some(RemoteEvent::Chat(line)) => {
                    let Some(session) = self.registry.get(&thread_id) else {
                        debug!(thread = %thread_id, "Session gone, dropping remote chat");
                        break;
                    };
                    let event = ChatEvent::from_remote(session.remote_address.clone(), line);
                    if let Err(e) = session.channel().relay(&event).await {
                        warn!(thread = %thread_id, "Failed to post remote chat: {}", e);
                    }
                }
                Some(RemoteEvent::Closed { reason }) => {
                    self.on_remote_closed(&thread_id, &reason).await;
                    break;
                }
                None => {
                    self.on_remote_closed(&thread_id, "event stream ended").await;
                    break;
                }
            }
        }

        debug!(thread = %thread_id, "Inbound pump stopped");
    }
}

/// Best-effort disconnect; failures are only logged
async fn release(handle: &dyn RemoteSession) {
    if let Err(e) = handle.disconnect().await {
        warn!("Error disconnecting from {}: {}", handle.address(), e);
    }
}
