//! Discord bot: gateway dispatches in, relay events out

use crate::gateway::{Dispatch, Gateway, GatewayConfig};
use crate::model::{
    APPLICATION_COMMAND, Interaction, MessageCreate, Ready, ThreadDelete, command_json,
};
use crate::platform::InteractionResponder;
use crate::rest::DiscordRest;
use chat_relay_core::{BridgeError, ChannelId, Result, ThreadId};
use chat_relay_server::{CommandSchema, PlatformEvent};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Dispatches buffered between the gateway and the bot
const DISPATCH_BUFFER: usize = 256;

/// Discord side of the bridge
pub struct DiscordBot {
    rest: Arc<DiscordRest>,
    gateway: GatewayConfig,
    commands: Vec<CommandSchema>,
}

impl DiscordBot {
    pub fn new(
        rest: Arc<DiscordRest>,
        gateway: GatewayConfig,
        commands: Vec<CommandSchema>,
    ) -> Self {
        Self {
            rest,
            gateway,
            commands,
        }
    }

    /// Run the gateway and forward relay events until `shutdown` fires, the
    /// gateway fails for good, or `events` is closed
    pub async fn run(
        self,
        events: mpsc::Sender<PlatformEvent>,
        shutdown: CancellationToken,
    ) -> Result<()> {
        let stop = shutdown.child_token();
        let (tx, mut rx) = mpsc::channel(DISPATCH_BUFFER);
        let gateway = tokio::spawn(Gateway::new(self.gateway.clone()).run(tx, stop.clone()));

        while let Some(dispatch) = rx.recv().await {
            if dispatch.name == "READY" {
                self.on_ready(dispatch.data).await;
                continue;
            }

            if let Some(event) = translate(&dispatch, &self.rest) {
                debug!("Platform event: {:?}", event);
                if events.send(event).await.is_err() {
                    info!("Relay stopped listening, shutting down gateway");
                    stop.cancel();
                    break;
                }
            }
        }

        gateway
            .await
            .map_err(|e| BridgeError::Platform(format!("Gateway task failed: {}", e)))?
    }

    async fn on_ready(&self, data: serde_json::Value) {
        let ready: Ready = match serde_json::from_value(data) {
            Ok(ready) => ready,
            Err(e) => {
                warn!("Malformed READY payload: {}", e);
                return;
            }
        };
        info!("Logged in as {} ({})", ready.user.username, ready.user.id);

        let commands: Vec<serde_json::Value> = self.commands.iter().map(command_json).collect();
        match self
            .rest
            .register_commands(&ready.application.id, &commands)
            .await
        {
            Ok(()) => info!("Registered {} slash command(s)", commands.len()),
            Err(e) => error!("Failed to register slash commands: {}", e),
        }
    }
}

/// Map one dispatch onto a relay event; dispatches the relay does not care
/// about yield `None`
pub fn translate(dispatch: &Dispatch, rest: &Arc<DiscordRest>) -> Option<PlatformEvent> {
    match dispatch.name.as_str() {
        "MESSAGE_CREATE" => {
            let message: MessageCreate = parse(dispatch)?;
            Some(PlatformEvent::Message {
                thread_id: ThreadId::new(message.channel_id.clone()),
                is_bot: message.is_automated(),
                author_label: message.author.username,
                text: message.content,
            })
        }
        "INTERACTION_CREATE" => {
            let interaction: Interaction = parse(dispatch)?;
            if interaction.kind != APPLICATION_COMMAND {
                return None;
            }
            let data = interaction.data?;
            let channel = interaction.channel_id?;
            let responder = InteractionResponder::new(
                rest.clone(),
                interaction.application_id,
                interaction.id,
                interaction.token,
            );
            Some(PlatformEvent::Command {
                options: data.options_map(),
                name: data.name,
                channel: ChannelId::new(channel),
                responder: Box::new(responder),
            })
        }
        "THREAD_DELETE" => {
            let deleted: ThreadDelete = parse(dispatch)?;
            Some(PlatformEvent::ThreadDeleted {
                thread_id: ThreadId::new(deleted.id),
            })
        }
        _ => None,
    }
}

fn parse<T: serde::de::DeserializeOwned>(dispatch: &Dispatch) -> Option<T> {
    serde_json::from_value(dispatch.data.clone())
        .map_err(|e| warn!("Malformed {} payload: {}", dispatch.name, e))
        .ok()
}
