//! Discord gateway connection
//!
//! Keeps one gateway session alive: Hello, Identify, heartbeats, and a fresh
//! session after every drop. Dispatches are forwarded untouched; turning
//! them into relay events is the bot's job.

use crate::model::{GatewayPayload, Hello, intents, is_fatal_close, opcode};
use crate::reconnect::Backoff;
use chat_relay_core::{BridgeError, Result};
use futures_util::{SinkExt, Stream, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// Public gateway endpoint
pub const GATEWAY_URL: &str = "wss://gateway.discord.gg/?v=10&encoding=json";

/// A dispatch event (`op` 0) from the gateway
#[derive(Debug, Clone)]
pub struct Dispatch {
    pub name: String,
    pub data: serde_json::Value,
}

/// Gateway connection settings
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub url: String,
    pub token: String,
    pub intents: u64,
    /// Limit on waiting for Hello after the socket opens
    pub hello_timeout: Duration,
}

impl GatewayConfig {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            url: GATEWAY_URL.to_string(),
            token: token.into(),
            intents: intents::RELAY,
            hello_timeout: Duration::from_secs(10),
        }
    }
}

/// How one gateway session ended
#[derive(Debug, PartialEq, Eq)]
enum SessionEnd {
    /// Start a new session; `ready` tells whether this one reached READY
    Reconnect { ready: bool },
    /// Discord refused us for good
    Fatal(u16),
    /// Shutdown requested or nobody listens for dispatches anymore
    Stopped,
}

/// Gateway client
pub struct Gateway {
    config: GatewayConfig,
    backoff: Backoff,
}

impl Gateway {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            backoff: Backoff::default(),
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Run sessions until `shutdown` fires, the receiver is dropped, or
    /// Discord closes with a non-recoverable code
    pub async fn run(
        mut self,
        dispatches: mpsc::Sender<Dispatch>,
        shutdown: CancellationToken,
    ) -> Result<()> {
        loop {
            if shutdown.is_cancelled() {
                return Ok(());
            }

            match self.session(&dispatches, &shutdown).await {
                Ok(SessionEnd::Stopped) => {
                    info!("Gateway stopped");
                    return Ok(());
                }
                Ok(SessionEnd::Fatal(code)) => {
                    error!("Gateway closed with fatal code {}", code);
                    return Err(BridgeError::Platform(format!(
                        "Discord gateway closed with code {}",
                        code
                    )));
                }
                Ok(SessionEnd::Reconnect { ready }) => {
                    if ready {
                        self.backoff.reset();
                    }
                    info!("Gateway session ended, reconnecting");
                }
                Err(e) => {
                    warn!(
                        "Gateway session failed (attempt {}): {:#}",
                        self.backoff.failures() + 1,
                        e
                    );
                }
            }

            let delay = self.backoff.next_delay();
            debug!("Reconnecting in {:?}", delay);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.cancelled() => return Ok(()),
            }
        }
    }

    /// One connection: Hello, Identify, then the event loop
    async fn session(
        &self,
        dispatches: &mpsc::Sender<Dispatch>,
        shutdown: &CancellationToken,
    ) -> anyhow::Result<SessionEnd> {
        info!("Connecting to gateway at {}", self.config.url);
        let (ws, _) = tokio_tungstenite::connect_async(&self.config.url).await?;
        let (mut sink, mut stream) = ws.split();

        let hello = tokio::time::timeout(self.config.hello_timeout, wait_for_hello(&mut stream))
            .await
            .map_err(|_| anyhow::anyhow!("timed out waiting for Hello"))??;

        let interval = Duration::from_millis(hello.heartbeat_interval.max(1));
        debug!("Heartbeat interval {:?}", interval);

        let identify = GatewayPayload::identify(&self.config.token, self.config.intents);
        sink.send(Message::Text(serde_json::to_string(&identify)?))
            .await?;

        let mut heartbeat = tokio::time::interval_at(Instant::now() + interval, interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut acked = true;
        let mut seq: Option<u64> = None;
        let mut ready = false;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    let close = CloseFrame {
                        code: CloseCode::Normal,
                        reason: "shutting down".into(),
                    };
                    let _ = sink.send(Message::Close(Some(close))).await;
                    return Ok(SessionEnd::Stopped);
                }
                _ = heartbeat.tick() => {
                    if !acked {
                        warn!("Heartbeat not acknowledged, dropping session");
                        return Ok(SessionEnd::Reconnect { ready });
                    }
                    acked = false;
                    let beat = GatewayPayload::heartbeat(seq);
                    sink.send(Message::Text(serde_json::to_string(&beat)?)).await?;
                    trace!("Heartbeat sent (seq {:?})", seq);
                }
                msg = stream.next() => {
                    let text = match msg {
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Close(frame))) => {
                            let code = frame.map(|f| u16::from(f.code)).unwrap_or(1000);
                            if is_fatal_close(code) {
                                return Ok(SessionEnd::Fatal(code));
                            }
                            info!("Gateway closed the connection ({})", code);
                            return Ok(SessionEnd::Reconnect { ready });
                        }
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => return Err(e.into()),
                        None => return Ok(SessionEnd::Reconnect { ready }),
                    };

                    let payload: GatewayPayload = match serde_json::from_str(&text) {
                        Ok(payload) => payload,
                        Err(e) => {
                            debug!("Ignoring unparseable gateway frame: {}", e);
                            continue;
                        }
                    };

                    match payload.op {
                        opcode::DISPATCH => {
                            if payload.s.is_some() {
                                seq = payload.s;
                            }
                            let Some(name) = payload.t else { continue };
                            if name == "READY" {
                                ready = true;
                                info!("Gateway session ready");
                            }
                            let dispatch = Dispatch { name, data: payload.d };
                            if dispatches.send(dispatch).await.is_err() {
                                return Ok(SessionEnd::Stopped);
                            }
                        }
                        opcode::HEARTBEAT => {
                            let beat = GatewayPayload::heartbeat(seq);
                            sink.send(Message::Text(serde_json::to_string(&beat)?)).await?;
                        }
                        opcode::HEARTBEAT_ACK => acked = true,
                        opcode::RECONNECT => {
                            info!("Gateway asked for a reconnect");
                            return Ok(SessionEnd::Reconnect { ready });
                        }
                        opcode::INVALID_SESSION => {
                            warn!("Gateway invalidated the session");
                            return Ok(SessionEnd::Reconnect { ready });
                        }
                        other => trace!("Ignoring gateway opcode {}", other),
                    }
                }
            }
        }
    }
}

async fn wait_for_hello<S>(stream: &mut S) -> anyhow::Result<Hello>
where
    S: Stream<Item = std::result::Result<Message, WsError>> + Unpin,
{
    while let Some(msg) = stream.next().await {
        if let Message::Text(text) = msg? {
            let payload: GatewayPayload = serde_json::from_str(&text)?;
            if payload.op == opcode::HELLO {
                return Ok(serde_json::from_value(payload.d)?);
            }
        }
    }
    Err(anyhow::anyhow!("gateway closed before Hello"))
}
