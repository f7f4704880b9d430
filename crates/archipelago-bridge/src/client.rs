//! Archipelago WebSocket client
//!
//! Logs into a room as a text-only client, relays `PrintJSON` traffic as
//! plain chat lines and sends chat with `Say`.

use crate::protocol::{ClientPacket, NetworkVersion, ServerPacket, decode, encode};
use crate::text::MessageContext;
use async_trait::async_trait;
use chat_relay_core::{BridgeError, RemoteAddress, Result};
use chat_relay_server::remote::{EventListener, RemoteConnector, RemoteEvent, RemoteSession};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};
use uuid::Uuid;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Events kept while no listener is installed
const BACKLOG_LIMIT: usize = 256;

/// Configuration for Archipelago connections
#[derive(Debug, Clone)]
pub struct ArchipelagoConfig {
    /// Limit on the whole login handshake
    pub connect_timeout: Duration,
    /// Room password, empty for none
    pub password: String,
    /// Client tags announced at login
    pub tags: Vec<String>,
    /// Protocol version announced at login
    pub version: NetworkVersion,
}

impl Default for ArchipelagoConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(15),
            password: String::new(),
            tags: vec!["TextOnly".to_string()],
            version: NetworkVersion::default(),
        }
    }
}

/// URLs to try for an address: explicit schemes as given, otherwise secure
/// first with a plain fallback
pub fn candidate_urls(address: &RemoteAddress) -> Vec<String> {
    let host = &address.host;
    if host.starts_with("ws://") || host.starts_with("wss://") {
        vec![format!("{}:{}", host, address.port)]
    } else {
        vec![
            format!("wss://{}:{}", host, address.port),
            format!("ws://{}:{}", host, address.port),
        ]
    }
}

#[derive(Default)]
struct ListenerSlot {
    listener: Option<EventListener>,
    backlog: VecDeque<RemoteEvent>,
}

/// State shared between the client and its reader task
struct Shared {
    slot: Mutex<ListenerSlot>,
    context: RwLock<MessageContext>,
    closed: AtomicBool,
}

impl Shared {
    fn new() -> Self {
        Self {
            slot: Mutex::new(ListenerSlot::default()),
            context: RwLock::new(MessageContext::new()),
            closed: AtomicBool::new(false),
        }
    }

    fn emit(&self, event: RemoteEvent) {
        let mut slot = self.slot.lock();
        let mut event = event;

        if let Some(tx) = slot.listener.as_ref() {
            match tx.send(event) {
                Ok(()) => return,
                Err(mpsc::error::SendError(returned)) => event = returned,
            }
            slot.listener = None;
        }

        if slot.backlog.len() >= BACKLOG_LIMIT {
            slot.backlog.pop_front();
        }
        slot.backlog.push_back(event);
    }

    fn set_listener(&self, listener: EventListener) {
        let mut slot = self.slot.lock();
        while let Some(event) = slot.backlog.pop_front() {
            if let Err(mpsc::error::SendError(event)) = listener.send(event) {
                slot.backlog.push_front(event);
                return;
            }
        }
        slot.listener = Some(listener);
    }

    fn handle(&self, packet: ServerPacket) {
        match packet {
            ServerPacket::PrintJson { data, kind } => {
                let line = self.context.read().render(&data);
                debug!("[Archipelago] {:?}: {}", kind, line);
                self.emit(RemoteEvent::Chat(line));
            }
            ServerPacket::DataPackage { data } => {
                debug!("Loaded data package for {} games", data.games.len());
                self.context.write().add_data_package(&data);
            }
            ServerPacket::RoomUpdate {
                players: Some(players),
            } => {
                self.context.write().update_players(&players);
            }
            _ => {}
        }
    }
}

/// A logged-in Archipelago session
pub struct ArchipelagoClient {
    address: RemoteAddress,
    slot_name: String,
    writer: tokio::sync::Mutex<Option<WsSink>>,
    shared: Arc<Shared>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl ArchipelagoClient {
    /// Connect and log in, failing with `BridgeError::Connection`
    pub async fn login(
        address: &RemoteAddress,
        slot_name: &str,
        config: &ArchipelagoConfig,
    ) -> Result<Self> {
        info!("Connecting to Archipelago at {} as {}", address, slot_name);

        match tokio::time::timeout(
            config.connect_timeout,
            Self::handshake(address, slot_name, config),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(BridgeError::Connection(format!(
                "Timed out connecting to {} after {}s",
                address,
                config.connect_timeout.as_secs_f32()
            ))),
        }
    }

    async fn handshake(
        address: &RemoteAddress,
        slot_name: &str,
        config: &ArchipelagoConfig,
    ) -> Result<Self> {
        let socket = open_socket(address).await?;
        let (mut sink, mut source) = socket.split();
        let shared = Arc::new(Shared::new());

        // Server speaks first
        let games = loop {
            let mut games = None;
            for packet in next_packets(&mut source).await? {
                match packet {
                    ServerPacket::RoomInfo {
                        games: room_games,
                        seed_name,
                        password,
                        ..
                    } => {
                        debug!(
                            "RoomInfo: seed={} games={} password={}",
                            seed_name,
                            room_games.len(),
                            password
                        );
                        games = Some(room_games);
                    }
                    other => shared.handle(other),
                }
            }
            if let Some(games) = games {
                break games;
            }
        };

        let login = encode(&[
            ClientPacket::GetDataPackage { games },
            ClientPacket::Connect {
                password: config.password.clone(),
                game: String::new(),
                name: slot_name.to_string(),
                uuid: Uuid::new_v4().to_string(),
                version: config.version.clone(),
                items_handling: 0,
                tags: config.tags.clone(),
                slot_data: false,
            },
        ])?;
        sink.send(Message::Text(login))
            .await
            .map_err(|e| BridgeError::Connection(format!("Failed to send login: {}", e)))?;

        loop {
            let mut connected = false;
            for packet in next_packets(&mut source).await? {
                match packet {
                    ServerPacket::Connected {
                        team,
                        slot,
                        players,
                        slot_info,
                    } => {
                        info!("Logged into {} as {} (slot {})", address, slot_name, slot);
                        shared
                            .context
                            .write()
                            .set_connected(team, &players, &slot_info);
                        connected = true;
                    }
                    ServerPacket::ConnectionRefused { errors } => {
                        let reason = if errors.is_empty() {
                            "no reason given".to_string()
                        } else {
                            errors.join(", ")
                        };
                        return Err(BridgeError::Connection(format!(
                            "Connection refused by server: {}",
                            reason
                        )));
                    }
                    other => shared.handle(other),
                }
            }
            if connected {
                break;
            }
        }

        let reader = tokio::spawn(reader_task(source, shared.clone()));

        Ok(Self {
            address: address.clone(),
            slot_name: slot_name.to_string(),
            writer: tokio::sync::Mutex::new(Some(sink)),
            shared,
            reader: Mutex::new(Some(reader)),
        })
    }

    /// Whether the connection is still up
    pub fn is_connected(&self) -> bool {
        !self.shared.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteSession for ArchipelagoClient {
    fn address(&self) -> &RemoteAddress {
        &self.address
    }

    fn slot_name(&self) -> &str {
        &self.slot_name
    }

    async fn send_chat(&self, text: &str) -> Result<()> {
        if !self.is_connected() {
            return Err(BridgeError::Send("Not connected".into()));
        }

        let frame = encode(&[ClientPacket::Say {
            text: text.to_string(),
        }])
        .map_err(|e| BridgeError::Send(e.to_string()))?;

        let mut guard = self.writer.lock().await;
        let sink = guard
            .as_mut()
            .ok_or_else(|| BridgeError::Send("Not connected".into()))?;
        sink.send(Message::Text(frame))
            .await
            .map_err(|e| BridgeError::Send(format!("WebSocket send failed: {}", e)))
    }

    fn on_event(&self, listener: EventListener) {
        self.shared.set_listener(listener);
    }

    async fn disconnect(&self) -> Result<()> {
        let already_closed = self.shared.closed.swap(true, Ordering::SeqCst);
        if let Some(reader) = self.reader.lock().take() {
            reader.abort();
        }

        let Some(mut sink) = self.writer.lock().await.take() else {
            return Ok(());
        };
        if already_closed {
            return Ok(());
        }

        let result = sink
            .close()
            .await
            .map_err(|e| BridgeError::Disconnect(format!("{}: {}", self.address, e)));
        info!("Disconnected from Archipelago at {}", self.address);
        result
    }
}

impl Drop for ArchipelagoClient {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.get_mut().take() {
            reader.abort();
        }
    }
}

/// Opens Archipelago sessions
#[derive(Debug, Clone, Default)]
pub struct ArchipelagoConnector {
    config: ArchipelagoConfig,
}

impl ArchipelagoConnector {
    pub fn new(config: ArchipelagoConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl RemoteConnector for ArchipelagoConnector {
    async fn connect(
        &self,
        address: &RemoteAddress,
        slot_name: &str,
    ) -> Result<Arc<dyn RemoteSession>> {
        let client = ArchipelagoClient::login(address, slot_name, &self.config).await?;
        Ok(Arc::new(client))
    }
}

async fn open_socket(address: &RemoteAddress) -> Result<WsStream> {
    let mut last_error = String::new();

    for url in candidate_urls(address) {
        debug!("Trying {}", url);
        match connect_async(url.as_str()).await {
            Ok((socket, _response)) => return Ok(socket),
            Err(e) => {
                debug!("{} failed: {}", url, e);
                last_error = e.to_string();
            }
        }
    }

    Err(BridgeError::Connection(format!(
        "Unable to reach {}: {}",
        address, last_error
    )))
}

async fn next_packets(source: &mut WsSource) -> Result<Vec<ServerPacket>> {
    loop {
        match source.next().await {
            Some(Ok(Message::Text(frame))) => {
                return decode(&frame).map_err(|e| BridgeError::Connection(e.to_string()));
            }
            Some(Ok(Message::Close(_))) | None => {
                return Err(BridgeError::Connection(
                    "Server closed the connection during login".into(),
                ));
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                return Err(BridgeError::Connection(format!("WebSocket error: {}", e)));
            }
        }
    }
}

/// Drain the read half until the socket ends, then report the loss once
async fn reader_task(mut source: WsSource, shared: Arc<Shared>) {
    let reason = loop {
        match source.next().await {
            Some(Ok(Message::Text(frame))) => match decode(&frame) {
                Ok(packets) => {
                    for packet in packets {
                        shared.handle(packet);
                    }
                }
                Err(e) => warn!("Dropping frame: {}", e),
            },
            Some(Ok(Message::Close(frame))) => {
                break frame
                    .map(|f| f.reason.to_string())
                    .filter(|r| !r.is_empty())
                    .unwrap_or_else(|| "server closed the connection".to_string());
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => break e.to_string(),
            None => break "connection closed".to_string(),
        }
    };

    if !shared.closed.swap(true, Ordering::SeqCst) {
        warn!("Archipelago connection lost: {}", reason);
        shared.emit(RemoteEvent::Closed { reason });
    }
}
