//! Archipelago bridge for the chat relay
//!
//! Provides the remote session handle the relay binds to a chat thread:
//!
//! - **Login**: WebSocket connect, `RoomInfo` -> `Connect` -> `Connected`
//! - **Inbound**: `PrintJSON` packets flattened to plain chat lines
//! - **Outbound**: chat lines sent with `Say`
//!
//! The client logs in as a text-only participant and never touches items or
//! locations.

mod client;
pub mod protocol;
pub mod text;

pub use client::{ArchipelagoClient, ArchipelagoConfig, ArchipelagoConnector, candidate_urls};
pub use protocol::{ClientPacket, NetworkVersion, ServerPacket};
pub use text::MessageContext;
