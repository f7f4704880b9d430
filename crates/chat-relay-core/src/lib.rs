//! # chat-relay-core
//!
//! Core types and errors for the chat relay bridge.
//!
//! This crate provides the vocabulary shared by every other crate:
//! - Thread and channel identifiers
//! - Remote game-server addresses
//! - Connect request validation
//! - Chat events flowing through a relay
//! - The bridge error taxonomy

pub mod address;
pub mod error;
pub mod event;
pub mod ids;
pub mod request;
pub mod session;

pub use address::RemoteAddress;
pub use error::{BridgeError, Result};
pub use event::{ChatEvent, ChatSource, Direction};
pub use ids::{ChannelId, ThreadId};
pub use request::{ConnectRequest, ConnectTarget, DEFAULT_HOST};
pub use session::SessionState;
