//! # Discord Bridge
//!
//! Discord adapter for the chat relay.
//!
//! - [`DiscordBot`] keeps a gateway session alive and turns dispatches into
//!   relay `PlatformEvent`s, registering slash commands once the session is
//!   ready.
//! - [`DiscordPlatform`] creates threads and posts messages over REST.
//! - [`InteractionResponder`] answers slash commands, deferring first when
//!   the relay needs time.

pub mod bot;
pub mod gateway;
pub mod model;
pub mod platform;
pub mod reconnect;
pub mod rest;

pub use bot::{DiscordBot, translate};
pub use gateway::{Dispatch, Gateway, GatewayConfig};
pub use platform::{DiscordPlatform, InteractionResponder, channel_mention};
pub use reconnect::Backoff;
pub use rest::DiscordRest;
