//! Connect request validation

use crate::address::RemoteAddress;
use crate::error::{BridgeError, Result};
use serde::de::{self, Deserializer};
use serde::Deserialize;

/// Host used when a connect request does not name one
pub const DEFAULT_HOST: &str = "trezapalooza.com";

/// Raw connect request as submitted by a chat user
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConnectRequest {
    /// Server host (falls back to the configured default)
    #[serde(default)]
    pub host: Option<String>,
    /// Server port; numeric strings are accepted
    #[serde(deserialize_with = "lenient_port")]
    pub port: i64,
    /// Player slot presented to the remote server
    #[serde(rename = "slotname", alias = "slot_name")]
    pub slot_name: String,
}

/// A connect request that passed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectTarget {
    pub address: RemoteAddress,
    pub slot_name: String,
}

impl ConnectRequest {
    pub fn new(host: Option<String>, port: i64, slot_name: impl Into<String>) -> Self {
        Self {
            host,
            port,
            slot_name: slot_name.into(),
        }
    }

    /// Check required fields and resolve the host.
    ///
    /// An empty or whitespace-only host counts as absent.
    pub fn validate(&self, default_host: &str) -> Result<ConnectTarget> {
        let port = u16::try_from(self.port)
            .ok()
            .filter(|p| *p != 0)
            .ok_or_else(|| {
                BridgeError::InvalidRequest(format!("Port must be 1-65535, got {}", self.port))
            })?;

        if self.slot_name.trim().is_empty() {
            return Err(BridgeError::InvalidRequest(
                "Slot name must not be empty".into(),
            ));
        }

        let host = self
            .host
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .unwrap_or(default_host);

        Ok(ConnectTarget {
            address: RemoteAddress::new(host, port),
            slot_name: self.slot_name.clone(),
        })
    }
}

fn lenient_port<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Number(i64),
        Text(String),
    }

    match Port::deserialize(deserializer)? {
        Port::Number(port) => Ok(port),
        Port::Text(text) => text
            .trim()
            .parse()
            .map_err(|_| de::Error::custom(format!("port must be numeric, got '{}'", text))),
    }
}

impl ConnectTarget {
    /// Name of the thread hosting this session: `<host-slug>-<port>-<slot>`
    pub fn thread_name(&self) -> String {
        format!("{}-{}", self.address.slug(), self.slot_name)
    }
}
