//! Bridge configuration file

use chat_relay_core::{BridgeError, DEFAULT_HOST, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Default location of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = "config.json";

/// Environment variable that overrides `token`
pub const TOKEN_ENV: &str = "BRIDGE_TOKEN";

const READ_ERROR: &str = "Error reading config.json. Please create it with a 'token' property.";
const MISSING_TOKEN: &str = "The config.json file is missing a 'token' property.";

/// Configuration for the bridge binary
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Discord bot token
    pub token: String,
    pub default_host: String,
    pub connect_timeout: Duration,
    pub log_level: String,
    pub server_label: String,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    token: Option<String>,
    #[serde(default = "default_host")]
    default_host: String,
    #[serde(default = "default_timeout")]
    connect_timeout_secs: u64,
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default = "default_label")]
    server_label: String,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_timeout() -> u64 {
    15
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_label() -> String {
    "TreZapalooza".to_string()
}

impl BridgeConfig {
    /// Read the file at `path`; a non-empty `token_override` replaces its token
    pub fn load(path: &Path, token_override: Option<String>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|_| BridgeError::Config(READ_ERROR.to_string()))?;
        Self::parse(&contents, token_override)
    }

    pub fn parse(contents: &str, token_override: Option<String>) -> Result<Self> {
        let raw: RawConfig = serde_json::from_str(contents)
            .map_err(|_| BridgeError::Config(READ_ERROR.to_string()))?;

        let token = token_override
            .filter(|t| !t.trim().is_empty())
            .or(raw.token.filter(|t| !t.trim().is_empty()))
            .ok_or_else(|| BridgeError::Config(MISSING_TOKEN.to_string()))?;

        let default_host = if raw.default_host.trim().is_empty() {
            default_host()
        } else {
            raw.default_host
        };

        Ok(Self {
            token,
            default_host,
            connect_timeout: Duration::from_secs(raw.connect_timeout_secs.max(1)),
            log_level: raw.log_level,
            server_label: raw.server_label,
        })
    }
}
