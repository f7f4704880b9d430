//! Connect command schema and option parsing

use chat_relay_core::{BridgeError, ConnectRequest, Result};
use serde::{Deserialize, Serialize};

/// Name of the command that opens a relay session
pub const CONNECT_COMMAND: &str = "connect";

/// Value type of a command option
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionKind {
    Integer,
    String,
}

/// One option of a command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandOption {
    pub name: String,
    pub description: String,
    pub kind: OptionKind,
    pub required: bool,
}

/// Platform-neutral description of a command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandSchema {
    pub name: String,
    pub description: String,
    pub options: Vec<CommandOption>,
}

/// Schema of the connect command
pub fn connect_command(server_label: &str, default_host: &str) -> CommandSchema {
    CommandSchema {
        name: CONNECT_COMMAND.to_string(),
        description: format!("Connect this channel to a {} server", server_label),
        options: vec![
            CommandOption {
                name: "port".into(),
                description: "Server port".into(),
                kind: OptionKind::Integer,
                required: true,
            },
            CommandOption {
                name: "slotname".into(),
                description: "Player slot name".into(),
                kind: OptionKind::String,
                required: true,
            },
            CommandOption {
                name: "host".into(),
                description: format!("Server host, default: {}", default_host),
                kind: OptionKind::String,
                required: false,
            },
        ],
    }
}

/// Build a connect request from an option map such as
/// `{"port": 38281, "slotname": "Runner", "host": "example.com"}`.
///
/// Ports given as numeric strings are accepted.
pub fn parse_connect_options(options: &serde_json::Value) -> Result<ConnectRequest> {
    serde_json::from_value(options.clone())
        .map_err(|e| BridgeError::InvalidRequest(format!("Invalid connect options: {}", e)))
}
