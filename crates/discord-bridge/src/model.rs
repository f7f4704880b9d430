//! Discord gateway and REST payloads
//!
//! Only the fields the bridge reads are modelled; everything else is ignored
//! on deserialization.

use chat_relay_server::command::{CommandSchema, OptionKind};
use serde::{Deserialize, Serialize};

/// Gateway opcodes
pub mod opcode {
    pub const DISPATCH: u8 = 0;
    pub const HEARTBEAT: u8 = 1;
    pub const IDENTIFY: u8 = 2;
    pub const RECONNECT: u8 = 7;
    pub const INVALID_SESSION: u8 = 9;
    pub const HELLO: u8 = 10;
    pub const HEARTBEAT_ACK: u8 = 11;
}

/// Gateway intents
pub mod intents {
    pub const GUILDS: u64 = 1 << 0;
    pub const GUILD_MESSAGES: u64 = 1 << 9;
    pub const MESSAGE_CONTENT: u64 = 1 << 15;

    /// Intents the relay needs: thread lifecycle, thread messages and their text
    pub const RELAY: u64 = GUILDS | GUILD_MESSAGES | MESSAGE_CONTENT;
}

/// Close codes after which reconnecting cannot help
pub fn is_fatal_close(code: u16) -> bool {
    matches!(code, 4004 | 4010 | 4011 | 4012 | 4013 | 4014)
}

/// Envelope of every gateway frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayPayload {
    pub op: u8,
    #[serde(default)]
    pub d: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
}

impl GatewayPayload {
    pub fn heartbeat(seq: Option<u64>) -> Self {
        Self {
            op: opcode::HEARTBEAT,
            d: serde_json::json!(seq),
            s: None,
            t: None,
        }
    }

    pub fn identify(token: &str, intents: u64) -> Self {
        Self {
            op: opcode::IDENTIFY,
            d: serde_json::json!({
                "token": token,
                "intents": intents,
                "properties": {
                    "os": std::env::consts::OS,
                    "browser": "chat-relay",
                    "device": "chat-relay"
                }
            }),
            s: None,
            t: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Hello {
    pub heartbeat_interval: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub bot: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PartialApplication {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Ready {
    pub user: User,
    pub application: PartialApplication,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageCreate {
    pub channel_id: String,
    pub author: User,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub webhook_id: Option<String>,
}

impl MessageCreate {
    /// Messages from bots and webhooks never reach the relay
    pub fn is_automated(&self) -> bool {
        self.author.bot || self.webhook_id.is_some()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThreadDelete {
    pub id: String,
    #[serde(default)]
    pub parent_id: Option<String>,
}

/// Interaction type for slash commands
pub const APPLICATION_COMMAND: u8 = 2;

#[derive(Debug, Clone, Deserialize)]
pub struct Interaction {
    pub id: String,
    pub application_id: String,
    #[serde(rename = "type")]
    pub kind: u8,
    pub token: String,
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde(default)]
    pub data: Option<InteractionData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InteractionData {
    pub name: String,
    #[serde(default)]
    pub options: Vec<InteractionOption>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InteractionOption {
    pub name: String,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
}

impl InteractionData {
    /// Options as a name -> value object
    pub fn options_map(&self) -> serde_json::Value {
        self.options
            .iter()
            .filter_map(|o| o.value.clone().map(|v| (o.name.clone(), v)))
            .collect::<serde_json::Map<_, _>>()
            .into()
    }
}

/// Application command option types
mod option_type {
    pub const STRING: u8 = 3;
    pub const INTEGER: u8 = 4;
}

/// Discord registration body for a command
pub fn command_json(schema: &CommandSchema) -> serde_json::Value {
    let options: Vec<serde_json::Value> = schema
        .options
        .iter()
        .map(|o| {
            serde_json::json!({
                "name": o.name,
                "description": o.description,
                "type": match o.kind {
                    OptionKind::Integer => option_type::INTEGER,
                    OptionKind::String => option_type::STRING,
                },
                "required": o.required,
            })
        })
        .collect();

    serde_json::json!({
        "name": schema.name,
        "description": schema.description,
        "type": 1,
        "options": options,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chat_relay_server::connect_command;

    #[test]
    fn test_interaction_options() {
        let json = r#"{"id":"111","application_id":"222","type":2,"token":"tok","channel_id":"333","data":{"id":"9","name":"connect","type":1,"options":[{"name":"port","type":4,"value":38281},{"name":"slotname","type":3,"value":"Runner"}]}}"#;

        let interaction: Interaction = serde_json::from_str(json).unwrap();
        assert_eq!(interaction.kind, APPLICATION_COMMAND);
        let data = interaction.data.unwrap();
        assert_eq!(data.name, "connect");
        assert_eq!(
            data.options_map(),
            serde_json::json!({"port": 38281, "slotname": "Runner"})
        );
    }

    #[test]
    fn test_message_create() {
        let json = r#"{"id":"1","channel_id":"thread-9","author":{"id":"5","username":"Runner2","discriminator":"0"},"content":"nice find","webhook_id":null}"#;
        let msg: MessageCreate = serde_json::from_str(json).unwrap();
        assert_eq!(msg.author.username, "Runner2");
        assert!(!msg.is_automated());

        let bot = r#"{"channel_id":"t","author":{"id":"6","username":"bridge","bot":true},"content":"x"}"#;
        let msg: MessageCreate = serde_json::from_str(bot).unwrap();
        assert!(msg.is_automated());
    }

    #[test]
    fn test_command_json() {
        let json = command_json(&connect_command("TreZapalooza", "trezapalooza.com"));
        assert_eq!(json["name"], "connect");
        assert_eq!(json["options"][0]["type"], 4);
        assert_eq!(json["options"][0]["required"], true);
        assert_eq!(json["options"][1]["name"], "slotname");
        assert_eq!(json["options"][1]["type"], 3);
        assert_eq!(json["options"][2]["required"], false);
    }

    #[test]
    fn test_gateway_frames() {
        let hb = serde_json::to_value(GatewayPayload::heartbeat(Some(42))).unwrap();
        assert_eq!(hb, serde_json::json!({"op": 1, "d": 42}));

        let identify = GatewayPayload::identify("secret", intents::RELAY);
        assert_eq!(identify.d["intents"], 33281);

        let hello: GatewayPayload =
            serde_json::from_str(r#"{"op":10,"d":{"heartbeat_interval":41250},"s":null,"t":null}"#)
                .unwrap();
        let hello: Hello = serde_json::from_value(hello.d).unwrap();
        assert_eq!(hello.heartbeat_interval, 41250);

        assert!(is_fatal_close(4004));
        assert!(!is_fatal_close(4000));
    }
}
