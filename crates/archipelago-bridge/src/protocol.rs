//! Archipelago network protocol packets
//!
//! Every WebSocket text frame carries a JSON array of packets, each an object
//! tagged by its `cmd` field. Only the packets a text-only chat client needs
//! are modelled; anything else decodes as `ServerPacket::Unknown`.

use chat_relay_core::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

/// Protocol version announced at login
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkVersion {
    pub major: u32,
    pub minor: u32,
    pub build: u32,
    #[serde(default = "version_class")]
    pub class: String,
}

fn version_class() -> String {
    "Version".to_string()
}

impl NetworkVersion {
    pub fn new(major: u32, minor: u32, build: u32) -> Self {
        Self {
            major,
            minor,
            build,
            class: version_class(),
        }
    }
}

impl Default for NetworkVersion {
    fn default() -> Self {
        Self::new(0, 5, 0)
    }
}

/// A player in the multiworld
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkPlayer {
    pub team: i64,
    pub slot: i64,
    #[serde(default)]
    pub alias: String,
    #[serde(default)]
    pub name: String,
}

impl NetworkPlayer {
    /// Alias when set, otherwise the slot name
    pub fn display_name(&self) -> &str {
        if self.alias.is_empty() {
            &self.name
        } else {
            &self.alias
        }
    }
}

/// Static slot information from `Connected`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSlot {
    pub name: String,
    pub game: String,
}

/// One fragment of a `PrintJSON` message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonMessagePart {
    #[serde(default)]
    pub text: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Owning slot for item and location parts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player: Option<i64>,
}

/// Name tables for one game
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameData {
    #[serde(default)]
    pub item_name_to_id: HashMap<String, i64>,
    #[serde(default)]
    pub location_name_to_id: HashMap<String, i64>,
    #[serde(default)]
    pub checksum: Option<String>,
}

/// Payload of a `DataPackage` packet
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataPackageContents {
    #[serde(default)]
    pub games: HashMap<String, GameData>,
}

/// Server -> client packets
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "cmd")]
pub enum ServerPacket {
    RoomInfo {
        #[serde(default)]
        version: Option<NetworkVersion>,
        #[serde(default)]
        password: bool,
        #[serde(default)]
        games: Vec<String>,
        #[serde(default)]
        seed_name: String,
    },
    Connected {
        team: i64,
        slot: i64,
        #[serde(default)]
        players: Vec<NetworkPlayer>,
        #[serde(default)]
        slot_info: HashMap<String, NetworkSlot>,
    },
    ConnectionRefused {
        #[serde(default)]
        errors: Vec<String>,
    },
    RoomUpdate {
        #[serde(default)]
        players: Option<Vec<NetworkPlayer>>,
    },
    DataPackage {
        data: DataPackageContents,
    },
    #[serde(rename = "PrintJSON")]
    PrintJson {
        data: Vec<JsonMessagePart>,
        #[serde(rename = "type", default)]
        kind: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

/// Client -> server packets
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "cmd")]
pub enum ClientPacket {
    Connect {
        password: String,
        game: String,
        name: String,
        uuid: String,
        version: NetworkVersion,
        items_handling: u8,
        tags: Vec<String>,
        slot_data: bool,
    },
    Say {
        text: String,
    },
    GetDataPackage {
        games: Vec<String>,
    },
}

/// Encode packets as one frame
pub fn encode(packets: &[ClientPacket]) -> Result<String> {
    serde_json::to_string(packets).map_err(Into::into)
}

/// Decode one frame.
///
/// The frame must be a JSON array; individual packets that fail to decode
/// are skipped with a warning.
pub fn decode(frame: &str) -> Result<Vec<ServerPacket>> {
    let values: Vec<serde_json::Value> = serde_json::from_str(frame)
        .map_err(|e| BridgeError::Protocol(format!("Frame is not a packet array: {}", e)))?;

    Ok(values
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<ServerPacket>(value) {
            Ok(packet) => Some(packet),
            Err(e) => {
                warn!("Skipping malformed packet: {}", e);
                None
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_info() {
        let frame = r#"[{"cmd":"RoomInfo","version":{"major":0,"minor":5,"build":1,"class":"Version"},"generator_version":{"major":0,"minor":5,"build":1,"class":"Version"},"tags":["AP"],"password":false,"permissions":{"release":2,"collect":2,"remaining":2},"hint_cost":10,"location_check_points":1,"games":["A Link to the Past","Archipelago"],"datapackage_checksums":{},"seed_name":"4242","time":1700000000.0}]"#;

        let packets = decode(frame).unwrap();
        assert_eq!(packets.len(), 1);
        match &packets[0] {
            ServerPacket::RoomInfo {
                version,
                password,
                games,
                seed_name,
            } => {
                assert_eq!(version.as_ref().unwrap().minor, 5);
                assert!(!password);
                assert_eq!(games.len(), 2);
                assert_eq!(seed_name, "4242");
            }
            other => panic!("Wrong packet: {:?}", other),
        }
    }

    #[test]
    fn test_connected_and_refused() {
        let frame = r#"[{"cmd":"Connected","team":0,"slot":1,"players":[{"team":0,"slot":1,"alias":"Runner","name":"Runner","class":"NetworkPlayer"}],"missing_locations":[],"checked_locations":[],"slot_info":{"1":{"name":"Runner","game":"A Link to the Past","type":1,"group_members":[],"class":"NetworkSlot"}},"hint_points":0},{"cmd":"ConnectionRefused","errors":["InvalidSlot"]}]"#;

        let packets = decode(frame).unwrap();
        match &packets[0] {
            ServerPacket::Connected {
                slot,
                players,
                slot_info,
                ..
            } => {
                assert_eq!(*slot, 1);
                assert_eq!(players[0].display_name(), "Runner");
                assert_eq!(slot_info["1"].game, "A Link to the Past");
            }
            other => panic!("Wrong packet: {:?}", other),
        }
        match &packets[1] {
            ServerPacket::ConnectionRefused { errors } => assert_eq!(errors, &["InvalidSlot"]),
            other => panic!("Wrong packet: {:?}", other),
        }
    }

    #[test]
    fn test_print_json_and_unknown() {
        let frame = r#"[{"cmd":"Bounced","data":{}},{"cmd":"PrintJSON","type":"Chat","data":[{"text":"Runner2: nice find"}],"team":0,"slot":2,"message":"nice find"}]"#;

        let packets = decode(frame).unwrap();
        assert!(matches!(packets[0], ServerPacket::Unknown));
        match &packets[1] {
            ServerPacket::PrintJson { data, kind } => {
                assert_eq!(kind.as_deref(), Some("Chat"));
                assert_eq!(data[0].text, "Runner2: nice find");
            }
            other => panic!("Wrong packet: {:?}", other),
        }
    }

    #[test]
    fn test_malformed_packet_skipped() {
        let frame = r#"[{"cmd":"Connected","team":"zero"},{"cmd":"ConnectionRefused"}]"#;
        let packets = decode(frame).unwrap();
        assert_eq!(packets.len(), 1);
        assert!(decode("{\"cmd\":\"RoomInfo\"}").is_err());
    }

    #[test]
    fn test_connect_encoding() {
        let frame = encode(&[ClientPacket::Connect {
            password: String::new(),
            game: String::new(),
            name: "Runner".into(),
            uuid: "abc".into(),
            version: NetworkVersion::default(),
            items_handling: 0,
            tags: vec!["TextOnly".into()],
            slot_data: false,
        }])
        .unwrap();

        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value[0]["cmd"], "Connect");
        assert_eq!(value[0]["name"], "Runner");
        assert_eq!(value[0]["version"]["class"], "Version");
        assert_eq!(value[0]["tags"][0], "TextOnly");
    }

    #[test]
    fn test_say_encoding() {
        let frame = encode(&[ClientPacket::Say {
            text: "Bob: gg".into(),
        }])
        .unwrap();
        assert_eq!(frame, r#"[{"cmd":"Say","text":"Bob: gg"}]"#);
    }
}
