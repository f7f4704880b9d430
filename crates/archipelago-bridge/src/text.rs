//! Plain-text rendering of `PrintJSON` messages
//!
//! Player, item and location parts carry numeric ids; they are resolved
//! through the slot table from `Connected` and the data package. Unresolved
//! ids fall back to their literal text.

use crate::protocol::{DataPackageContents, JsonMessagePart, NetworkPlayer, NetworkSlot};
use std::collections::HashMap;

/// Name lookups for the current room
#[derive(Debug, Default)]
pub struct MessageContext {
    team: i64,
    players: HashMap<i64, String>,
    slot_games: HashMap<i64, String>,
    items: HashMap<String, HashMap<i64, String>>,
    locations: HashMap<String, HashMap<i64, String>>,
}

impl MessageContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the slot tables from a `Connected` packet
    pub fn set_connected(
        &mut self,
        team: i64,
        players: &[NetworkPlayer],
        slot_info: &HashMap<String, NetworkSlot>,
    ) {
        self.team = team;
        self.update_players(players);
        for (slot, info) in slot_info {
            if let Ok(slot) = slot.parse::<i64>() {
                self.slot_games.insert(slot, info.game.clone());
                self.players.entry(slot).or_insert_with(|| info.name.clone());
            }
        }
    }

    /// Apply alias changes from `Connected` or `RoomUpdate`
    pub fn update_players(&mut self, players: &[NetworkPlayer]) {
        for player in players.iter().filter(|p| p.team == self.team) {
            self.players
                .insert(player.slot, player.display_name().to_string());
        }
    }

    /// Merge a data package; later packages override earlier ones per game
    pub fn add_data_package(&mut self, data: &DataPackageContents) {
        for (game, tables) in &data.games {
            self.items.insert(
                game.clone(),
                tables
                    .item_name_to_id
                    .iter()
                    .map(|(name, id)| (*id, name.clone()))
                    .collect(),
            );
            self.locations.insert(
                game.clone(),
                tables
                    .location_name_to_id
                    .iter()
                    .map(|(name, id)| (*id, name.clone()))
                    .collect(),
            );
        }
    }

    /// Flatten message parts into one line
    pub fn render(&self, parts: &[JsonMessagePart]) -> String {
        parts.iter().map(|part| self.render_part(part)).collect()
    }

    fn render_part(&self, part: &JsonMessagePart) -> String {
        let resolved = match part.kind.as_deref() {
            Some("player_id") => part
                .text
                .parse::<i64>()
                .ok()
                .and_then(|slot| self.players.get(&slot)),
            Some("item_id") => self.lookup(&self.items, part),
            Some("location_id") => self.lookup(&self.locations, part),
            _ => None,
        };
        resolved.cloned().unwrap_or_else(|| part.text.clone())
    }

    fn lookup<'a>(
        &'a self,
        tables: &'a HashMap<String, HashMap<i64, String>>,
        part: &JsonMessagePart,
    ) -> Option<&'a String> {
        let id = part.text.parse::<i64>().ok()?;
        let game = self.slot_games.get(&part.player?)?;
        tables.get(game)?.get(&id)
    }
}
