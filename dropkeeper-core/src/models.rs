//! Data models for drop events, leaderboard rows and player links.

use crate::database::Row;
use rusqlite::types::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One reported item drop, as posted by the game mod.
///
/// Every field is text. Absent fields deserialize as empty strings so a
/// partial payload reaches validation instead of being rejected by the
/// JSON layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DropEvent {
    pub server_name: String,
    pub user_id: String,
    pub character_name: String,
    pub item_dropped: String,
    pub chance: String,
    pub dropped_by_dino: String,
    pub server_max_level: String,
    pub had_4_leaf_clover: String,
    pub server_drop_chance: String,
    pub suid: String,
}

impl DropEvent {
    /// Column list of the drops table, in insert order.
    pub const COLUMNS: [&'static str; 10] = [
        "server_name",
        "user_id",
        "character_name",
        "item_dropped",
        "chance",
        "dropped_by_dino",
        "server_max_level",
        "had_4_leaf_clover",
        "server_drop_chance",
        "suid",
    ];

    pub fn fields(&self) -> [(&'static str, &str); 10] {
        [
            ("server_name", self.server_name.as_str()),
            ("user_id", self.user_id.as_str()),
            ("character_name", self.character_name.as_str()),
            ("item_dropped", self.item_dropped.as_str()),
            ("chance", self.chance.as_str()),
            ("dropped_by_dino", self.dropped_by_dino.as_str()),
            ("server_max_level", self.server_max_level.as_str()),
            ("had_4_leaf_clover", self.had_4_leaf_clover.as_str()),
            ("server_drop_chance", self.server_drop_chance.as_str()),
            ("suid", self.suid.as_str()),
        ]
    }

    /// Names of the fields that are empty.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        self.fields()
            .into_iter()
            .filter(|(_, value)| value.is_empty())
            .map(|(name, _)| name)
            .collect()
    }

    pub fn values(&self) -> Vec<Value> {
        self.fields()
            .into_iter()
            .map(|(_, value)| Value::Text(value.to_string()))
            .collect()
    }

    pub fn from_row(row: &Row) -> Option<Self> {
        Some(Self {
            server_name: row.text("server_name")?,
            user_id: row.text("user_id")?,
            character_name: row.text("character_name")?,
            item_dropped: row.text("item_dropped")?,
            chance: row.text("chance")?,
            dropped_by_dino: row.text("dropped_by_dino")?,
            server_max_level: row.text("server_max_level")?,
            had_4_leaf_clover: row.text("had_4_leaf_clover")?,
            server_drop_chance: row.text("server_drop_chance")?,
            suid: row.text("suid")?,
        })
    }
}

impl fmt::Display for DropEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields: Vec<String> = self
            .fields()
            .iter()
            .map(|(name, value)| format!("{}: '{}'", name, value))
            .collect();
        write!(f, "{{{}}}", fields.join(", "))
    }
}

/// Health-check payload sent by the mod.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckEvent {
    pub success: String,
}

/// Per-player drop count, one line of the leaderboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderboardEntry {
    pub user_id: String,
    pub character_name: String,
    pub drop_count: i64,
}

impl LeaderboardEntry {
    pub fn from_row(row: &Row) -> Option<Self> {
        Some(Self {
            user_id: row.text("user_id").unwrap_or_default(),
            character_name: row.text("character_name")?,
            drop_count: row.integer("drop_count")?,
        })
    }
}

/// A chat display name tied to the player's platform identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerLink {
    pub display_name: String,
    pub steam_id: String,
    pub eos_id: String,
}

impl PlayerLink {
    pub const COLUMNS: [&'static str; 3] = ["display_name", "steam_id", "eos_id"];

    pub fn values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.display_name.clone()),
            Value::Text(self.steam_id.clone()),
            Value::Text(self.eos_id.clone()),
        ]
    }

    pub fn from_row(row: &Row) -> Option<Self> {
        Some(Self {
            display_name: row.text("display_name")?,
            steam_id: row.text("steam_id").unwrap_or_default(),
            eos_id: row.text("eos_id").unwrap_or_default(),
        })
    }
}
