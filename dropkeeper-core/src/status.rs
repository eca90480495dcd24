//! Server status summaries built from `ListPlayers` responses.

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;

pub const LIST_PLAYERS: &str = "ListPlayers";

lazy_static! {
    /// `0. Name, 0002c0ffee...`
    static ref PLAYER_LINE: Regex = Regex::new(r"^\s*\d+\.\s").unwrap();
}

/// Number of players listed in a `ListPlayers` response, or `None` when the
/// text is not a player list (e.g. a failure message).
pub fn count_players(response: &str) -> Option<usize> {
    if response.contains("No Players Connected") {
        return Some(0);
    }

    let count = response.lines().filter(|line| PLAYER_LINE.is_match(line)).count();
    if count == 0 && !response.trim().is_empty() {
        return None;
    }
    Some(count)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerStatus {
    pub name: String,
    pub players: Option<usize>,
}

impl ServerStatus {
    pub fn from_response(name: impl Into<String>, response: &str) -> Self {
        Self {
            name: name.into(),
            players: count_players(response),
        }
    }

    pub fn offline(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            players: None,
        }
    }
}

pub fn format_uptime(started_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = (now - started_at).num_seconds().max(0);
    let days = elapsed / 86_400;
    let hours = (elapsed % 86_400) / 3_600;
    let minutes = (elapsed % 3_600) / 60;

    if days > 0 {
        format!("{}d {}h {}m", days, hours, minutes)
    } else {
        format!("{}h {}m", hours, minutes)
    }
}

pub fn render_status(statuses: &[ServerStatus], started_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let mut text = String::from("Server Status\n\n");
    for status in statuses {
        match status.players {
            Some(players) => text.push_str(&format!("{}: Online ({} players)\n", status.name, players)),
            None => text.push_str(&format!("{}: Offline\n", status.name)),
        }
    }

    let online: usize = statuses.iter().filter_map(|s| s.players).sum();
    text.push_str(&format!("\nTotal players: {}\n", online));
    text.push_str(&format!("Bot uptime: {}\n", format_uptime(started_at, now)));
    text.push_str(&format!("Last updated: {}", now.format("%Y-%m-%d %H:%M:%S UTC")));
    text
}
