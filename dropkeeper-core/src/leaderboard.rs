//! Per-server drop leaderboard and per-player drop counts.

use crate::database::{Filter, QueryOutcome, Table};
use crate::models::{DropEvent, LeaderboardEntry};

pub const DEFAULT_LIMIT: usize = 10;

/// Grouped drop counts for every player whose drops match `server_pattern`
/// (a SQL `LIKE` pattern), in table order. `None` when there is no data or
/// the lookup failed.
pub fn fetch_counts(table: &Table, server_pattern: &str) -> Option<Vec<LeaderboardEntry>> {
    let filter = Filter::new("server_name LIKE ?")
        .bind(server_pattern.to_string())
        .group_by("user_id, character_name");

    match table.select("user_id, character_name, COUNT(*) AS drop_count", Some(&filter)) {
        QueryOutcome::Rows(rows) => Some(rows.iter().filter_map(LeaderboardEntry::from_row).collect()),
        QueryOutcome::Empty => None,
        QueryOutcome::Failure(reason) => {
            tracing::warn!(server = server_pattern, reason = %reason, "Leaderboard lookup failed");
            None
        }
    }
}

/// Highest counts first, ties kept in their original order, truncated to
/// `limit` entries.
pub fn rank(mut entries: Vec<LeaderboardEntry>, limit: usize) -> Vec<LeaderboardEntry> {
    entries.sort_by(|a, b| b.drop_count.cmp(&a.drop_count));
    entries.truncate(limit);
    entries
}

pub fn render(server_name: &str, limit: usize, ranked: &[LeaderboardEntry]) -> String {
    if ranked.is_empty() {
        return no_data(server_name);
    }

    let mut response = format!("Top {} Leaderboard for {}:\n", limit, server_name);
    response.push_str("Rank | Player Name | Number of Drops\n\n");
    for (i, entry) in ranked.iter().enumerate() {
        response.push_str(&format!(
            "#{} - {}: {} drops\n",
            i + 1,
            entry.character_name,
            entry.drop_count
        ));
    }
    response
}

fn no_data(server_name: &str) -> String {
    format!("Unable to find data for: {}", server_name)
}

/// Query, rank and render in one step.
pub fn leaderboard_text(table: &Table, server_name: &str, limit: usize) -> String {
    match fetch_counts(table, server_name) {
        Some(entries) => render(server_name, limit, &rank(entries, limit)),
        None => no_data(server_name),
    }
}

/// One-line summary of a player's drops.
pub fn drop_summary(table: &Table, user_id: &str) -> String {
    match table.select("*", Some(&Filter::eq("user_id", user_id.to_string()))) {
        QueryOutcome::Rows(rows) => match rows.first().and_then(DropEvent::from_row) {
            Some(first) => format!(
                "{} has obtained {} drops on {}",
                first.character_name,
                rows.len(),
                first.server_name
            ),
            None => "No data found for the user.".to_string(),
        },
        QueryOutcome::Empty => "No data found for the user.".to_string(),
        QueryOutcome::Failure(reason) => {
            tracing::warn!(user_id, reason = %reason, "Drop count lookup failed");
            "No data found for the user.".to_string()
        }
    }
}
