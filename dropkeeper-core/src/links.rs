//! Associations between chat display names and remote player identifiers.

use crate::database::{Filter, QueryOutcome, Table};
use crate::error::{DropkeeperError, Result};
use crate::models::PlayerLink;
use rusqlite::types::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    Created,
    Updated,
}

/// Store `link`, replacing the identifiers of an existing link with the same
/// display name.
pub fn link_player(table: &Table, link: &PlayerLink) -> Result<LinkOutcome> {
    if link.display_name.trim().is_empty() {
        return Err(DropkeeperError::Validation("display name is empty".to_string()));
    }
    if link.steam_id.trim().is_empty() && link.eos_id.trim().is_empty() {
        return Err(DropkeeperError::Validation(format!(
            "no identifiers given for {}",
            link.display_name
        )));
    }

    match find_link(table, &link.display_name)? {
        Some(_) => {
            table.update(
                &[
                    ("steam_id", Value::Text(link.steam_id.clone())),
                    ("eos_id", Value::Text(link.eos_id.clone())),
                ],
                &Filter::eq("display_name", link.display_name.clone()),
            )?;
            tracing::info!(display_name = %link.display_name, "Updated player link");
            Ok(LinkOutcome::Updated)
        }
        None => {
            table.insert(&PlayerLink::COLUMNS, &link.values())?;
            tracing::info!(display_name = %link.display_name, "Created player link");
            Ok(LinkOutcome::Created)
        }
    }
}

pub fn find_link(table: &Table, display_name: &str) -> Result<Option<PlayerLink>> {
    match table.select("*", Some(&Filter::eq("display_name", display_name.to_string()))) {
        QueryOutcome::Rows(rows) => Ok(rows.first().and_then(PlayerLink::from_row)),
        QueryOutcome::Empty => Ok(None),
        QueryOutcome::Failure(reason) => Err(DropkeeperError::Query(reason)),
    }
}

pub fn unlink_player(table: &Table, display_name: &str) -> Result<bool> {
    Ok(table.delete("display_name", display_name.to_string())? > 0)
}
