//! Drop-event ingestion: validate, then persist.

use crate::database::Table;
use crate::error::{DropkeeperError, Result};
use crate::models::DropEvent;

/// Persist `event` if every field is filled in.
///
/// An incomplete event is rejected with [`DropkeeperError::Validation`]
/// before the table is touched.
pub fn ingest_drop(table: &Table, event: &DropEvent) -> Result<()> {
    let missing = event.missing_fields();
    if !missing.is_empty() {
        tracing::warn!(missing = ?missing, event = %event, "Rejected incomplete drop event");
        return Err(DropkeeperError::Validation(format!(
            "drop event is missing {}",
            missing.join(", ")
        )));
    }

    table.insert(&DropEvent::COLUMNS, &event.values())?;
    tracing::info!(
        server = %event.server_name,
        character = %event.character_name,
        item = %event.item_dropped,
        "Recorded item drop"
    );
    Ok(())
}

/// Chat notification text for an event that was not stored.
pub fn failed_insert_notice(event: &DropEvent) -> String {
    format!("Failed Insert: {}", event)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::database::{Filter, QueryOutcome};
    use crate::schema::SchemaDescriptor;

    pub(crate) fn drops_schema() -> SchemaDescriptor {
        SchemaDescriptor::from_pairs([
            ("server_name", "TEXT"),
            ("user_id", "TEXT"),
            ("character_name", "TEXT"),
            ("item_dropped", "TEXT"),
            ("chance", "TEXT"),
            ("dropped_by_dino", "TEXT"),
            ("server_max_level", "TEXT"),
            ("had_4_leaf_clover", "TEXT"),
            ("server_drop_chance", "TEXT"),
            ("*suid", "TEXT"),
        ])
        .unwrap()
    }

    pub(crate) fn sample_event(suid: &str) -> DropEvent {
        DropEvent {
            server_name: "The Island".to_string(),
            user_id: "1001".to_string(),
            character_name: "Rex Rider".to_string(),
            item_dropped: "Ascended Ring".to_string(),
            chance: "0.5".to_string(),
            dropped_by_dino: "Giganotosaurus".to_string(),
            server_max_level: "180".to_string(),
            had_4_leaf_clover: "False".to_string(),
            server_drop_chance: "1 in 200".to_string(),
            suid: suid.to_string(),
        }
    }

    #[test]
    fn test_complete_event_is_stored_field_for_field() {
        let table = Table::open_in_memory("NAE", drops_schema()).unwrap();
        let event = sample_event("abc-1");
        ingest_drop(&table, &event).unwrap();

        let rows = table
            .select("*", Some(&Filter::eq("suid", "abc-1".to_string())))
            .rows()
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(DropEvent::from_row(&rows[0]), Some(event));
    }

    #[test]
    fn test_incomplete_event_writes_nothing() {
        let table = Table::open_in_memory("NAE", drops_schema()).unwrap();
        for field in DropEvent::COLUMNS {
            let mut event = sample_event("abc-2");
            match field {
                "server_name" => event.server_name.clear(),
                "user_id" => event.user_id.clear(),
                "character_name" => event.character_name.clear(),
                "item_dropped" => event.item_dropped.clear(),
                "chance" => event.chance.clear(),
                "dropped_by_dino" => event.dropped_by_dino.clear(),
                "server_max_level" => event.server_max_level.clear(),
                "had_4_leaf_clover" => event.had_4_leaf_clover.clear(),
                "server_drop_chance" => event.server_drop_chance.clear(),
                _ => event.suid.clear(),
            }
            let err = ingest_drop(&table, &event).unwrap_err();
            assert!(matches!(err, DropkeeperError::Validation(ref m) if m.contains(field)));
        }
        assert_eq!(table.select("*", None), QueryOutcome::Empty);
    }

    #[test]
    fn test_duplicate_suid_surfaces_query_error() {
        let table = Table::open_in_memory("NAE", drops_schema()).unwrap();
        ingest_drop(&table, &sample_event("dup")).unwrap();
        assert!(matches!(
            ingest_drop(&table, &sample_event("dup")),
            Err(DropkeeperError::Query(_))
        ));
    }

    #[test]
    fn test_failed_insert_notice() {
        let mut event = sample_event("x");
        event.chance.clear();
        let notice = failed_insert_notice(&event);
        assert!(notice.starts_with("Failed Insert: {"));
        assert!(notice.contains("chance: ''"));
    }
}
