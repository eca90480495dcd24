//! Declarative table descriptions loaded from configuration.
//!
//! A schema section maps column names to declared SQLite types, in
//! declaration order. A leading `*` on a column name makes that column part
//! of the (possibly composite) primary key:
//! ```toml
//! [tables.NAE]
//! "*suid" = "TEXT"
//! server_name = "TEXT"
//! chance = "TEXT"
//! ```

use crate::error::{DropkeeperError, Result};
use lazy_static::lazy_static;
use regex::Regex;
use std::path::Path;

lazy_static! {
    static ref IDENTIFIER: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
    static ref DECLARED_TYPE: Regex = Regex::new(r"^[A-Za-z][A-Za-z0-9_ (),]*$").unwrap();
}

/// Marker prefix designating primary-key membership.
pub const PRIMARY_KEY_MARKER: char = '*';

/// Returns true if `name` can be spliced into SQL as a bare identifier.
pub fn is_identifier(name: &str) -> bool {
    IDENTIFIER.is_match(name)
}

/// One declared column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub declared_type: String,
    pub primary_key: bool,
}

impl ColumnDef {
    /// `name TYPE`, as it appears in the generated DDL.
    pub fn definition(&self) -> String {
        format!("{} {}", self.name, self.declared_type)
    }
}

/// Ordered, immutable column list for one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaDescriptor {
    columns: Vec<ColumnDef>,
}

impl SchemaDescriptor {
    /// Build a descriptor from raw `(key, declared type)` pairs, where the key
    /// may carry the primary-key marker.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut columns: Vec<ColumnDef> = Vec::new();

        for (key, declared_type) in pairs {
            let key = key.as_ref().trim();
            let declared_type = declared_type.as_ref().trim();
            let primary_key = key.starts_with(PRIMARY_KEY_MARKER);
            let name = key.trim_start_matches(PRIMARY_KEY_MARKER);

            if !is_identifier(name) {
                return Err(DropkeeperError::Config(format!(
                    "Invalid column name: '{}'",
                    key
                )));
            }
            if !DECLARED_TYPE.is_match(declared_type) {
                return Err(DropkeeperError::Config(format!(
                    "Invalid declared type for column {}: '{}'",
                    name, declared_type
                )));
            }
            if columns.iter().any(|c| c.name.eq_ignore_ascii_case(name)) {
                return Err(DropkeeperError::Config(format!(
                    "Duplicate column name: '{}'",
                    name
                )));
            }

            columns.push(ColumnDef {
                name: name.to_string(),
                declared_type: declared_type.to_string(),
                primary_key,
            });
        }

        Ok(Self { columns })
    }

    /// Read the named section out of a parsed `[tables]` map.
    pub fn from_section(tables: &toml::Table, section: &str) -> Result<Self> {
        Self::from_section_in(tables, section, "configuration")
    }

    fn from_section_in(tables: &toml::Table, section: &str, source_name: &str) -> Result<Self> {
        let table = tables
            .get(section)
            .ok_or_else(|| DropkeeperError::ConfigSectionMissing {
                section: section.to_string(),
                source_name: source_name.to_string(),
            })?
            .as_table()
            .ok_or_else(|| {
                DropkeeperError::Config(format!("Section {} is not a table", section))
            })?;

        let mut pairs = Vec::with_capacity(table.len());
        for (key, value) in table {
            let declared_type = value.as_str().ok_or_else(|| {
                DropkeeperError::Config(format!(
                    "Declared type for {}.{} must be a string",
                    section, key
                ))
            })?;
            pairs.push((key.as_str(), declared_type));
        }

        Self::from_pairs(pairs)
    }

    /// Load a schema section from a standalone TOML file whose top-level
    /// tables are schema sections.
    pub fn load(path: &Path, section: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let tables: toml::Table = toml::from_str(&content).map_err(|e| {
            DropkeeperError::Parse(format!("Failed to parse schema file {:?}: {}", path, e))
        })?;
        Self::from_section_in(&tables, section, &path.display().to_string())
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    /// `(columnDefinition, isPrimaryKey)` pairs in declaration order.
    pub fn entries(&self) -> Vec<(String, bool)> {
        self.columns
            .iter()
            .map(|c| (c.definition(), c.primary_key))
            .collect()
    }

    pub fn primary_key(&self) -> impl Iterator<Item = &str> {
        self.columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.as_str())
    }

    pub fn contains(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c.name.eq_ignore_ascii_case(column))
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// The `CREATE TABLE IF NOT EXISTS` statement for `table`.
    pub fn create_table_sql(&self, table: &str) -> String {
        let mut parts: Vec<String> = self.columns.iter().map(ColumnDef::definition).collect();

        let key: Vec<&str> = self.primary_key().collect();
        if !key.is_empty() {
            parts.push(format!("PRIMARY KEY ({})", key.join(", ")));
        }

        format!("CREATE TABLE IF NOT EXISTS {} ({})", table, parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tables(content: &str) -> toml::Table {
        toml::from_str(content).unwrap()
    }

    #[test]
    fn test_marker_is_stripped_and_order_kept() {
        let t = tables(
            r#"
            [people]
            "*name" = "TEXT"
            age = "INTEGER"
            "*city" = "TEXT"
            height = "REAL"
            "#,
        );
        let schema = SchemaDescriptor::from_section(&t, "people").unwrap();
        assert_eq!(
            schema.entries(),
            vec![
                ("name TEXT".to_string(), true),
                ("age INTEGER".to_string(), false),
                ("city TEXT".to_string(), true),
                ("height REAL".to_string(), false),
            ]
        );
        assert_eq!(schema.primary_key().collect::<Vec<_>>(), vec!["name", "city"]);
    }

    #[test]
    fn test_missing_section() {
        let t = tables("[people]\nname = \"TEXT\"\n");
        let err = SchemaDescriptor::from_section(&t, "pets").unwrap_err();
        assert!(matches!(err, DropkeeperError::ConfigSectionMissing { ref section, .. } if section == "pets"));
    }

    #[test]
    fn test_create_table_sql_with_composite_key() {
        let schema =
            SchemaDescriptor::from_pairs([("*a", "TEXT"), ("b", "REAL"), ("*c", "INTEGER")]).unwrap();
        assert_eq!(
            schema.create_table_sql("t"),
            "CREATE TABLE IF NOT EXISTS t (a TEXT, b REAL, c INTEGER, PRIMARY KEY (a, c))"
        );
    }

    #[test]
    fn test_create_table_sql_without_key() {
        let schema = SchemaDescriptor::from_pairs([("a", "TEXT"), ("b", "TEXT")]).unwrap();
        assert_eq!(schema.create_table_sql("t"), "CREATE TABLE IF NOT EXISTS t (a TEXT, b TEXT)");
    }

    #[test]
    fn test_rejects_unsafe_names_and_types() {
        assert!(SchemaDescriptor::from_pairs([("a; DROP", "TEXT")]).is_err());
        assert!(SchemaDescriptor::from_pairs([("a", "TEXT); DROP TABLE x; --")]).is_err());
        assert!(SchemaDescriptor::from_pairs([("a", "TEXT"), ("A", "TEXT")]).is_err());
        assert!(SchemaDescriptor::from_pairs([("a", "INTEGER NOT NULL")]).is_ok());
    }

    #[test]
    fn test_non_string_type_rejected() {
        let t = tables("[people]\nage = 3\n");
        assert!(matches!(
            SchemaDescriptor::from_section(&t, "people"),
            Err(DropkeeperError::Config(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tables.toml");
        std::fs::write(&path, "[testtable]\n\"*name\" = \"TEXT\"\nage = \"TEXT\"\n").unwrap();

        let schema = SchemaDescriptor::load(&path, "testtable").unwrap();
        assert_eq!(schema.columns().len(), 2);
        assert!(schema.contains("AGE"));

        let err = SchemaDescriptor::load(&path, "other").unwrap_err();
        assert!(err.to_string().contains("tables.toml"));
    }
}
