//! Single-table SQLite wrapper.
//!
//! Every logical database name selects both the backing file
//! (`<dir>/<name>.db`) and the one table managed inside it. Each operation
//! runs in its own transaction: committed on success, rolled back on failure.
//! All values are bound as parameters; only identifiers checked against the
//! schema are spliced into SQL text.

use crate::error::{DropkeeperError, Result};
use crate::schema::{SchemaDescriptor, is_identifier};
use rusqlite::types::Value;
use rusqlite::{Connection, params_from_iter};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// One result row, columns in select order.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    values: Vec<(String, Value)>,
}

impl Row {
    pub fn new(values: Vec<(String, Value)>) -> Self {
        Self { values }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(column))
            .map(|(_, value)| value)
    }

    /// Column value as text; numbers are rendered, NULL is `None`.
    pub fn text(&self, column: &str) -> Option<String> {
        match self.get(column)? {
            Value::Text(s) => Some(s.clone()),
            Value::Integer(i) => Some(i.to_string()),
            Value::Real(f) => Some(f.to_string()),
            Value::Null | Value::Blob(_) => None,
        }
    }

    pub fn integer(&self, column: &str) -> Option<i64> {
        match self.get(column)? {
            Value::Integer(i) => Some(*i),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Result of a select: data, no data, or a failure that was rolled back.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    Rows(Vec<Row>),
    Empty,
    Failure(String),
}

impl QueryOutcome {
    pub fn rows(self) -> Option<Vec<Row>> {
        match self {
            QueryOutcome::Rows(rows) => Some(rows),
            _ => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, QueryOutcome::Failure(_))
    }
}

/// WHERE clause with `?` placeholders and the values bound to them, plus
/// optional grouping and ordering.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    clause: String,
    params: Vec<Value>,
    group_by: Option<String>,
    order_by: Option<String>,
}

impl Filter {
    pub fn new(clause: impl Into<String>) -> Self {
        Self {
            clause: clause.into(),
            ..Self::default()
        }
    }

    /// `column = ?` bound to `value`.
    pub fn eq(column: &str, value: impl Into<Value>) -> Self {
        Self::new(format!("{} = ?", column)).bind(value)
    }

    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.params.push(value.into());
        self
    }

    pub fn group_by(mut self, columns: impl Into<String>) -> Self {
        self.group_by = Some(columns.into());
        self
    }

    pub fn order_by(mut self, columns: impl Into<String>) -> Self {
        self.order_by = Some(columns.into());
        self
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    fn has_condition(&self) -> bool {
        !self.clause.trim().is_empty()
    }

    /// SQL suffix starting with a space, or an empty string.
    pub fn to_sql(&self) -> String {
        let mut sql = String::new();
        if self.has_condition() {
            sql.push_str(" WHERE ");
            sql.push_str(self.clause.trim());
        }
        if let Some(group_by) = &self.group_by {
            sql.push_str(" GROUP BY ");
            sql.push_str(group_by);
        }
        if let Some(order_by) = &self.order_by {
            sql.push_str(" ORDER BY ");
            sql.push_str(order_by);
        }
        sql
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFn {
    Min,
    Max,
    Avg,
}

impl AggregateFn {
    fn sql(self) -> &'static str {
        match self {
            AggregateFn::Min => "MIN",
            AggregateFn::Max => "MAX",
            AggregateFn::Avg => "AVG",
        }
    }

    fn label(self) -> &'static str {
        match self {
            AggregateFn::Min => "Minimum",
            AggregateFn::Max => "Maximum",
            AggregateFn::Avg => "Average",
        }
    }
}

/// A single-column aggregate. Displays as `Minimum from age: 3.`
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub function: AggregateFn,
    pub column: String,
    pub value: Value,
}

impl fmt::Display for Aggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} from {}: {}.",
            self.function.label(),
            self.column,
            display_value(&self.value)
        )
    }
}

pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Real(f) => f.to_string(),
        Value::Text(s) => s.clone(),
        Value::Blob(b) => format!("<{} bytes>", b.len()),
    }
}

/// Handle on one logical database: one file, one table.
pub struct Table {
    name: String,
    schema: SchemaDescriptor,
    path: Option<PathBuf>,
    conn: Mutex<Connection>,
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.name)
            .field("path", &self.path)
            .finish()
    }
}

impl Table {
    /// Open (or create) `<dir>/<name>.db` and make sure the table exists.
    /// A failed table creation is logged, not returned.
    pub fn open(dir: &Path, name: &str, schema: SchemaDescriptor) -> Result<Self> {
        check_table_name(name, &schema)?;
        std::fs::create_dir_all(dir)?;

        let path = dir.join(format!("{}.db", name));
        let conn = Connection::open(&path)?;
        tracing::debug!(table = name, path = %path.display(), "Opened database file");

        Ok(Self::with_connection(conn, name, schema, Some(path)))
    }

    /// In-memory variant, mostly for tests.
    pub fn open_in_memory(name: &str, schema: SchemaDescriptor) -> Result<Self> {
        check_table_name(name, &schema)?;
        let conn = Connection::open_in_memory()?;
        Ok(Self::with_connection(conn, name, schema, None))
    }

    fn with_connection(
        conn: Connection,
        name: &str,
        schema: SchemaDescriptor,
        path: Option<PathBuf>,
    ) -> Self {
        let table = Self {
            name: name.to_string(),
            schema,
            path,
            conn: Mutex::new(conn),
        };

        if let Err(e) = table.ensure_table() {
            tracing::error!(table = name, error = %e, "Table creation failed, continuing");
        }

        table
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &SchemaDescriptor {
        &self.schema
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| DropkeeperError::Query(format!("connection for {} is poisoned", self.name)))
    }

    fn check_column(&self, column: &str) -> Result<()> {
        if !is_identifier(column) || !self.schema.contains(column) {
            return Err(DropkeeperError::Validation(format!(
                "Unknown column for {}: '{}'",
                self.name, column
            )));
        }
        Ok(())
    }

    /// Issue `CREATE TABLE IF NOT EXISTS` for the loaded schema.
    pub fn ensure_table(&self) -> Result<()> {
        let sql = self.schema.create_table_sql(&self.name);
        let mut conn = self.connection()?;

        execute_in_transaction(&mut conn, &sql, &[]).map_err(|e| {
            DropkeeperError::SchemaCreation {
                table: self.name.clone(),
                reason: e.to_string(),
            }
        })?;

        tracing::debug!(table = %self.name, "Table ensured");
        Ok(())
    }

    /// `SELECT <columns> FROM <table> [<filter>]`.
    ///
    /// `columns` is a select-list fragment (`*`, `a, b`,
    /// `COUNT(*) AS n`); values belong in the filter.
    pub fn select(&self, columns: &str, filter: Option<&Filter>) -> QueryOutcome {
        let mut sql = format!("SELECT {} FROM {}", columns, self.name);
        let params: &[Value] = match filter {
            Some(filter) => {
                sql.push_str(&filter.to_sql());
                filter.params()
            }
            None => &[],
        };

        let mut conn = match self.connection() {
            Ok(conn) => conn,
            Err(e) => return QueryOutcome::Failure(e.to_string()),
        };

        match fetch_in_transaction(&mut conn, &sql, params) {
            Ok(rows) if rows.is_empty() => {
                tracing::debug!(table = %self.name, "Select returned no data");
                QueryOutcome::Empty
            }
            Ok(rows) => {
                tracing::debug!(table = %self.name, rows = rows.len(), "Select returned rows");
                QueryOutcome::Rows(rows)
            }
            Err(e) => {
                tracing::error!(table = %self.name, error = %e, "Select failed, rolled back");
                QueryOutcome::Failure(e.to_string())
            }
        }
    }

    /// Insert one row. `columns` and `values` pair up positionally.
    pub fn insert(&self, columns: &[&str], values: &[Value]) -> Result<usize> {
        if columns.is_empty() || columns.len() != values.len() {
            return Err(DropkeeperError::Validation(format!(
                "Insert into {} needs matching columns and values ({} vs {})",
                self.name,
                columns.len(),
                values.len()
            )));
        }
        for column in columns {
            self.check_column(column)?;
        }

        let placeholders = vec!["?"; columns.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.name,
            columns.join(", "),
            placeholders
        );

        self.write("Insertion", &sql, values)
    }

    /// Apply the merged assignments to every row matching `filter`. Later
    /// assignments to the same column win.
    pub fn update(&self, assignments: &[(&str, Value)], filter: &Filter) -> Result<usize> {
        if !filter.has_condition() {
            return Err(DropkeeperError::Validation(format!(
                "Update of {} requires a WHERE clause",
                self.name
            )));
        }

        let mut merged: Vec<(&str, Value)> = Vec::new();
        for &(column, ref value) in assignments {
            self.check_column(column)?;
            match merged
                .iter()
                .position(|(existing, _)| existing.eq_ignore_ascii_case(column))
            {
                Some(i) => merged[i].1 = value.clone(),
                None => merged.push((column, value.clone())),
            }
        }
        if merged.is_empty() {
            return Err(DropkeeperError::Validation(format!(
                "Update of {} has nothing to set",
                self.name
            )));
        }

        let set_clause = merged
            .iter()
            .map(|(column, _)| format!("{} = ?", column))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!("UPDATE {} SET {}{}", self.name, set_clause, filter.to_sql());

        let mut params: Vec<Value> = merged.into_iter().map(|(_, value)| value).collect();
        params.extend(filter.params().iter().cloned());

        self.write("Update", &sql, &params)
    }

    /// `DELETE FROM <table> WHERE <column> = ?`.
    pub fn delete(&self, column: &str, value: impl Into<Value>) -> Result<usize> {
        self.check_column(column)?;
        let sql = format!("DELETE FROM {} WHERE {} = ?", self.name, column);
        self.write("Deletion", &sql, &[value.into()])
    }

    pub fn select_min(&self, column: &str) -> Result<Aggregate> {
        self.aggregate(AggregateFn::Min, column)
    }

    pub fn select_max(&self, column: &str) -> Result<Aggregate> {
        self.aggregate(AggregateFn::Max, column)
    }

    pub fn select_avg(&self, column: &str) -> Result<Aggregate> {
        self.aggregate(AggregateFn::Avg, column)
    }

    fn aggregate(&self, function: AggregateFn, column: &str) -> Result<Aggregate> {
        self.check_column(column)?;
        let sql = format!("SELECT {}({}) FROM {}", function.sql(), column, self.name);

        let mut conn = self.connection()?;
        let rows = fetch_in_transaction(&mut conn, &sql, &[]).map_err(|e| {
            tracing::error!(table = %self.name, error = %e, "Selection failed, rolled back");
            DropkeeperError::Query(e.to_string())
        })?;

        let value = rows
            .into_iter()
            .next()
            .and_then(|row| row.values.into_iter().next())
            .map(|(_, value)| value)
            .unwrap_or(Value::Null);

        let aggregate = Aggregate {
            function,
            column: column.to_string(),
            value,
        };
        tracing::info!(table = %self.name, "{}", aggregate);
        Ok(aggregate)
    }

    fn write(&self, operation: &str, sql: &str, params: &[Value]) -> Result<usize> {
        let mut conn = self.connection()?;
        match execute_in_transaction(&mut conn, sql, params) {
            Ok(affected) => {
                tracing::info!(table = %self.name, affected, "{} succeeded", operation);
                Ok(affected)
            }
            Err(e) => {
                tracing::error!(table = %self.name, error = %e, "{} failed, rolled back", operation);
                Err(DropkeeperError::Query(format!("{} failed: {}", operation, e)))
            }
        }
    }
}

fn check_table_name(name: &str, schema: &SchemaDescriptor) -> Result<()> {
    if !is_identifier(name) {
        return Err(DropkeeperError::Config(format!("Invalid table name: '{}'", name)));
    }
    if schema.is_empty() {
        return Err(DropkeeperError::Config(format!("Schema for {} declares no columns", name)));
    }
    Ok(())
}

/// Dropping an uncommitted transaction rolls it back.
fn execute_in_transaction(
    conn: &mut Connection,
    sql: &str,
    params: &[Value],
) -> rusqlite::Result<usize> {
    let tx = conn.transaction()?;
    let affected = tx.execute(sql, params_from_iter(params.iter()))?;
    tx.commit()?;
    Ok(affected)
}

fn fetch_in_transaction(
    conn: &mut Connection,
    sql: &str,
    params: &[Value],
) -> rusqlite::Result<Vec<Row>> {
    let tx = conn.transaction()?;
    let rows = {
        let mut stmt = tx.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

        let mapped = stmt.query_map(params_from_iter(params.iter()), |row| {
            let mut values = Vec::with_capacity(columns.len());
            for (i, name) in columns.iter().enumerate() {
                values.push((name.clone(), row.get::<_, Value>(i)?));
            }
            Ok(Row::new(values))
        })?;

        mapped.collect::<rusqlite::Result<Vec<_>>>()?
    };
    tx.commit()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn people_schema() -> SchemaDescriptor {
        SchemaDescriptor::from_pairs([
            ("*name", "TEXT"),
            ("*city", "TEXT"),
            ("age", "INTEGER"),
            ("height", "REAL"),
            ("nickname", "TEXT"),
        ])
        .unwrap()
    }

    fn people() -> Table {
        Table::open_in_memory("people", people_schema()).unwrap()
    }

    fn text(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    fn table_info(table: &Table) -> Vec<(String, String, i64)> {
        let conn = table.connection().unwrap();
        let mut stmt = conn.prepare("PRAGMA table_info(people)").unwrap();
        let info = stmt
            .query_map([], |row| Ok((row.get(1)?, row.get(2)?, row.get(5)?)))
            .unwrap()
            .collect::<rusqlite::Result<Vec<_>>>()
            .unwrap();
        info
    }

    #[test]
    fn test_ensure_table_twice_keeps_one_table() {
        let table = people();
        table.ensure_table().unwrap();
        table.ensure_table().unwrap();

        let count: i64 = table
            .connection()
            .unwrap()
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'people'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);

        let info = table_info(&table);
        let names: Vec<&str> = info.iter().map(|(n, _, _)| n.as_str()).collect();
        assert_eq!(names, vec!["name", "city", "age", "height", "nickname"]);
        let key: Vec<(&str, i64)> = info
            .iter()
            .filter(|(_, _, pk)| *pk > 0)
            .map(|(n, _, pk)| (n.as_str(), *pk))
            .collect();
        assert_eq!(key, vec![("name", 1), ("city", 2)]);
    }

    #[test]
    fn test_mismatched_existing_table_is_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        {
            let conn = Connection::open(dir.path().join("people.db")).unwrap();
            conn.execute("CREATE TABLE people (other TEXT)", []).unwrap();
        }

        let table = Table::open(dir.path(), "people", people_schema()).unwrap();
        let info = table_info(&table);
        assert_eq!(info.len(), 1);
        assert_eq!(info[0].0, "other");

        // The wrapper stays usable; operations on missing columns fail softly.
        assert!(table.select("name", None).is_failure());
        assert!(table.insert(&["name", "city"], &[text("a"), text("b")]).is_err());
    }

    #[test]
    fn test_insert_then_select_round_trips_primitive_types() {
        let table = people();
        table
            .insert(
                &["name", "city", "age", "height", "nickname"],
                &[text("tester"), text("Lyon"), Value::Integer(3), Value::Real(1.25), Value::Null],
            )
            .unwrap();

        let rows = table
            .select("*", Some(&Filter::eq("name", "tester".to_string())))
            .rows()
            .unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.get("name"), Some(&text("tester")));
        assert_eq!(row.get("city"), Some(&text("Lyon")));
        assert_eq!(row.get("age"), Some(&Value::Integer(3)));
        assert_eq!(row.get("height"), Some(&Value::Real(1.25)));
        assert_eq!(row.get("nickname"), Some(&Value::Null));
    }

    #[test]
    fn test_values_are_bound_not_interpolated() {
        let table = people();
        let hostile = "O'Brien'); DROP TABLE people; --";
        table
            .insert(&["name", "city"], &[text(hostile), text("x")])
            .unwrap();

        let rows = table
            .select("name", Some(&Filter::eq("name", hostile.to_string())))
            .rows()
            .unwrap();
        assert_eq!(rows[0].text("name").as_deref(), Some(hostile));
    }

    #[test]
    fn test_select_distinguishes_empty_and_failure() {
        let table = people();
        assert_eq!(table.select("*", None), QueryOutcome::Empty);
        assert!(table.select("no_such_column", None).is_failure());
        assert!(
            table
                .select("*", Some(&Filter::new("age > ?").bind(1).bind(2)))
                .is_failure()
        );
    }

    #[test]
    fn test_insert_rejects_unknown_columns_and_mismatched_lengths() {
        let table = people();
        assert!(matches!(
            table.insert(&["name", "bogus"], &[text("a"), text("b")]),
            Err(DropkeeperError::Validation(_))
        ));
        assert!(matches!(
            table.insert(&["name"], &[text("a"), text("b")]),
            Err(DropkeeperError::Validation(_))
        ));
    }

    #[test]
    fn test_failed_insert_is_rolled_back() {
        let table = people();
        table.insert(&["name", "city"], &[text("a"), text("b")]).unwrap();
        let err = table
            .insert(&["name", "city"], &[text("a"), text("b")])
            .unwrap_err();
        assert!(matches!(err, DropkeeperError::Query(_)));

        let rows = table.select("*", None).rows().unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_update_merges_assignments_last_wins() {
        let table = people();
        table
            .insert(&["name", "city", "age"], &[text("a"), text("x"), Value::Integer(0)])
            .unwrap();
        table
            .insert(&["name", "city", "age"], &[text("b"), text("x"), Value::Integer(5)])
            .unwrap();

        let affected = table
            .update(
                &[
                    ("nickname", text("first")),
                    ("age", Value::Integer(1)),
                    ("nickname", text("second")),
                ],
                &Filter::new("age = ?").bind(0),
            )
            .unwrap();
        assert_eq!(affected, 1);

        let row = &table
            .select("*", Some(&Filter::eq("name", "a".to_string())))
            .rows()
            .unwrap()[0];
        assert_eq!(row.text("nickname").as_deref(), Some("second"));
        assert_eq!(row.integer("age"), Some(1));
    }

    #[test]
    fn test_update_requires_where_clause() {
        let table = people();
        assert!(table
            .update(&[("age", Value::Integer(1))], &Filter::default())
            .is_err());
    }

    #[test]
    fn test_delete_by_column() {
        let table = people();
        table
            .insert(&["name", "city", "age"], &[text("a"), text("x"), Value::Integer(3)])
            .unwrap();
        table
            .insert(&["name", "city", "age"], &[text("b"), text("x"), Value::Integer(4)])
            .unwrap();

        assert_eq!(table.delete("age", 3).unwrap(), 1);
        let rows = table.select("name", None).rows().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].text("name").as_deref(), Some("b"));
        assert!(table.delete("bogus", 3).is_err());
    }

    #[test]
    fn test_aggregates() {
        let table = people();
        for (name, age) in [("a", 2), ("b", 4), ("c", 9)] {
            table
                .insert(&["name", "city", "age"], &[text(name), text("x"), Value::Integer(age)])
                .unwrap();
        }

        assert_eq!(table.select_min("age").unwrap().to_string(), "Minimum from age: 2.");
        assert_eq!(table.select_max("age").unwrap().to_string(), "Maximum from age: 9.");
        assert_eq!(table.select_avg("age").unwrap().value, Value::Real(5.0));
        assert!(table.select_avg("bogus").is_err());
    }

    #[test]
    fn test_aggregate_of_empty_table_is_null() {
        let table = people();
        assert_eq!(table.select_max("age").unwrap().to_string(), "Maximum from age: NULL.");
    }

    #[test]
    fn test_grouped_select() {
        let table = people();
        for (name, city) in [("a", "x"), ("b", "x"), ("c", "y")] {
            table.insert(&["name", "city"], &[text(name), text(city)]).unwrap();
        }

        let rows = table
            .select(
                "city, COUNT(*) AS n",
                Some(&Filter::new("city LIKE ?").bind("%".to_string()).group_by("city").order_by("city")),
            )
            .rows()
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].integer("n"), Some(2));
        assert_eq!(rows[1].text("city").as_deref(), Some("y"));
    }

    #[test]
    fn test_open_creates_named_file() {
        let dir = tempfile::tempdir().unwrap();
        let table = Table::open(&dir.path().join("data"), "people", people_schema()).unwrap();
        assert_eq!(table.path(), Some(dir.path().join("data").join("people.db").as_path()));
        assert!(table.path().unwrap().exists());

        assert!(Table::open(dir.path(), "bad name", people_schema()).is_err());
    }
}
