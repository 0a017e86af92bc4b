//! In-memory session
//!
//! Interprets the subset of CQL this crate emits (CREATE TABLE, DROP TABLE,
//! INSERT, SELECT, DELETE) against tables held in memory. Writes are upserts
//! keyed by the table's primary key, as in the real store. Used as the
//! injected handle in tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::session::{parse_timestamp, CqlSession, CqlValue, RowSet, SessionError};

static CREATE_TABLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)^CREATE\s+TABLE\s+(IF\s+NOT\s+EXISTS\s+)?([\w.]+)\s*\((.*)\)$")
        .expect("valid regex")
});
static DROP_TABLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)^DROP\s+TABLE\s+(IF\s+EXISTS\s+)?([\w.]+)$").expect("valid regex")
});
static INSERT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)^INSERT\s+INTO\s+([\w.]+)\s*\((.*?)\)\s*VALUES\s*\((.*)\)$")
        .expect("valid regex")
});
static SELECT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)^SELECT\s+(.+?)\s+FROM\s+([\w.]+)(?:\s+WHERE\s+(\w+)\s*=\s*(.+))?$")
        .expect("valid regex")
});
static DELETE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)^DELETE\s+FROM\s+([\w.]+)\s+WHERE\s+(\w+)\s*=\s*(.+)$")
        .expect("valid regex")
});
static PRIMARY_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)^PRIMARY\s+KEY\s*(.*)$").expect("valid regex"));
static INLINE_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)\s+PRIMARY\s+KEY$").expect("valid regex"));

#[derive(Debug, Clone)]
struct Table {
    columns: Vec<(String, String)>,
    key: Vec<String>,
    rows: Vec<Vec<CqlValue>>,
}

impl Table {
    fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|(column, _)| column == name)
    }

    fn key_indexes(&self) -> Vec<usize> {
        self.key
            .iter()
            .filter_map(|column| self.column_index(column))
            .collect()
    }
}

#[derive(Debug, Default)]
struct State {
    tables: HashMap<String, Table>,
    statements: Vec<String>,
    failures: Vec<(String, String)>,
    shut_down: bool,
}

/// [`CqlSession`] backed by in-memory tables
#[derive(Debug, Default)]
pub struct MemorySession {
    state: Mutex<State>,
}

impl MemorySession {
    pub fn new() -> Self {
        Self::default()
    }

    /// New session wrapped in an `Arc`, ready to inject into a config
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Fail every statement containing `pattern` with `message`
    pub fn fail_on(&self, pattern: &str, message: &str) {
        self.lock()
            .failures
            .push((pattern.to_string(), message.to_string()));
    }

    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    /// Every statement received, in order
    pub fn statements(&self) -> Vec<String> {
        self.lock().statements.clone()
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.lock().tables.contains_key(&name.to_lowercase())
    }

    /// Number of rows currently stored in a table
    pub fn row_count(&self, name: &str) -> Option<usize> {
        self.lock()
            .tables
            .get(&name.to_lowercase())
            .map(|table| table.rows.len())
    }

    pub fn is_shut_down(&self) -> bool {
        self.lock().shut_down
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn run(state: &mut State, statement: &str) -> Result<RowSet, SessionError> {
        let statement = statement.trim().trim_end_matches(';').trim();

        if let Some(caps) = CREATE_TABLE.captures(statement) {
            return Self::create_table(state, caps.get(1).is_some(), &caps[2], &caps[3]);
        }
        if let Some(caps) = DROP_TABLE.captures(statement) {
            let name = caps[2].to_lowercase();
            if state.tables.remove(&name).is_none() && caps.get(1).is_none() {
                return Err(SessionError::new(format!("unconfigured table {}", name)));
            }
            return Ok(RowSet::empty());
        }
        if let Some(caps) = INSERT.captures(statement) {
            return Self::insert(state, &caps[1], &caps[2], &caps[3]);
        }
        if let Some(caps) = SELECT.captures(statement) {
            let filter = match (caps.get(3), caps.get(4)) {
                (Some(column), Some(value)) => Some((column.as_str(), value.as_str())),
                _ => None,
            };
            return Self::select(state, &caps[1], &caps[2], filter);
        }
        if let Some(caps) = DELETE.captures(statement) {
            return Self::delete(state, &caps[1], &caps[2], &caps[3]);
        }

        Err(SessionError::new(format!(
            "line 1:0 no viable alternative at input '{}'",
            statement
        )))
    }

    fn create_table(
        state: &mut State,
        if_not_exists: bool,
        name: &str,
        body: &str,
    ) -> Result<RowSet, SessionError> {
        let name = name.to_lowercase();
        if state.tables.contains_key(&name) {
            if if_not_exists {
                return Ok(RowSet::empty());
            }
            return Err(SessionError::new(format!(
                "Cannot add already existing table \"{}\"",
                name
            )));
        }

        let mut columns = Vec::new();
        let mut keys: Vec<Vec<String>> = Vec::new();

        for item in split_top_level(body) {
            if let Some(caps) = PRIMARY_KEY.captures(&item) {
                keys.push(key_columns(&caps[1]));
                continue;
            }

            let (definition, inline_key) = match INLINE_KEY.find(&item) {
                Some(m) => (item[..m.start()].to_string(), true),
                None => (item.clone(), false),
            };
            let mut parts = definition.splitn(2, char::is_whitespace);
            let column = parts.next().unwrap_or_default().to_lowercase();
            let data_type = parts.next().unwrap_or_default().trim().to_lowercase();
            if column.is_empty() || data_type.is_empty() {
                return Err(SessionError::new(format!(
                    "line 1:0 invalid column definition '{}'",
                    item
                )));
            }
            if inline_key {
                keys.push(vec![column.clone()]);
            }
            columns.push((column, data_type));
        }

        let key = match keys.len() {
            0 => return Err(SessionError::new("No PRIMARY KEY specified (exactly one required)")),
            1 => keys.remove(0),
            _ => return Err(SessionError::new("Multiple PRIMARY KEYs specified (exactly one required)")),
        };
        if key.is_empty() {
            return Err(SessionError::new("line 1:0 mismatched input ')' expecting PRIMARY KEY column"));
        }
        for column in &key {
            if !columns.iter().any(|(name, _)| name == column) {
                return Err(SessionError::new(format!(
                    "Unknown definition {} referenced in PRIMARY KEY",
                    column
                )));
            }
        }

        state.tables.insert(
            name,
            Table {
                columns,
                key,
                rows: Vec::new(),
            },
        );
        Ok(RowSet::empty())
    }

    fn insert(
        state: &mut State,
        name: &str,
        columns: &str,
        values: &str,
    ) -> Result<RowSet, SessionError> {
        let table = table_mut(state, name)?;
        let columns: Vec<String> = split_top_level(columns)
            .into_iter()
            .map(|c| c.to_lowercase())
            .collect();
        let values = split_top_level(values);
        if columns.len() != values.len() {
            return Err(SessionError::new("Unmatched column names/values"));
        }

        let mut row = vec![CqlValue::Null; table.columns.len()];
        for (column, literal) in columns.iter().zip(values.iter()) {
            let index = table
                .column_index(column)
                .ok_or_else(|| SessionError::new(format!("Undefined column name {}", column)))?;
            row[index] = parse_literal(literal, &table.columns[index].1)?;
        }

        let key_indexes = table.key_indexes();
        if key_indexes.iter().any(|&i| row[i].is_null()) {
            return Err(SessionError::new("Missing mandatory PRIMARY KEY part"));
        }

        let existing = table
            .rows
            .iter()
            .position(|stored| key_indexes.iter().all(|&i| stored[i] == row[i]));
        match existing {
            Some(position) => table.rows[position] = row,
            None => table.rows.push(row),
        }
        Ok(RowSet::empty())
    }

    fn select(
        state: &mut State,
        projection: &str,
        name: &str,
        filter: Option<(&str, &str)>,
    ) -> Result<RowSet, SessionError> {
        let table = table_mut(state, name)?;

        let indexes: Vec<usize> = if projection.trim() == "*" {
            (0..table.columns.len()).collect()
        } else {
            split_top_level(projection)
                .iter()
                .map(|column| {
                    table.column_index(&column.to_lowercase()).ok_or_else(|| {
                        SessionError::new(format!("Undefined column name {}", column))
                    })
                })
                .collect::<Result<_, _>>()?
        };

        let predicate = match filter {
            Some((column, literal)) => {
                let index = table.column_index(&column.to_lowercase()).ok_or_else(|| {
                    SessionError::new(format!("Undefined column name {}", column))
                })?;
                Some((index, parse_literal(literal, &table.columns[index].1)?))
            }
            None => None,
        };

        let rows = table
            .rows
            .iter()
            .filter(|row| match &predicate {
                Some((index, value)) => &row[*index] == value,
                None => true,
            })
            .map(|row| indexes.iter().map(|&i| row[i].clone()).collect())
            .collect();
        let columns = indexes.iter().map(|&i| table.columns[i].0.clone()).collect();

        Ok(RowSet::new(columns, rows))
    }

    fn delete(
        state: &mut State,
        name: &str,
        column: &str,
        literal: &str,
    ) -> Result<RowSet, SessionError> {
        let table = table_mut(state, name)?;
        let index = table
            .column_index(&column.to_lowercase())
            .ok_or_else(|| SessionError::new(format!("Undefined column name {}", column)))?;
        let value = parse_literal(literal, &table.columns[index].1)?;
        table.rows.retain(|row| row[index] != value);
        Ok(RowSet::empty())
    }
}

#[async_trait]
impl CqlSession for MemorySession {
    async fn execute(&self, statement: &str) -> Result<RowSet, SessionError> {
        let mut state = self.lock();
        if state.shut_down {
            return Err(SessionError::new("session has been shut down"));
        }
        state.statements.push(statement.to_string());

        if let Some((_, message)) = state
            .failures
            .iter()
            .find(|(pattern, _)| statement.contains(pattern.as_str()))
        {
            return Err(SessionError::new(message.clone()));
        }

        Self::run(&mut state, statement)
    }

    async fn shutdown(&self) -> Result<(), SessionError> {
        self.lock().shut_down = true;
        Ok(())
    }
}

fn table_mut<'a>(state: &'a mut State, name: &str) -> Result<&'a mut Table, SessionError> {
    let name = name.to_lowercase();
    state
        .tables
        .get_mut(&name)
        .ok_or_else(|| SessionError::new(format!("unconfigured table {}", name)))
}

/// Split on commas that are outside quotes, parentheses and angle brackets
fn split_top_level(input: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0i32;
    let mut in_quotes = false;

    for ch in input.chars() {
        match ch {
            '\'' => in_quotes = !in_quotes,
            '(' | '<' if !in_quotes => depth += 1,
            ')' | '>' if !in_quotes => depth -= 1,
            ',' if !in_quotes && depth == 0 => {
                parts.push(current.trim().to_string());
                current.clear();
                continue;
            }
            _ => {}
        }
        current.push(ch);
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }
    parts
}

/// Flatten a key expression such as `((a, b), c)` into its column names
fn key_columns(expression: &str) -> Vec<String> {
    expression
        .split(|c: char| c == '(' || c == ')' || c == ',')
        .map(|part| part.trim().to_lowercase())
        .filter(|part| !part.is_empty())
        .collect()
}

fn parse_literal(literal: &str, data_type: &str) -> Result<CqlValue, SessionError> {
    let literal = literal.trim();
    if literal.eq_ignore_ascii_case("null") {
        return Ok(CqlValue::Null);
    }

    let text = if literal.len() >= 2 && literal.starts_with('\'') && literal.ends_with('\'') {
        Some(literal[1..literal.len() - 1].replace("''", "'"))
    } else {
        None
    };
    let invalid = || {
        SessionError::new(format!(
            "Invalid {} constant ({}) for type {}",
            if text.is_some() { "STRING" } else { "INTEGER" },
            literal,
            data_type
        ))
    };

    match data_type {
        "timestamp" => match &text {
            Some(s) => parse_timestamp(s).map(CqlValue::Timestamp).ok_or_else(invalid),
            None => literal
                .parse::<i64>()
                .ok()
                .and_then(chrono::DateTime::from_timestamp_millis)
                .map(CqlValue::Timestamp)
                .ok_or_else(invalid),
        },
        "int" => literal.parse().map(CqlValue::Int).map_err(|_| invalid()),
        "bigint" | "counter" => literal.parse().map(CqlValue::BigInt).map_err(|_| invalid()),
        "double" | "float" => literal.parse().map(CqlValue::Double).map_err(|_| invalid()),
        "boolean" => match literal.to_lowercase().as_str() {
            "true" => Ok(CqlValue::Boolean(true)),
            "false" => Ok(CqlValue::Boolean(false)),
            _ => Err(invalid()),
        },
        _ => Ok(CqlValue::Text(text.clone().unwrap_or_else(|| literal.to_string()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn session_with_users() -> MemorySession {
        let session = MemorySession::new();
        session
            .execute("CREATE TABLE IF NOT EXISTS users (id int, name text, PRIMARY KEY (id))")
            .await
            .unwrap();
        session
    }

    #[tokio::test]
    async fn test_insert_is_upsert_by_key() {
        let session = session_with_users().await;
        session
            .execute("INSERT INTO users (id, name) VALUES (1, 'ada')")
            .await
            .unwrap();
        session
            .execute("INSERT INTO users (id, name) VALUES (1, 'grace')")
            .await
            .unwrap();

        let rows = session.execute("SELECT * FROM users").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows.rows()[0].get("name"), Some(&CqlValue::Text("grace".to_string())));
    }

    #[tokio::test]
    async fn test_create_requires_exactly_one_key() {
        let session = MemorySession::new();
        assert!(session
            .execute("CREATE TABLE t (a text)")
            .await
            .is_err());
        assert!(session
            .execute("CREATE TABLE t (a text PRIMARY KEY, PRIMARY KEY (a))")
            .await
            .is_err());
        assert!(session
            .execute("CREATE TABLE t (a text, PRIMARY KEY ())")
            .await
            .is_err());
        assert!(session
            .execute("CREATE TABLE t (a text, b map<text, int>, PRIMARY KEY ((a)))")
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_create_existing_table() {
        let session = session_with_users().await;
        assert!(session
            .execute("CREATE TABLE IF NOT EXISTS users (id int, PRIMARY KEY (id))")
            .await
            .is_ok());
        assert!(session
            .execute("CREATE TABLE users (id int, PRIMARY KEY (id))")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_delete_and_filtered_select() {
        let session = session_with_users().await;
        for (id, name) in [(1, "ada"), (2, "grace"), (3, "o'neil")] {
            session
                .execute(&format!(
                    "INSERT INTO users (id, name) VALUES ({}, '{}')",
                    id,
                    name.replace('\'', "''")
                ))
                .await
                .unwrap();
        }

        session.execute("DELETE FROM users WHERE id = 2").await.unwrap();
        let rows = session
            .execute("SELECT name FROM users WHERE name = 'o''neil'")
            .await
            .unwrap();
        assert_eq!(rows.columns(), ["name".to_string()]);
        assert_eq!(rows.len(), 1);
        assert_eq!(session.row_count("users"), Some(2));
    }

    #[tokio::test]
    async fn test_drop_and_unknown_table() {
        let session = session_with_users().await;
        session.execute("DROP TABLE users").await.unwrap();
        assert!(!session.has_table("users"));

        let err = session.execute("SELECT * FROM users").await.unwrap_err();
        assert_eq!(err.message, "unconfigured table users");
        assert!(session.execute("DROP TABLE users").await.is_err());
        assert!(session.execute("DROP TABLE IF EXISTS users").await.is_ok());
    }

    #[tokio::test]
    async fn test_timestamp_columns_are_typed() {
        let session = MemorySession::new();
        session
            .execute("CREATE TABLE m (name varchar, ran_on timestamp, PRIMARY KEY (name))")
            .await
            .unwrap();
        session
            .execute("INSERT INTO m (name, ran_on) VALUES ('a', '2024-01-01 00:00:00')")
            .await
            .unwrap();
        assert!(session
            .execute("INSERT INTO m (name, ran_on) VALUES ('b', 'not a time')")
            .await
            .is_err());

        let rows = session.execute("SELECT * FROM m").await.unwrap();
        assert!(matches!(rows.rows()[0].get("ran_on"), Some(CqlValue::Timestamp(_))));
    }

    #[tokio::test]
    async fn test_injected_failures_and_shutdown() {
        let session = session_with_users().await;
        session.fail_on("users", "Operation timed out");

        let err = session.execute("SELECT * FROM users").await.unwrap_err();
        assert_eq!(err.message, "Operation timed out");

        session.clear_failures();
        assert!(session.execute("SELECT * FROM users").await.is_ok());

        session.shutdown().await.unwrap();
        assert!(session.is_shut_down());
        assert!(session.execute("SELECT * FROM users").await.is_err());
        assert_eq!(session.statements().len(), 3);
    }

    #[test]
    fn test_key_columns_flatten() {
        assert_eq!(key_columns("((a, b), c)"), vec!["a", "b", "c"]);
        assert_eq!(key_columns("(name)"), vec!["name"]);
        assert!(key_columns("()").is_empty());
    }
}
