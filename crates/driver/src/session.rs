//! Session seam - the contract the driver needs from a CQL client
//!
//! The driver never talks to a wire protocol itself. Any client that can run
//! a single statement and shut down can sit behind [`CqlSession`]: the native
//! `scylla` client, the in-memory session used in tests, or a handle supplied
//! by the embedding application.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;

/// Failure reported by a client
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct SessionError {
    pub message: String,
}

impl SessionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Abstract CQL client
#[async_trait]
pub trait CqlSession: Send + Sync {
    /// Execute one statement and return its rows (empty for DDL and writes)
    async fn execute(&self, statement: &str) -> Result<RowSet, SessionError>;

    /// Release the client's connections
    async fn shutdown(&self) -> Result<(), SessionError>;
}

/// Shared handle to a session
pub type SessionHandle = Arc<dyn CqlSession>;

/// Column value as returned by a session
#[derive(Debug, Clone, PartialEq)]
pub enum CqlValue {
    Null,
    Boolean(bool),
    Int(i32),
    BigInt(i64),
    Double(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
    Blob(Vec<u8>),
    List(Vec<CqlValue>),
}

impl CqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CqlValue::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CqlValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Interpret the value as an instant.
    ///
    /// Text values are accepted in the formats the database itself accepts
    /// for timestamp literals; integers are milliseconds since the epoch.
    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            CqlValue::Timestamp(ts) => Some(*ts),
            CqlValue::BigInt(ms) => DateTime::from_timestamp_millis(*ms),
            CqlValue::Text(s) => parse_timestamp(s),
            _ => None,
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            CqlValue::Null => JsonValue::Null,
            CqlValue::Boolean(b) => JsonValue::Bool(*b),
            CqlValue::Int(i) => JsonValue::from(*i),
            CqlValue::BigInt(i) => JsonValue::from(*i),
            CqlValue::Double(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            CqlValue::Text(s) => JsonValue::String(s.clone()),
            CqlValue::Timestamp(ts) => JsonValue::String(ts.to_rfc3339()),
            CqlValue::Blob(b) => JsonValue::Array(b.iter().map(|&x| JsonValue::from(x)).collect()),
            CqlValue::List(items) => JsonValue::Array(items.iter().map(|v| v.to_json()).collect()),
        }
    }
}

/// Parse a CQL timestamp literal
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%z", "%Y-%m-%d %H:%M:%S%.f%z"] {
        if let Ok(ts) = DateTime::parse_from_str(text, format) {
            return Some(ts.with_timezone(&Utc));
        }
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }
    None
}

/// One result row
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<Vec<String>>,
    values: Vec<CqlValue>,
}

impl Row {
    pub fn new(columns: Arc<Vec<String>>, values: Vec<CqlValue>) -> Self {
        Self { columns, values }
    }

    /// Get a column value by name
    pub fn get(&self, name: &str) -> Option<&CqlValue> {
        self.columns
            .iter()
            .position(|column| column == name)
            .and_then(|index| self.values.get(index))
    }

    pub fn get_by_index(&self, index: usize) -> Option<&CqlValue> {
        self.values.get(index)
    }

    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[CqlValue] {
        &self.values
    }

    /// Convert row to a JSON object
    pub fn to_json(&self) -> JsonValue {
        let map = self
            .columns
            .iter()
            .zip(self.values.iter())
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect();
        JsonValue::Object(map)
    }
}

/// Rows returned by one statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    columns: Arc<Vec<String>>,
    rows: Vec<Row>,
}

impl RowSet {
    /// Result of a statement that returns no rows
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(columns: Vec<String>, rows: Vec<Vec<CqlValue>>) -> Self {
        let columns = Arc::new(columns);
        let rows = rows
            .into_iter()
            .map(|values| Row::new(Arc::clone(&columns), values))
            .collect();
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
