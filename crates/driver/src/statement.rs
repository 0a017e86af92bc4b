//! Statement Builder - pure CQL statement construction
//!
//! Every statement the driver sends is produced here from plain values.
//! Nothing in this module validates its input: a malformed statement is
//! rejected by the database at execution time.

use chrono::{DateTime, Utc};

/// Format used for `ran_on` literals written to the ledger.
///
/// The literal carries no zone and the database reads it in the
/// coordinator's time zone, so on nodes not running in UTC the stored
/// instant is shifted by that offset. Relative order between records is
/// unaffected.
pub const LEDGER_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Type of a single column in a CREATE TABLE statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnSpec {
    /// Raw CQL type, e.g. `varchar` or `map<text, int>`
    Type(String),
    /// Type plus key membership
    Descriptor { data_type: String, primary_key: bool },
}

impl ColumnSpec {
    pub fn data_type(&self) -> &str {
        match self {
            ColumnSpec::Type(data_type) => data_type,
            ColumnSpec::Descriptor { data_type, .. } => data_type,
        }
    }

    pub fn is_primary_key(&self) -> bool {
        matches!(self, ColumnSpec::Descriptor { primary_key: true, .. })
    }

    /// Descriptor for a column that belongs to the primary key
    pub fn key(data_type: impl Into<String>) -> Self {
        ColumnSpec::Descriptor {
            data_type: data_type.into(),
            primary_key: true,
        }
    }
}

impl From<&str> for ColumnSpec {
    fn from(data_type: &str) -> Self {
        ColumnSpec::Type(data_type.to_string())
    }
}

impl From<String> for ColumnSpec {
    fn from(data_type: String) -> Self {
        ColumnSpec::Type(data_type)
    }
}

/// Table-level constraints for CREATE TABLE
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableConstraints {
    /// Key expression: `a`, `a, b`, or already parenthesized `((a, b), c)`
    pub primary_key: Option<String>,
}

impl TableConstraints {
    pub fn primary_key(key: impl Into<String>) -> Self {
        Self {
            primary_key: Some(key.into()),
        }
    }
}

/// Wrap a key expression in parentheses unless it already is
pub fn normalize_key(key: &str) -> String {
    let key = key.trim();
    if key.starts_with('(') && key.ends_with(')') {
        key.to_string()
    } else {
        format!("({})", key)
    }
}

/// Quote a value as a CQL string literal
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Build `CREATE TABLE IF NOT EXISTS`.
///
/// The key is always emitted as a single table-level `PRIMARY KEY` clause.
/// An explicit constraint key wins; otherwise the clause lists the columns
/// whose descriptor is marked as primary key, in column order.
pub fn build_create_table(
    table_name: &str,
    columns: &[(String, ColumnSpec)],
    constraints: &TableConstraints,
) -> String {
    let mut definitions: Vec<String> = columns
        .iter()
        .map(|(name, spec)| format!("{} {}", name, spec.data_type()))
        .collect();

    let key = match constraints.primary_key.as_deref() {
        Some(key) => key.to_string(),
        None => columns
            .iter()
            .filter(|(_, spec)| spec.is_primary_key())
            .map(|(name, _)| name.as_str())
            .collect::<Vec<_>>()
            .join(", "),
    };
    definitions.push(format!("PRIMARY KEY {}", normalize_key(&key)));

    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        table_name,
        definitions.join(", ")
    )
}

pub fn build_drop_table(table_name: &str) -> String {
    format!("DROP TABLE {}", table_name)
}

/// INSERT of one ledger row; `ran_on` is written as UTC wall time
pub fn build_insert_record(table_name: &str, name: &str, ran_on: DateTime<Utc>) -> String {
    format!(
        "INSERT INTO {} (name, ran_on) VALUES ({}, {})",
        table_name,
        quote_literal(name),
        quote_literal(&ran_on.format(LEDGER_TIME_FORMAT).to_string())
    )
}

/// Full scan of the ledger
pub fn build_select_records(table_name: &str) -> String {
    format!("SELECT * FROM {}", table_name)
}

pub fn build_delete_record(table_name: &str, name: &str) -> String {
    format!("DELETE FROM {} WHERE name = {}", table_name, quote_literal(name))
}

/// Fluent builder collecting columns and constraints for one table
#[derive(Debug, Clone)]
pub struct TableBuilder {
    table_name: String,
    columns: Vec<(String, ColumnSpec)>,
    constraints: TableConstraints,
}

impl TableBuilder {
    pub fn new(table_name: &str) -> Self {
        Self {
            table_name: table_name.to_string(),
            columns: Vec::new(),
            constraints: TableConstraints::default(),
        }
    }

    /// Add a column
    pub fn column(&mut self, name: &str, spec: impl Into<ColumnSpec>) -> &mut Self {
        self.columns.push((name.to_string(), spec.into()));
        self
    }

    /// Add a column that is part of the primary key
    pub fn key_column(&mut self, name: &str, data_type: &str) -> &mut Self {
        self.columns.push((name.to_string(), ColumnSpec::key(data_type)));
        self
    }

    /// Set an explicit primary key expression
    pub fn primary_key(&mut self, key: &str) -> &mut Self {
        self.constraints.primary_key = Some(key.to_string());
        self
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn columns(&self) -> &[(String, ColumnSpec)] {
        &self.columns
    }

    pub fn constraints(&self) -> &TableConstraints {
        &self.constraints
    }

    pub fn to_cql(&self) -> String {
        build_create_table(&self.table_name, &self.columns, &self.constraints)
    }
}
