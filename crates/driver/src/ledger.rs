//! Ledger Accessor - the table recording which migrations ran and when

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{DriverError, DriverResult};
use crate::executor::Executor;
use crate::session::Row;
use crate::statement::{self, ColumnSpec, TableConstraints};

/// One ledger row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedMigration {
    pub name: String,
    pub ran_on: DateTime<Utc>,
    /// `ran_on` in milliseconds since the epoch, the ordering key
    pub timestamp_ms: i64,
}

impl AppliedMigration {
    pub fn new(name: impl Into<String>, ran_on: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            ran_on,
            timestamp_ms: ran_on.timestamp_millis(),
        }
    }

    fn from_row(row: &Row) -> DriverResult<Self> {
        let name = row
            .get("name")
            .and_then(|value| value.as_text())
            .ok_or_else(|| DriverError::Decode("ledger row without a name".to_string()))?;
        let ran_on = row
            .get("ran_on")
            .and_then(|value| value.as_timestamp())
            .ok_or_else(|| {
                DriverError::Decode(format!("ledger row '{}' has no readable ran_on", name))
            })?;
        Ok(Self::new(name, ran_on))
    }
}

/// Order records most recent first.
///
/// Records sharing a timestamp fall back to descending name order, which
/// follows the date prefix convention of migration names.
pub fn sort_newest_first(records: &mut [AppliedMigration]) {
    records.sort_by(|a, b| {
        b.timestamp_ms
            .cmp(&a.timestamp_ms)
            .then_with(|| b.name.cmp(&a.name))
    });
}

/// Reads and writes the migration ledger
#[derive(Debug, Clone)]
pub struct Ledger {
    executor: Executor,
    table: String,
}

impl Ledger {
    pub fn new(executor: Executor, table: impl Into<String>) -> Self {
        Self {
            executor,
            table: table.into(),
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// Fixed ledger columns
    pub fn schema() -> Vec<(String, ColumnSpec)> {
        vec![
            ("name".to_string(), ColumnSpec::key("varchar")),
            ("ran_on".to_string(), ColumnSpec::Type("timestamp".to_string())),
        ]
    }

    pub async fn create_table(&self) -> DriverResult<()> {
        let cql = statement::build_create_table(
            &self.table,
            &Self::schema(),
            &TableConstraints::primary_key("name"),
        );
        self.executor.execute(&cql).await?;
        Ok(())
    }

    /// Record a migration as applied now
    pub async fn record_applied(&self, name: &str) -> DriverResult<()> {
        self.record_applied_at(name, Utc::now()).await
    }

    pub async fn record_applied_at(&self, name: &str, ran_on: DateTime<Utc>) -> DriverResult<()> {
        let cql = statement::build_insert_record(&self.table, name, ran_on);
        self.executor.execute(&cql).await?;
        Ok(())
    }

    /// All records, most recent first
    pub async fn list_applied(&self) -> DriverResult<Vec<AppliedMigration>> {
        let rows = self
            .executor
            .execute(&statement::build_select_records(&self.table))
            .await?;

        let mut records = rows
            .rows()
            .iter()
            .map(AppliedMigration::from_row)
            .collect::<DriverResult<Vec<_>>>()?;
        sort_newest_first(&mut records);
        Ok(records)
    }

    pub async fn delete_record(&self, name: &str) -> DriverResult<()> {
        let cql = statement::build_delete_record(&self.table, name);
        self.executor.execute(&cql).await?;
        Ok(())
    }
}
