//! Migration Definitions - core types shared by the manager and runner

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;

/// A migration file
#[derive(Debug, Clone, Serialize)]
pub struct Migration {
    /// File stem, e.g. `20240101120000-create-users`; the ledger key
    pub name: String,
    /// Human-readable part of the name
    pub description: String,
    /// Statements applying the migration
    pub up_cql: String,
    /// Statements reverting it; `None` when the file has no down section
    pub down_cql: Option<String>,
    /// Parsed from the name's timestamp prefix
    pub created_at: Option<DateTime<Utc>>,
}

/// Configuration for the migration file system
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    /// Directory where migration files are stored
    pub migrations_dir: PathBuf,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            migrations_dir: PathBuf::from("migrations"),
        }
    }
}

/// Result of running migrations
#[derive(Debug, Default, Serialize)]
pub struct MigrationRunResult {
    /// Number of migrations that were applied
    pub applied_count: usize,
    /// Names of migrations that were applied, in order
    pub applied_migrations: Vec<String>,
    /// Number of migrations already in the ledger
    pub skipped_count: usize,
    /// Total execution time in milliseconds
    pub execution_time_ms: u128,
}

/// Result of rolling back migrations
#[derive(Debug, Default, Serialize)]
pub struct RollbackResult {
    pub rolled_back_count: usize,
    /// Names of migrations that were rolled back, newest first
    pub rolled_back_migrations: Vec<String>,
    pub execution_time_ms: u128,
}

/// State of one migration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MigrationStatus {
    /// File present, not in the ledger
    Pending,
    /// File present and recorded
    Applied { ran_on: DateTime<Utc> },
    /// Recorded in the ledger but no file exists
    Missing { ran_on: DateTime<Utc> },
}

/// One line of a status report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationStatusEntry {
    pub name: String,
    #[serde(flatten)]
    pub status: MigrationStatus,
}
