//! Migration Runner - applies and rolls back migration files
//!
//! Each statement is its own unit: there are no transactions, so a failure
//! part way through a migration leaves the earlier statements applied and the
//! migration unrecorded.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use super::definitions::{
    Migration, MigrationRunResult, MigrationStatus, MigrationStatusEntry, RollbackResult,
};
use super::manager::{split_statements, MigrationManager};
use crate::driver::MigrationDriver;
use crate::error::{DriverError, DriverResult};

/// Runs migration files through a driver
pub struct MigrationRunner<D> {
    manager: MigrationManager,
    driver: D,
}

impl<D: MigrationDriver> MigrationRunner<D> {
    pub fn new(manager: MigrationManager, driver: D) -> Self {
        Self { manager, driver }
    }

    pub fn manager(&self) -> &MigrationManager {
        &self.manager
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn into_driver(self) -> D {
        self.driver
    }

    /// Apply pending migrations in name order, at most `limit` of them
    pub async fn run_pending(&self, limit: Option<usize>) -> DriverResult<MigrationRunResult> {
        let start_time = Instant::now();

        self.driver.create_migrations_table().await?;
        let applied: HashSet<String> = self
            .driver
            .all_loaded_migrations()
            .await?
            .into_iter()
            .map(|record| record.name)
            .collect();

        let pending: Vec<Migration> = self
            .manager
            .load_migrations()?
            .into_iter()
            .filter(|migration| !applied.contains(&migration.name))
            .take(limit.unwrap_or(usize::MAX))
            .collect();

        let mut applied_migrations = Vec::new();
        for migration in &pending {
            self.apply(migration).await?;
            applied_migrations.push(migration.name.clone());
        }

        Ok(MigrationRunResult {
            applied_count: applied_migrations.len(),
            applied_migrations,
            skipped_count: applied.len(),
            execution_time_ms: start_time.elapsed().as_millis(),
        })
    }

    /// Roll back the `count` most recently applied migrations
    pub async fn rollback(&self, count: usize) -> DriverResult<RollbackResult> {
        let start_time = Instant::now();

        self.driver.create_migrations_table().await?;
        let records = self.driver.all_loaded_migrations().await?;
        let files: HashMap<String, Migration> = self
            .manager
            .load_migrations()?
            .into_iter()
            .map(|migration| (migration.name.clone(), migration))
            .collect();

        let mut rolled_back_migrations = Vec::new();
        for record in records.iter().take(count) {
            let migration = files.get(&record.name).ok_or_else(|| {
                DriverError::Migration(format!(
                    "Migration file not found for applied migration: {}",
                    record.name
                ))
            })?;
            self.revert(migration).await?;
            rolled_back_migrations.push(record.name.clone());
        }

        Ok(RollbackResult {
            rolled_back_count: rolled_back_migrations.len(),
            rolled_back_migrations,
            execution_time_ms: start_time.elapsed().as_millis(),
        })
    }

    /// Status of every migration file plus ledger entries without a file
    pub async fn status(&self) -> DriverResult<Vec<MigrationStatusEntry>> {
        self.driver.create_migrations_table().await?;
        let mut applied: HashMap<String, _> = self
            .driver
            .all_loaded_migrations()
            .await?
            .into_iter()
            .map(|record| (record.name, record.ran_on))
            .collect();

        let mut entries: Vec<MigrationStatusEntry> = self
            .manager
            .load_migrations()?
            .into_iter()
            .map(|migration| {
                let status = match applied.remove(&migration.name) {
                    Some(ran_on) => MigrationStatus::Applied { ran_on },
                    None => MigrationStatus::Pending,
                };
                MigrationStatusEntry {
                    name: migration.name,
                    status,
                }
            })
            .collect();

        entries.extend(applied.into_iter().map(|(name, ran_on)| MigrationStatusEntry {
            name,
            status: MigrationStatus::Missing { ran_on },
        }));
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn apply(&self, migration: &Migration) -> DriverResult<()> {
        for statement in split_statements(&migration.up_cql) {
            self.driver.run_statement(&statement).await.map_err(|e| {
                tracing::error!(migration = %migration.name, "migration failed");
                e
            })?;
        }
        self.driver.add_migration_record(&migration.name).await?;
        tracing::info!(migration = %migration.name, "applied migration");
        Ok(())
    }

    async fn revert(&self, migration: &Migration) -> DriverResult<()> {
        let down_cql = migration.down_cql.as_deref().ok_or_else(|| {
            DriverError::Migration(format!(
                "Migration {} has no down section and cannot be rolled back",
                migration.name
            ))
        })?;

        for statement in split_statements(down_cql) {
            self.driver.run_statement(&statement).await.map_err(|e| {
                tracing::error!(migration = %migration.name, "rollback failed");
                e
            })?;
        }
        self.driver.delete_migration(&migration.name).await?;
        tracing::info!(migration = %migration.name, "rolled back migration");
        Ok(())
    }
}
