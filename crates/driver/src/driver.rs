//! Driver facade - the method set a migration framework calls
//!
//! [`CqlDriver`] wires the connection factory, execution adapter, ledger and
//! statement builder together. [`MigrationDriver`] is the object-safe form of
//! the same surface, which the migration runner is written against.

use async_trait::async_trait;

use crate::config::DriverConfig;
use crate::connection;
use crate::error::{DriverError, DriverResult};
use crate::executor::Executor;
use crate::ledger::{AppliedMigration, Ledger};
use crate::session::{RowSet, SessionHandle};
use crate::statement::{self, ColumnSpec, TableConstraints};

/// Operations a migration framework needs from a database driver
#[async_trait]
pub trait MigrationDriver: Send + Sync {
    /// Create the ledger table if it does not exist
    async fn create_migrations_table(&self) -> DriverResult<()>;

    async fn create_table(
        &self,
        table_name: &str,
        columns: &[(String, ColumnSpec)],
        constraints: &TableConstraints,
    ) -> DriverResult<()>;

    async fn drop_table(&self, table_name: &str) -> DriverResult<()>;

    /// Applied migrations, most recent first
    async fn all_loaded_migrations(&self) -> DriverResult<Vec<AppliedMigration>>;

    async fn add_migration_record(&self, name: &str) -> DriverResult<()>;

    async fn delete_migration(&self, name: &str) -> DriverResult<()>;

    /// Run an arbitrary statement, e.g. from a migration file
    async fn run_statement(&self, cql: &str) -> DriverResult<RowSet>;
}

/// Migration driver for CQL databases
#[derive(Debug)]
pub struct CqlDriver {
    executor: Executor,
    ledger: Ledger,
    keyspace: String,
}

impl CqlDriver {
    /// Connect using the configuration, or reuse the session it carries
    pub async fn connect(config: DriverConfig) -> DriverResult<Self> {
        let (params, session) = connection::connect(&config).await?;
        Ok(Self::from_session(session, params.keyspace, &config.migrations_table))
    }

    pub fn from_session(session: SessionHandle, keyspace: String, migrations_table: &str) -> Self {
        let executor = Executor::new(session);
        let ledger = Ledger::new(executor.clone(), migrations_table);
        Self {
            executor,
            ledger,
            keyspace,
        }
    }

    pub fn keyspace(&self) -> &str {
        &self.keyspace
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    /// Shut the session down.
    ///
    /// Consumes the driver; callers must not have requests in flight.
    pub async fn close(self) -> DriverResult<()> {
        self.executor.session().shutdown().await.map_err(|e| {
            tracing::error!("Failed to shut down session: {}", e);
            DriverError::Connection(format!("Failed to shut down session: {}", e))
        })
    }
}

#[async_trait]
impl MigrationDriver for CqlDriver {
    async fn create_migrations_table(&self) -> DriverResult<()> {
        self.ledger.create_table().await
    }

    async fn create_table(
        &self,
        table_name: &str,
        columns: &[(String, ColumnSpec)],
        constraints: &TableConstraints,
    ) -> DriverResult<()> {
        let cql = statement::build_create_table(table_name, columns, constraints);
        self.executor.execute(&cql).await?;
        Ok(())
    }

    async fn drop_table(&self, table_name: &str) -> DriverResult<()> {
        self.executor
            .execute(&statement::build_drop_table(table_name))
            .await?;
        Ok(())
    }

    async fn all_loaded_migrations(&self) -> DriverResult<Vec<AppliedMigration>> {
        self.ledger.list_applied().await
    }

    async fn add_migration_record(&self, name: &str) -> DriverResult<()> {
        self.ledger.record_applied(name).await
    }

    async fn delete_migration(&self, name: &str) -> DriverResult<()> {
        self.ledger.delete_record(name).await
    }

    async fn run_statement(&self, cql: &str) -> DriverResult<RowSet> {
        self.executor.execute(cql).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemorySession;

    async fn driver() -> (std::sync::Arc<MemorySession>, CqlDriver) {
        let session = MemorySession::shared();
        let config = DriverConfig::new("app").with_session(session.clone());
        (session, CqlDriver::connect(config).await.unwrap())
    }

    #[tokio::test]
    async fn test_connect_requires_keyspace() {
        let session = MemorySession::shared();
        let err = CqlDriver::connect(DriverConfig::default().with_session(session))
            .await
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn test_create_and_drop_table() {
        let (session, driver) = driver().await;
        assert_eq!(driver.keyspace(), "app");

        driver
            .create_table(
                "users",
                &[
                    ("id".to_string(), ColumnSpec::key("uuid")),
                    ("email".to_string(), "text".into()),
                ],
                &TableConstraints::default(),
            )
            .await
            .unwrap();
        assert!(session.has_table("users"));

        driver.drop_table("users").await.unwrap();
        assert!(!session.has_table("users"));
        assert!(driver.drop_table("users").await.unwrap_err().is_execution());
    }

    #[tokio::test]
    async fn test_ledger_round_trip_through_driver() {
        let (_, driver) = driver().await;
        driver.create_migrations_table().await.unwrap();
        driver.create_migrations_table().await.unwrap();

        driver.add_migration_record("20240101-init").await.unwrap();
        let applied = driver.all_loaded_migrations().await.unwrap();
        assert_eq!(applied.len(), 1);

        driver.delete_migration("20240101-init").await.unwrap();
        assert!(driver.all_loaded_migrations().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_custom_ledger_table() {
        let session = MemorySession::shared();
        let config = DriverConfig::new("app")
            .with_session(session.clone())
            .with_migrations_table("schema_history");
        let driver = CqlDriver::connect(config).await.unwrap();

        driver.create_migrations_table().await.unwrap();
        assert!(session.has_table("schema_history"));
        assert_eq!(driver.ledger().table_name(), "schema_history");
    }

    #[tokio::test]
    async fn test_close_shuts_session_down() {
        let (session, driver) = driver().await;
        driver.close().await.unwrap();
        assert!(session.is_shut_down());
    }
}
