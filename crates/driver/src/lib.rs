//! # cqlmig-driver: schema migrations for CQL databases
//!
//! Driver adapter that lets a migration framework target Apache Cassandra
//! or ScyllaDB. It builds CQL statements for the handful of operations a
//! migration tool needs, keeps the ledger of applied migrations, and runs
//! everything through a [`CqlSession`].
//!
//! ```no_run
//! use cqlmig_driver::{CqlDriver, DriverConfig, MigrationDriver, MemorySession};
//!
//! # async fn demo() -> cqlmig_driver::DriverResult<()> {
//! let config = DriverConfig::new("app").with_session(MemorySession::shared());
//! let driver = CqlDriver::connect(config).await?;
//! driver.create_migrations_table().await?;
//! driver.add_migration_record("20240101120000-init").await?;
//! let applied = driver.all_loaded_migrations().await?;
//! assert_eq!(applied[0].name, "20240101120000-init");
//! driver.close().await
//! # }
//! ```

pub mod compat;
pub mod config;
pub mod connection;
pub mod driver;
pub mod error;
pub mod executor;
pub mod ledger;
pub mod memory;
pub mod migrations;
#[cfg(feature = "scylla")]
pub mod native;
pub mod recording;
pub mod session;
pub mod statement;

pub use config::{DatabaseFile, DriverConfig, DEFAULT_MIGRATIONS_TABLE};
pub use connection::{connect, ConnectionParams, Credentials, DEFAULT_HOST, DEFAULT_PORT};
pub use driver::{CqlDriver, MigrationDriver};
pub use error::{DriverError, DriverResult};
pub use executor::Executor;
pub use ledger::{AppliedMigration, Ledger};
pub use memory::MemorySession;
pub use migrations::{
    Migration, MigrationConfig, MigrationManager, MigrationRunResult, MigrationRunner,
    MigrationStatus, MigrationStatusEntry, RollbackResult,
};
#[cfg(feature = "scylla")]
pub use native::ScyllaSession;
pub use recording::RecordingSession;
pub use session::{CqlSession, CqlValue, Row, RowSet, SessionError, SessionHandle};
pub use statement::{build_create_table, build_drop_table, ColumnSpec, TableBuilder, TableConstraints};
