//! Migration files
//!
//! Loads `.cql` migration files from a directory and applies or rolls them
//! back through any [`MigrationDriver`](crate::driver::MigrationDriver),
//! keeping the ledger in step.

pub mod definitions;
pub mod manager;
pub mod runner;

pub use definitions::*;
pub use manager::MigrationManager;
pub use runner::MigrationRunner;
