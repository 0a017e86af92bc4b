use std::sync::Arc;

use anyhow::{Context, Result};
use cqlmig_driver::{
    connection, CqlDriver, DatabaseFile, DriverConfig, DriverResult, MigrationConfig,
    MigrationDriver, MigrationManager, MigrationRunResult, MigrationRunner, MigrationStatus,
    MigrationStatusEntry, RecordingSession, RollbackResult,
};

use crate::GlobalArgs;

/// Runner plus the recording session when running dry
struct Connected {
    runner: MigrationRunner<CqlDriver>,
    recorder: Option<Arc<RecordingSession>>,
}

impl Connected {
    /// Print what a dry run recorded, close the driver, then hand back the
    /// command's outcome. Statements are printed even when the command failed.
    async fn finish<T>(self, outcome: DriverResult<T>) -> Result<T> {
        if let Some(recorder) = &self.recorder {
            println!();
            println!("Statements (dry run):");
            for statement in recorder.statements() {
                println!("  {};", statement);
            }
        }
        if let Err(e) = &outcome {
            tracing::error!(error = %e, "command failed");
        }

        let closed = self.runner.into_driver().close().await;
        let value = outcome?;
        closed?;
        Ok(value)
    }
}

fn manager(args: &GlobalArgs) -> MigrationManager {
    MigrationManager::with_config(MigrationConfig {
        migrations_dir: args.migrations_dir.clone(),
    })
}

fn driver_config(args: &GlobalArgs) -> Result<DriverConfig> {
    let file = DatabaseFile::load(&args.config)?;
    let mut config = file
        .environment(args.env.as_deref())
        .with_context(|| format!("while reading {}", args.config.display()))?;
    if let Some(table) = &args.table {
        config.migrations_table = table.clone();
    }
    Ok(config)
}

/// Recording session for a dry run, reading the ledger from the configured
/// database when one can be reached
async fn dry_run_session(config: &DriverConfig) -> Arc<RecordingSession> {
    match connection::connect(config).await {
        Ok((params, session)) => {
            tracing::debug!(keyspace = %params.keyspace, "dry run reads from the database");
            RecordingSession::with_reads(session).shared()
        }
        Err(e) => {
            tracing::warn!(error = %e, "no database for the dry run, the ledger reads as empty");
            RecordingSession::new().shared()
        }
    }
}

async fn connect(args: &GlobalArgs) -> Result<Connected> {
    let mut config = driver_config(args)?;

    let recorder = if args.dry_run {
        let recorder = dry_run_session(&config).await;
        config = config.with_session(recorder.clone());
        Some(recorder)
    } else {
        None
    };

    let driver = CqlDriver::connect(config).await?;
    Ok(Connected {
        runner: MigrationRunner::new(manager(args), driver),
        recorder,
    })
}

pub async fn init(args: &GlobalArgs) -> Result<()> {
    tracing::info!(dry_run = args.dry_run, "creating ledger table");
    let connected = connect(args).await?;
    let outcome = connected.runner.driver().create_migrations_table().await;
    if outcome.is_ok() {
        println!(
            "Ledger table {}.{} is ready",
            connected.runner.driver().keyspace(),
            connected.runner.driver().ledger().table_name()
        );
    }
    connected.finish(outcome).await
}

pub fn create(args: &GlobalArgs, name: &str) -> Result<()> {
    let filename = manager(args).create_migration(name)?;
    let path = args.migrations_dir.join(filename);
    tracing::info!(path = %path.display(), "created migration");
    println!("Created migration: {}", path.display());
    Ok(())
}

pub async fn up(args: &GlobalArgs, count: Option<usize>) -> Result<MigrationRunResult> {
    tracing::info!(dry_run = args.dry_run, ?count, "applying pending migrations");
    let connected = connect(args).await?;
    let outcome = connected.runner.run_pending(count).await;

    if let Ok(result) = &outcome {
        if result.applied_count == 0 {
            println!("No pending migrations ({} already applied)", result.skipped_count);
        } else {
            for name in &result.applied_migrations {
                println!("  ✅ {}", name);
            }
            println!(
                "Applied {} migration(s) in {}ms",
                result.applied_count, result.execution_time_ms
            );
        }
    }
    connected.finish(outcome).await
}

pub async fn down(args: &GlobalArgs, count: usize) -> Result<RollbackResult> {
    tracing::info!(dry_run = args.dry_run, count, "rolling back migrations");
    let connected = connect(args).await?;
    let outcome = connected.runner.rollback(count).await;

    if let Ok(result) = &outcome {
        if result.rolled_back_count == 0 {
            println!("Nothing to roll back");
        } else {
            for name in &result.rolled_back_migrations {
                println!("  ↩️  {}", name);
            }
            println!(
                "Rolled back {} migration(s) in {}ms",
                result.rolled_back_count, result.execution_time_ms
            );
        }
    }
    connected.finish(outcome).await
}

pub async fn status(args: &GlobalArgs, json: bool) -> Result<Vec<MigrationStatusEntry>> {
    let connected = connect(args).await?;
    let outcome = connected.runner.status().await;

    if let Ok(entries) = &outcome {
        if json {
            match serde_json::to_string_pretty(entries) {
                Ok(text) => println!("{}", text),
                Err(e) => tracing::error!(error = %e, "could not serialize status"),
            }
        } else {
            print_status(entries);
        }
    }
    connected.finish(outcome).await
}

fn print_status(entries: &[MigrationStatusEntry]) {
    println!("Migration Status:");
    println!("================");
    if entries.is_empty() {
        println!("No migrations found");
    }
    for entry in entries {
        match &entry.status {
            MigrationStatus::Applied { ran_on } => {
                println!("  ✅ {} ({})", entry.name, ran_on.format("%Y-%m-%d %H:%M:%S"))
            }
            MigrationStatus::Pending => println!("  ⏳ {}", entry.name),
            MigrationStatus::Missing { ran_on } => println!(
                "  ⚠️  {} (applied {}, file missing)",
                entry.name,
                ran_on.format("%Y-%m-%d %H:%M:%S")
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn args(dir: &TempDir) -> GlobalArgs {
        let config = dir.path().join("database.json");
        fs::write(
            &config,
            r#"{ "dev": { "driver": "cassandra", "database": "app" } }"#,
        )
        .unwrap();

        GlobalArgs {
            config,
            env: None,
            migrations_dir: dir.path().join("migrations"),
            table: Some("schema_history".to_string()),
            dry_run: true,
            verbose: false,
            json_logs: false,
        }
    }

    fn write_migration(args: &GlobalArgs, name: &str, up: &str, down: &str) {
        fs::create_dir_all(&args.migrations_dir).unwrap();
        fs::write(
            args.migrations_dir.join(format!("{}.cql", name)),
            format!("-- Up migration\n{}\n-- Down migration\n{}\n", up, down),
        )
        .unwrap();
    }

    fn seed(args: &GlobalArgs) {
        write_migration(
            args,
            "20240101000000-events",
            "CREATE TABLE IF NOT EXISTS events (day date, ts timeuuid, body text, \
             PRIMARY KEY (day, ts)) WITH CLUSTERING ORDER BY (ts DESC);",
            "DROP TABLE events;",
        );
        write_migration(
            args,
            "20240102000000-users-age",
            "ALTER TABLE users ADD age int;\nCREATE INDEX IF NOT EXISTS users_age ON users (age);",
            "DROP INDEX users_age;\nALTER TABLE users DROP age;",
        );
    }

    #[test]
    fn test_driver_config_applies_table_override() {
        let dir = TempDir::new().unwrap();
        let config = driver_config(&args(&dir)).unwrap();
        assert_eq!(config.database.as_deref(), Some("app"));
        assert_eq!(config.migrations_table, "schema_history");
    }

    #[test]
    fn test_missing_config_file() {
        let dir = TempDir::new().unwrap();
        let mut args = args(&dir);
        args.config = PathBuf::from("/nonexistent/database.json");
        assert!(driver_config(&args).is_err());
    }

    #[test]
    fn test_create_writes_template() {
        let dir = TempDir::new().unwrap();
        let args = args(&dir);

        create(&args, "create users").unwrap();
        let files: Vec<_> = fs::read_dir(&args.migrations_dir).unwrap().collect();
        assert_eq!(files.len(), 1);
    }

    #[tokio::test]
    async fn test_dry_run_records_any_cql() {
        let dir = TempDir::new().unwrap();
        let args = args(&dir);
        seed(&args);

        let connected = connect(&args).await.unwrap();
        let recorder = connected.recorder.clone().unwrap();
        let result = connected.runner.run_pending(None).await.unwrap();
        assert_eq!(result.applied_count, 2);

        let statements = recorder.statements();
        assert!(statements
            .iter()
            .any(|s| s.ends_with("WITH CLUSTERING ORDER BY (ts DESC)")));
        assert!(statements.contains(&"ALTER TABLE users ADD age int".to_string()));
        assert!(statements
            .contains(&"CREATE INDEX IF NOT EXISTS users_age ON users (age)".to_string()));
        assert_eq!(
            statements
                .iter()
                .filter(|s| s.starts_with("INSERT INTO schema_history"))
                .count(),
            2
        );
        connected.finish(Ok(())).await.unwrap();
    }

    #[tokio::test]
    async fn test_dry_run_commands_report_results() {
        let dir = TempDir::new().unwrap();
        let args = args(&dir);
        seed(&args);

        let applied = up(&args, Some(1)).await.unwrap();
        assert_eq!(applied.applied_migrations, vec!["20240101000000-events"]);

        // Without a reachable database nothing was ever applied.
        let entries = status(&args, true).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.status == MigrationStatus::Pending));

        let rolled_back = down(&args, 1).await.unwrap();
        assert_eq!(rolled_back.rolled_back_count, 0);
    }
}
