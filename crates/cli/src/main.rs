mod commands;
mod logging;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use commands::migrate;
use logging::{init_logging, LoggingConfig};

#[derive(Parser)]
#[command(name = "cqlmig")]
#[command(version, about = "Schema migrations for Cassandra and ScyllaDB")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every command
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Database config file keyed by environment
    #[arg(long, global = true, default_value = "database.json")]
    pub config: PathBuf,

    /// Environment to use (defaults to the file's defaultEnv)
    #[arg(long, short, global = true)]
    pub env: Option<String>,

    /// Directory holding .cql migration files
    #[arg(long, global = true, default_value = "migrations")]
    pub migrations_dir: PathBuf,

    /// Ledger table name
    #[arg(long, global = true)]
    pub table: Option<String>,

    /// Print the statements instead of sending them; the ledger is still read
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Debug logging
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Log as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the migrations ledger table
    Init,

    /// Create a new migration file
    Create {
        /// Migration name
        name: String,
    },

    /// Apply pending migrations
    Up {
        /// Apply at most this many
        #[arg(long, short)]
        count: Option<usize>,
    },

    /// Roll back applied migrations, most recent first
    Down {
        #[arg(long, short, default_value_t = 1)]
        count: usize,
    },

    /// Show applied and pending migrations
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(&LoggingConfig::from_flags(cli.global.verbose, cli.global.json_logs))
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    match cli.command {
        Commands::Init => migrate::init(&cli.global).await?,
        Commands::Create { name } => migrate::create(&cli.global, &name)?,
        Commands::Up { count } => {
            migrate::up(&cli.global, count).await?;
        }
        Commands::Down { count } => {
            migrate::down(&cli.global, count).await?;
        }
        Commands::Status { json } => {
            migrate::status(&cli.global, json).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "cqlmig", "up", "--count", "2", "--env", "prod", "--dry-run",
        ])
        .unwrap();

        assert!(matches!(cli.command, Commands::Up { count: Some(2) }));
        assert_eq!(cli.global.env.as_deref(), Some("prod"));
        assert!(cli.global.dry_run);
        assert_eq!(cli.global.config, PathBuf::from("database.json"));
    }

    #[test]
    fn test_down_defaults_to_one() {
        let cli = Cli::try_parse_from(["cqlmig", "down"]).unwrap();
        assert!(matches!(cli.command, Commands::Down { count: 1 }));
    }

    #[test]
    fn test_create_requires_name() {
        assert!(Cli::try_parse_from(["cqlmig", "create"]).is_err());
    }
}
