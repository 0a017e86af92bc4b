//! Structured logging setup for the command line

use std::io;

use tracing_subscriber::{fmt::Layer, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Logging configuration for the CLI
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level filter used when `RUST_LOG` is not set
    pub level: String,
    /// Emit JSON lines instead of plain text
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl LoggingConfig {
    pub fn from_flags(verbose: bool, json_format: bool) -> Self {
        Self {
            level: if verbose { "debug" } else { "info" }.to_string(),
            json_format,
        }
    }

    /// Filter directive covering this tool and its driver
    pub fn directive(&self) -> String {
        format!("cqlmig={level},cqlmig_driver={level}", level = self.level)
    }
}

/// Initialize logging; `RUST_LOG` takes precedence over the configured level.
/// Logs go to stderr so command output on stdout stays clean.
pub fn init_logging(config: &LoggingConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(config.directive()))?;

    if config.json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(Layer::new().with_writer(io::stderr).json())
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(Layer::new().with_writer(io::stderr).with_target(false))
            .try_init()?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_select_level() {
        assert_eq!(LoggingConfig::from_flags(false, false).level, "info");

        let verbose = LoggingConfig::from_flags(true, true);
        assert!(verbose.json_format);
        assert_eq!(verbose.directive(), "cqlmig=debug,cqlmig_driver=debug");
    }
}
