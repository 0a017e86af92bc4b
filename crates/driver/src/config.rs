//! Driver configuration
//!
//! [`DriverConfig`] is the explicit configuration handed to the driver at
//! construction time. [`DatabaseFile`] reads the per-environment
//! `database.json` layout used by migration tooling:
//!
//! ```json
//! {
//!   "defaultEnv": "dev",
//!   "dev": { "driver": "cassandra", "database": "app", "host": "127.0.0.1" },
//!   "prod": { "driver": "cassandra", "database": "app", "password": { "ENV": "CQL_PASSWORD" } }
//! }
//! ```

use std::fmt;
use std::path::Path;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_json::Value as JsonValue;

use crate::error::{DriverError, DriverResult};
use crate::session::SessionHandle;

/// Default ledger table name
pub const DEFAULT_MIGRATIONS_TABLE: &str = "migrations";

/// Driver names accepted in the `driver` field of `database.json`
const SUPPORTED_DRIVERS: &[&str] = &["cassandra", "scylla", "scylladb", "cql", "cqlsh"];

/// Connection and ledger settings for one driver instance
#[derive(Clone, Deserialize)]
pub struct DriverConfig {
    /// Keyspace to bind the session to (required)
    #[serde(default)]
    pub database: Option<String>,
    /// Contact point(s), comma separated
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default, deserialize_with = "deserialize_port")]
    pub port: Option<u16>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Ledger table name
    #[serde(default = "default_migrations_table", alias = "migrationTable")]
    pub migrations_table: String,
    /// Preconstructed session, reused instead of connecting
    #[serde(skip)]
    pub session: Option<SessionHandle>,
}

fn default_migrations_table() -> String {
    DEFAULT_MIGRATIONS_TABLE.to_string()
}

fn deserialize_port<'de, D>(deserializer: D) -> Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<JsonValue>::deserialize(deserializer)? {
        None | Some(JsonValue::Null) => Ok(None),
        Some(JsonValue::Number(n)) => n
            .as_u64()
            .and_then(|port| u16::try_from(port).ok())
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("invalid port {}", n))),
        Some(JsonValue::String(s)) => s
            .trim()
            .parse::<u16>()
            .map(Some)
            .map_err(|_| D::Error::custom(format!("invalid port '{}'", s))),
        Some(other) => Err(D::Error::custom(format!("invalid port {}", other))),
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            database: None,
            host: None,
            port: None,
            user: None,
            password: None,
            migrations_table: default_migrations_table(),
            session: None,
        }
    }
}

impl DriverConfig {
    /// Configuration bound to a keyspace
    pub fn new(keyspace: impl Into<String>) -> Self {
        Self {
            database: Some(keyspace.into()),
            ..Self::default()
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_migrations_table(mut self, table: impl Into<String>) -> Self {
        self.migrations_table = table.into();
        self
    }

    /// Reuse an existing session instead of connecting
    pub fn with_session(mut self, session: SessionHandle) -> Self {
        self.session = Some(session);
        self
    }
}

impl fmt::Debug for DriverConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverConfig")
            .field("database", &self.database)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("migrations_table", &self.migrations_table)
            .field("session", &self.session.as_ref().map(|_| "<session>"))
            .finish()
    }
}

/// Parsed `database.json`
#[derive(Debug, Clone)]
pub struct DatabaseFile {
    root: serde_json::Map<String, JsonValue>,
}

impl DatabaseFile {
    pub fn load(path: &Path) -> DriverResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DriverError::Configuration(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> DriverResult<Self> {
        match serde_json::from_str(content)? {
            JsonValue::Object(root) => Ok(Self { root }),
            _ => Err(DriverError::Configuration(
                "database config must be a JSON object keyed by environment".to_string(),
            )),
        }
    }

    /// Environment used when none is requested
    pub fn default_env(&self) -> &str {
        self.root
            .get("defaultEnv")
            .and_then(JsonValue::as_str)
            .unwrap_or("dev")
    }

    /// Names of all environments in the file
    pub fn environments(&self) -> Vec<&str> {
        self.root
            .iter()
            .filter(|(_, value)| value.is_object())
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Driver configuration for an environment, resolving `{"ENV": "VAR"}`
    /// values from the process environment
    pub fn environment(&self, env: Option<&str>) -> DriverResult<DriverConfig> {
        self.environment_with(env, |name| std::env::var(name).ok())
    }

    pub fn environment_with<F>(&self, env: Option<&str>, lookup: F) -> DriverResult<DriverConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = env.unwrap_or_else(|| self.default_env());
        let section = self
            .root
            .get(env)
            .and_then(JsonValue::as_object)
            .ok_or_else(|| {
                DriverError::Configuration(format!("environment '{}' not found in database config", env))
            })?;

        if let Some(driver) = section.get("driver").and_then(JsonValue::as_str) {
            if !SUPPORTED_DRIVERS.contains(&driver.to_lowercase().as_str()) {
                return Err(DriverError::Configuration(format!(
                    "environment '{}' uses driver '{}', expected one of: {}",
                    env,
                    driver,
                    SUPPORTED_DRIVERS.join(", ")
                )));
            }
        }

        let mut resolved = serde_json::Map::new();
        for (key, value) in section {
            resolved.insert(key.clone(), resolve_env_value(key, value, &lookup)?);
        }

        serde_json::from_value(JsonValue::Object(resolved)).map_err(|e| {
            DriverError::Configuration(format!("invalid settings for environment '{}': {}", env, e))
        })
    }
}

fn resolve_env_value<F>(key: &str, value: &JsonValue, lookup: &F) -> DriverResult<JsonValue>
where
    F: Fn(&str) -> Option<String>,
{
    let var = match value {
        JsonValue::Object(map) if map.len() == 1 => map.get("ENV").and_then(JsonValue::as_str),
        _ => None,
    };

    match var {
        Some(var) => lookup(var).map(JsonValue::String).ok_or_else(|| {
            DriverError::Configuration(format!(
                "environment variable {} referenced by '{}' is not set",
                var, key
            ))
        }),
        None => Ok(value.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FILE: &str = r#"{
        "defaultEnv": "test",
        "dev": { "driver": "cassandra", "database": "app_dev" },
        "test": {
            "driver": "cassandra",
            "database": "app_test",
            "host": "10.0.0.1,10.0.0.2",
            "port": "19042",
            "user": "migrator",
            "password": { "ENV": "CQL_PASSWORD" }
        },
        "mysql": { "driver": "mysql", "database": "app" }
    }"#;

    #[test]
    fn test_default_env_and_env_resolution() {
        let file = DatabaseFile::parse(FILE).unwrap();
        assert_eq!(file.default_env(), "test");

        let config = file
            .environment_with(None, |name| {
                (name == "CQL_PASSWORD").then(|| "s3cret".to_string())
            })
            .unwrap();
        assert_eq!(config.database.as_deref(), Some("app_test"));
        assert_eq!(config.host.as_deref(), Some("10.0.0.1,10.0.0.2"));
        assert_eq!(config.port, Some(19042));
        assert_eq!(config.password.as_deref(), Some("s3cret"));
        assert_eq!(config.migrations_table, DEFAULT_MIGRATIONS_TABLE);
    }

    #[test]
    fn test_missing_env_variable() {
        let file = DatabaseFile::parse(FILE).unwrap();
        let err = file.environment_with(Some("test"), |_| None).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("CQL_PASSWORD"));
    }

    #[test]
    fn test_unknown_environment_and_driver() {
        let file = DatabaseFile::parse(FILE).unwrap();
        assert!(file.environment_with(Some("staging"), |_| None).is_err());
        assert!(file.environment_with(Some("mysql"), |_| None).is_err());

        let dev = file.environment_with(Some("dev"), |_| None).unwrap();
        assert_eq!(dev.database.as_deref(), Some("app_dev"));
        assert!(dev.host.is_none());
        assert!(dev.port.is_none());
    }

    #[test]
    fn test_rejects_non_object_root() {
        assert!(DatabaseFile::parse("[1, 2]").is_err());
        assert!(DatabaseFile::parse("not json").is_err());
    }

    #[test]
    fn test_debug_hides_password() {
        let config = DriverConfig::new("app").with_credentials("admin", "hunter2");
        let debug = format!("{:?}", config);
        assert!(debug.contains("admin"));
        assert!(!debug.contains("hunter2"));
    }
}
