//! Connection Factory - maps a [`DriverConfig`] to a ready session handle

use std::fmt;
use std::sync::Arc;

use crate::config::DriverConfig;
use crate::error::{DriverError, DriverResult};
use crate::session::SessionHandle;

pub const DEFAULT_HOST: &str = "localhost";

/// CQL native protocol port
pub const DEFAULT_PORT: u16 = 9042;

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

/// Everything needed to open a session, with defaults applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    /// `host:port` entries
    pub contact_points: Vec<String>,
    pub keyspace: String,
    pub credentials: Option<Credentials>,
}

impl ConnectionParams {
    /// Validate the configuration and apply defaults.
    ///
    /// Fails when the keyspace is missing; credentials are only kept when
    /// both user and password are present.
    pub fn from_config(config: &DriverConfig) -> DriverResult<Self> {
        let keyspace = config
            .database
            .as_deref()
            .map(str::trim)
            .filter(|keyspace| !keyspace.is_empty())
            .ok_or_else(|| {
                DriverError::Configuration("keyspace must be defined in database config".to_string())
            })?
            .to_string();

        let port = config.port.unwrap_or(DEFAULT_PORT);
        let hosts = config.host.as_deref().unwrap_or(DEFAULT_HOST);
        let mut contact_points: Vec<String> = hosts
            .split(',')
            .map(str::trim)
            .filter(|host| !host.is_empty())
            .map(|host| with_port(host, port))
            .collect();
        if contact_points.is_empty() {
            contact_points.push(with_port(DEFAULT_HOST, port));
        }

        let credentials = match (&config.user, &config.password) {
            (Some(user), Some(password)) => Some(Credentials {
                user: user.clone(),
                password: password.clone(),
            }),
            _ => None,
        };

        Ok(Self {
            contact_points,
            keyspace,
            credentials,
        })
    }
}

/// Append the port unless the host already names one
fn with_port(host: &str, port: u16) -> String {
    if host.starts_with('[') {
        if host.contains("]:") {
            return host.to_string();
        }
        return format!("{}:{}", host, port);
    }
    match host.matches(':').count() {
        0 => format!("{}:{}", host, port),
        1 => host.to_string(),
        // bare IPv6 address
        _ => format!("[{}]:{}", host, port),
    }
}

/// Produce a session for the configuration, along with the parameters it
/// was resolved from.
///
/// The keyspace is validated before anything else, so a bad configuration
/// never reaches the network. A session supplied in the configuration is
/// reused as is.
pub async fn connect(config: &DriverConfig) -> DriverResult<(ConnectionParams, SessionHandle)> {
    let params = ConnectionParams::from_config(config)?;

    if let Some(session) = &config.session {
        tracing::debug!(keyspace = %params.keyspace, "reusing supplied session");
        return Ok((params, Arc::clone(session)));
    }

    tracing::debug!(
        keyspace = %params.keyspace,
        contact_points = ?params.contact_points,
        "opening session"
    );
    let session = open_session(&params).await?;
    Ok((params, session))
}

#[cfg(feature = "scylla")]
async fn open_session(params: &ConnectionParams) -> DriverResult<SessionHandle> {
    let session = crate::native::ScyllaSession::connect(params).await?;
    Ok(Arc::new(session))
}

#[cfg(not(feature = "scylla"))]
async fn open_session(_params: &ConnectionParams) -> DriverResult<SessionHandle> {
    Err(DriverError::Configuration(
        "no native CQL client compiled in: enable the `scylla` feature or supply a session".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemorySession;

    #[test]
    fn test_defaults() {
        let params = ConnectionParams::from_config(&DriverConfig::new("app")).unwrap();
        assert_eq!(params.contact_points, vec!["localhost:9042".to_string()]);
        assert_eq!(params.keyspace, "app");
        assert!(params.credentials.is_none());
    }

    #[test]
    fn test_missing_keyspace() {
        let err = ConnectionParams::from_config(&DriverConfig::default()).unwrap_err();
        assert!(err.is_configuration());

        let blank = DriverConfig::new("  ");
        assert!(ConnectionParams::from_config(&blank).is_err());
    }

    #[test]
    fn test_contact_points_and_port() {
        let config = DriverConfig::new("app")
            .with_host("10.0.0.1, 10.0.0.2:9142,[::1],fe80::1")
            .with_port(19042);
        let params = ConnectionParams::from_config(&config).unwrap();
        assert_eq!(
            params.contact_points,
            vec![
                "10.0.0.1:19042".to_string(),
                "10.0.0.2:9142".to_string(),
                "[::1]:19042".to_string(),
                "[fe80::1]:19042".to_string(),
            ]
        );
    }

    #[test]
    fn test_credentials_need_both_parts() {
        let mut config = DriverConfig::new("app");
        config.user = Some("admin".to_string());
        assert!(ConnectionParams::from_config(&config).unwrap().credentials.is_none());

        config.password = Some("secret".to_string());
        let credentials = ConnectionParams::from_config(&config)
            .unwrap()
            .credentials
            .unwrap();
        assert_eq!(credentials.user, "admin");
        assert_eq!(credentials.password, "secret");
        assert!(!format!("{:?}", credentials).contains("secret"));
    }

    #[tokio::test]
    async fn test_connect_without_keyspace_fails_before_network() {
        let session = MemorySession::shared();
        let config = DriverConfig::default().with_session(session.clone());

        let err = connect(&config).await.err().unwrap();
        assert!(err.is_configuration());
        assert!(session.statements().is_empty());
    }

    #[tokio::test]
    async fn test_connect_reuses_supplied_session() {
        let session = MemorySession::shared();
        let handle: SessionHandle = session.clone();
        let config = DriverConfig::new("app").with_session(handle.clone());

        let (params, connected) = connect(&config).await.unwrap();
        assert!(Arc::ptr_eq(&connected, &handle));
        assert_eq!(params.keyspace, "app");
        assert_eq!(params.contact_points, vec!["localhost:9042".to_string()]);
    }
}
