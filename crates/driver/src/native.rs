//! Native session on the `scylla` client
//!
//! Works against both ScyllaDB and Apache Cassandra through the CQL native
//! protocol.

use async_trait::async_trait;
use chrono::DateTime;
use scylla::frame::response::result::CqlValue as NativeValue;
use scylla::{Session, SessionBuilder};

use crate::connection::ConnectionParams;
use crate::error::{DriverError, DriverResult};
use crate::session::{CqlSession, CqlValue, RowSet, SessionError};

pub struct ScyllaSession {
    session: Session,
}

impl ScyllaSession {
    pub async fn connect(params: &ConnectionParams) -> DriverResult<Self> {
        let mut builder = SessionBuilder::new();
        for node in &params.contact_points {
            builder = builder.known_node(node);
        }
        builder = builder.use_keyspace(params.keyspace.clone(), false);
        if let Some(credentials) = &params.credentials {
            builder = builder.user(credentials.user.clone(), credentials.password.clone());
        }

        let session = builder.build().await.map_err(|e| {
            tracing::error!("Failed to open CQL session: {}", e);
            DriverError::Connection(format!("Failed to open CQL session: {}", e))
        })?;

        tracing::info!(keyspace = %params.keyspace, "CQL session established");
        Ok(Self { session })
    }

    pub fn inner(&self) -> &Session {
        &self.session
    }
}

#[async_trait]
impl CqlSession for ScyllaSession {
    async fn execute(&self, statement: &str) -> Result<RowSet, SessionError> {
        let result = self
            .session
            .query(statement, ())
            .await
            .map_err(|e| SessionError::new(e.to_string()))?;

        let columns = result
            .col_specs
            .iter()
            .map(|spec| spec.name.clone())
            .collect();
        let rows = result
            .rows
            .unwrap_or_default()
            .into_iter()
            .map(|row| row.columns.into_iter().map(convert_value).collect())
            .collect();

        Ok(RowSet::new(columns, rows))
    }

    async fn shutdown(&self) -> Result<(), SessionError> {
        // The client closes its connections when the last handle is dropped
        tracing::debug!("CQL session released");
        Ok(())
    }
}

fn convert_value(value: Option<NativeValue>) -> CqlValue {
    match value {
        None => CqlValue::Null,
        Some(NativeValue::Ascii(s)) | Some(NativeValue::Text(s)) => CqlValue::Text(s),
        Some(NativeValue::Boolean(b)) => CqlValue::Boolean(b),
        Some(NativeValue::Int(i)) => CqlValue::Int(i),
        Some(NativeValue::BigInt(i)) => CqlValue::BigInt(i),
        Some(NativeValue::Double(f)) => CqlValue::Double(f),
        Some(NativeValue::Float(f)) => CqlValue::Double(f as f64),
        Some(NativeValue::Timestamp(ts)) => DateTime::from_timestamp_millis(ts.0)
            .map(CqlValue::Timestamp)
            .unwrap_or(CqlValue::BigInt(ts.0)),
        Some(NativeValue::Blob(b)) => CqlValue::Blob(b),
        Some(NativeValue::List(items)) | Some(NativeValue::Set(items)) => {
            CqlValue::List(items.into_iter().map(|v| convert_value(Some(v))).collect())
        }
        Some(other) => CqlValue::Text(format!("{:?}", other)),
    }
}
