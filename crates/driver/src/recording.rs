//! Recording session for dry runs
//!
//! Accepts any statement without interpreting it. `SELECT`s go to an optional
//! backing session so the ledger reflects the real database; every other
//! statement is recorded and answered with an empty row set.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::session::{CqlSession, RowSet, SessionError, SessionHandle};

#[derive(Default)]
pub struct RecordingSession {
    reads: Option<SessionHandle>,
    statements: Mutex<Vec<String>>,
}

impl RecordingSession {
    /// Session with no backing database; reads return no rows
    pub fn new() -> Self {
        Self::default()
    }

    /// Session that serves reads from `reads`
    pub fn with_reads(reads: SessionHandle) -> Self {
        Self {
            reads: Some(reads),
            statements: Mutex::new(Vec::new()),
        }
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn is_backed(&self) -> bool {
        self.reads.is_some()
    }

    /// Statements that would have been sent, in order
    pub fn statements(&self) -> Vec<String> {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<String>> {
        self.statements
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn is_read(statement: &str) -> bool {
    statement
        .split_whitespace()
        .next()
        .is_some_and(|word| word.eq_ignore_ascii_case("select"))
}

impl fmt::Debug for RecordingSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordingSession")
            .field("backed", &self.is_backed())
            .field("statements", &self.lock().len())
            .finish()
    }
}

#[async_trait]
impl CqlSession for RecordingSession {
    async fn execute(&self, statement: &str) -> Result<RowSet, SessionError> {
        if is_read(statement) {
            let Some(reads) = &self.reads else {
                return Ok(RowSet::empty());
            };
            // The ledger table may only exist once the recorded CREATE runs.
            return match reads.execute(statement).await {
                Ok(rows) => Ok(rows),
                Err(e) => {
                    tracing::warn!(error = %e.message, statement, "read failed during dry run, using no rows");
                    Ok(RowSet::empty())
                }
            };
        }

        self.lock().push(statement.trim().to_string());
        Ok(RowSet::empty())
    }

    async fn shutdown(&self) -> Result<(), SessionError> {
        match &self.reads {
            Some(reads) => reads.shutdown().await,
            None => Ok(()),
        }
    }
}
