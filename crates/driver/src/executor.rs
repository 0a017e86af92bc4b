//! Execution Adapter - runs statements and normalizes client failures

use crate::error::{DriverError, DriverResult};
use crate::session::{RowSet, SessionHandle};

/// Submits statements to a session
#[derive(Clone)]
pub struct Executor {
    session: SessionHandle,
}

impl Executor {
    pub fn new(session: SessionHandle) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    /// Execute one statement.
    ///
    /// A client failure is logged together with the statement and returned as
    /// [`DriverError::Execution`]; the client's own error type never leaks.
    pub async fn execute(&self, statement: &str) -> DriverResult<RowSet> {
        tracing::debug!(statement, "executing statement");

        match self.session.execute(statement).await {
            Ok(rows) => Ok(rows),
            Err(e) => {
                tracing::error!("{}", e.message);
                tracing::debug!(statement, "failed statement");
                Err(DriverError::Execution {
                    message: e.message,
                    statement: statement.to_string(),
                })
            }
        }
    }

    /// Execute statements in order, stopping at the first failure
    pub async fn execute_all<I, S>(&self, statements: I) -> DriverResult<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for statement in statements {
            self.execute(statement.as_ref()).await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor").finish_non_exhaustive()
    }
}
