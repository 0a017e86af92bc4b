//! Completion-callback adapter
//!
//! Driver methods return one `DriverResult` future. Callers written against a
//! completion callback go through these helpers instead of every method
//! accepting an optional callback.

use std::future::Future;

use tokio::task::JoinHandle;

use crate::error::DriverResult;

/// Await `future`, pass its result to `callback`, then return it
pub async fn complete<T, F, C>(future: F, callback: C) -> DriverResult<T>
where
    F: Future<Output = DriverResult<T>>,
    C: FnOnce(&DriverResult<T>),
{
    let result = future.await;
    callback(&result);
    result
}

/// Run `future` on the runtime and hand the owned result to `callback`
pub fn spawn_with_callback<T, F, C>(future: F, callback: C) -> JoinHandle<()>
where
    F: Future<Output = DriverResult<T>> + Send + 'static,
    T: Send + 'static,
    C: FnOnce(DriverResult<T>) + Send + 'static,
{
    tokio::spawn(async move {
        callback(future.await);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{CqlDriver, MigrationDriver};
    use crate::error::DriverError;
    use crate::memory::MemorySession;
    use crate::DriverConfig;
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn test_complete_calls_back_and_returns() {
        let seen = Arc::new(Mutex::new(None));
        let seen_in_callback = seen.clone();

        let result = complete(async { Ok::<_, DriverError>(7) }, move |r| {
            *seen_in_callback.lock().unwrap() = r.as_ref().ok().copied();
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(*seen.lock().unwrap(), Some(7));
    }

    #[tokio::test]
    async fn test_failure_reaches_callback() {
        let session = MemorySession::shared();
        session.fail_on("DROP", "unconfigured table ghosts");
        let driver = CqlDriver::connect(DriverConfig::new("app").with_session(session))
            .await
            .unwrap();

        let (tx, rx) = tokio::sync::oneshot::channel();
        let driver = Arc::new(driver);
        let task_driver = driver.clone();
        spawn_with_callback(
            async move { task_driver.drop_table("ghosts").await },
            move |result| {
                let _ = tx.send(result.is_err());
            },
        )
        .await
        .unwrap();

        assert!(rx.await.unwrap());
    }
}
