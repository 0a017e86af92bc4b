use std::sync::Arc;
use std::time::Duration;

use cqlmig_driver::statement::build_create_table;
use cqlmig_driver::{
    compat, ColumnSpec, CqlDriver, DriverConfig, DriverError, MemorySession, MigrationDriver,
    TableConstraints,
};

async fn driver() -> (Arc<MemorySession>, CqlDriver) {
    let session = MemorySession::shared();
    let driver = CqlDriver::connect(DriverConfig::new("app").with_session(session.clone()))
        .await
        .unwrap();
    driver.create_migrations_table().await.unwrap();
    (session, driver)
}

#[test]
fn test_key_clause_normalization() {
    let columns = vec![("a".to_string(), ColumnSpec::from("varchar"))];

    let single = build_create_table("t", &columns, &TableConstraints::primary_key("a"));
    assert!(single.contains("PRIMARY KEY (a)"));

    let composite = build_create_table("t", &columns, &TableConstraints::primary_key("(a,b)"));
    assert!(composite.contains("PRIMARY KEY (a,b)"));
    assert!(!composite.contains("((a,b))"));
}

#[tokio::test]
async fn test_record_list_delete() {
    let (_, driver) = driver().await;

    driver.add_migration_record("2024-01-01-abc").await.unwrap();
    let applied = driver.all_loaded_migrations().await.unwrap();
    assert_eq!(
        applied.iter().filter(|r| r.name == "2024-01-01-abc").count(),
        1
    );

    driver.delete_migration("2024-01-01-abc").await.unwrap();
    let applied = driver.all_loaded_migrations().await.unwrap();
    assert!(applied.iter().all(|r| r.name != "2024-01-01-abc"));
}

#[tokio::test]
async fn test_missing_keyspace_never_touches_session() {
    let session = MemorySession::shared();
    let err = CqlDriver::connect(DriverConfig::default().with_session(session.clone()))
        .await
        .unwrap_err();

    assert!(matches!(err, DriverError::Configuration(_)));
    assert!(session.statements().is_empty());
}

#[tokio::test]
async fn test_failing_statement_completes_with_execution_error() {
    let (session, driver) = driver().await;
    session.fail_on("CREATE TABLE IF NOT EXISTS events", "Keyspace app does not exist");

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        driver.create_table(
            "events",
            &[("id".to_string(), ColumnSpec::key("timeuuid"))],
            &TableConstraints::default(),
        ),
    )
    .await
    .expect("call completed");

    let err = result.unwrap_err();
    assert!(err.is_execution());
    assert_eq!(err.to_string(), "Execution error: Keyspace app does not exist");
}

#[tokio::test]
async fn test_callback_consumers_see_the_same_result() {
    let (_, driver) = driver().await;
    let mut names = Vec::new();

    let result = compat::complete(driver.all_loaded_migrations(), |result| {
        if let Ok(records) = result {
            names.extend(records.iter().map(|r| r.name.clone()));
        }
    })
    .await;

    assert!(result.unwrap().is_empty());
    assert!(names.is_empty());
}
