use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use quarry_compiler::QueryAst;
use quarry_core::{
    Driver, DriverError, MemorySink, QuarryError, QueryEvent, QueryOutcome,
};

use super::*;
use crate::client::ClientConfig;
use crate::testing::MockDriver;

fn mock_client(dialect: &str) -> (Arc<MockDriver>, Arc<Client>) {
    let driver = MockDriver::new();
    let client =
        Client::new(ClientConfig::new(dialect), driver.clone()).expect("client should build");
    (driver, Arc::new(client))
}

// ============================================================================
// Commit and rollback
// ============================================================================

#[tokio::test]
async fn test_commit_on_scope_success() {
    let (driver, client) = mock_client("pg");

    let value = client
        .transaction(|trx| async move {
            trx.query(&QueryAst::select("users")).await?;
            Ok(42)
        })
        .await
        .expect("transaction should commit");

    assert_eq!(value, 42);
    assert_eq!(
        driver.executed(),
        vec![
            "BEGIN;".to_string(),
            "select * from \"users\"".to_string(),
            "COMMIT;".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_rollback_on_scope_error() {
    let (driver, client) = mock_client("pg");

    let err = client
        .transaction::<(), _, _>(|trx| async move {
            trx.query(&QueryAst::select("users")).await?;
            Err(QuarryError::Transaction("caller bailed".into()))
        })
        .await
        .expect_err("scope returns an error");

    assert!(matches!(err, QuarryError::Transaction(_)));
    assert_eq!(
        driver.executed(),
        vec![
            "BEGIN;".to_string(),
            "select * from \"users\"".to_string(),
            "ROLLBACK".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_connection_returns_to_pool_after_commit() {
    let (_driver, client) = mock_client("pg");

    client
        .transaction(|_trx| async move { Ok(()) })
        .await
        .expect("transaction should commit");

    let stats = client.pool().stats();
    assert_eq!(stats.active(), 0);
    assert_eq!(stats.idle(), 1);
}

#[tokio::test]
async fn test_explicit_commit_inside_scope_is_honored() {
    let (driver, client) = mock_client("pg");

    client
        .transaction(|trx| async move {
            trx.commit().await?;
            assert_eq!(trx.state(), TxState::Committed);
            Ok(())
        })
        .await
        .expect("transaction already committed");

    let commits = driver.executed().iter().filter(|sql| *sql == "COMMIT;").count();
    assert_eq!(commits, 1);
}

#[tokio::test]
async fn test_completion_happens_exactly_once() {
    let (_driver, client) = mock_client("pg");

    client
        .transaction(|trx| async move {
            trx.commit().await?;
            let err = trx.commit().await.expect_err("already committed");
            assert!(matches!(err, QuarryError::TransactionCompleted));
            let err = trx.rollback().await.expect_err("already committed");
            assert!(matches!(err, QuarryError::TransactionCompleted));
            Ok(())
        })
        .await
        .expect("transaction should resolve");
}

#[tokio::test]
async fn test_query_after_completion_is_rejected() {
    let (_driver, client) = mock_client("pg");

    client
        .transaction(|trx| async move {
            trx.rollback().await?;
            let err = trx
                .query(&QueryAst::select("users"))
                .await
                .expect_err("transaction is finished");
            assert!(matches!(err, QuarryError::TransactionCompleted));
            Ok(())
        })
        .await
        .expect("outer resolution should succeed");
}

#[tokio::test]
async fn test_statements_carry_the_transaction_id() {
    let sink = MemorySink::new();
    let driver = MockDriver::new();
    let client = Arc::new(
        Client::new(ClientConfig::new("pg"), driver.clone())
            .expect("client should build")
            .with_event_sink(sink.clone()),
    );

    client
        .transaction(|trx| async move {
            trx.query(&QueryAst::select("users")).await?;
            Ok(())
        })
        .await
        .expect("transaction should commit");

    let tx_ids: Vec<_> = sink
        .events()
        .iter()
        .filter_map(|e| match e {
            QueryEvent::Query { tx_id, .. } => Some(*tx_id),
            _ => None,
        })
        .collect();
    assert_eq!(tx_ids.len(), 1);
    assert!(tx_ids[0].is_some());
}

// ============================================================================
// Nesting
// ============================================================================

#[tokio::test]
async fn test_nested_rollback_uses_savepoints() {
    let (driver, client) = mock_client("pg");

    client
        .transaction(|trx| async move {
            let result: Result<()> = trx
                .transaction(|inner| async move {
                    inner.query(&QueryAst::select("users")).await?;
                    Err(QuarryError::Transaction("inner bailed".into()))
                })
                .await;
            assert!(result.is_err());
            Ok(())
        })
        .await
        .expect("outer transaction should still commit");

    let executed = driver.executed();
    assert_eq!(executed[0], "BEGIN;");
    assert!(executed[1].starts_with("SAVEPOINT trx_"));
    assert_eq!(executed[2], "select * from \"users\"");
    assert!(executed[3].starts_with("ROLLBACK TO SAVEPOINT trx_"));
    assert_eq!(executed[4], "COMMIT;");

    // the savepoint rolled back is the one that was set
    let set = executed[1].trim_start_matches("SAVEPOINT ").trim_end_matches(';');
    let rolled = executed[3].trim_start_matches("ROLLBACK TO SAVEPOINT ");
    assert_eq!(set, rolled);
}

#[tokio::test]
async fn test_nested_commit_issues_no_statement() {
    let (driver, client) = mock_client("pg");

    client
        .transaction(|trx| async move {
            trx.transaction(|inner| async move {
                inner.query(&QueryAst::select("users")).await?;
                Ok(())
            })
            .await
        })
        .await
        .expect("both levels should commit");

    // nested begin sets a savepoint, nested commit leaves it alone
    let executed = driver.executed();
    assert_eq!(executed.len(), 4);
    assert_eq!(executed[0], "BEGIN;");
    assert!(executed[1].starts_with("SAVEPOINT trx_"));
    assert_eq!(executed[2], "select * from \"users\"");
    assert_eq!(executed[3], "COMMIT;");
}

#[tokio::test]
async fn test_nested_runs_on_the_outer_connection() {
    let (driver, client) = mock_client("pg");

    client
        .transaction(|trx| async move {
            trx.transaction(|inner| async move {
                inner.query(&QueryAst::select("users")).await?;
                Ok(())
            })
            .await
        })
        .await
        .expect("both levels should commit");

    assert_eq!(driver.connect_count(), 1);
}

#[tokio::test]
async fn test_savepoints_noop_where_unsupported() {
    let (driver, client) = mock_client("redshift");

    client
        .transaction(|trx| async move {
            trx.transaction(|inner| async move {
                inner.query(&QueryAst::select("users")).await?;
                Ok(())
            })
            .await
        })
        .await
        .expect("both levels should commit");

    assert!(!driver.executed().iter().any(|sql| sql.contains("SAVEPOINT")));
}

#[tokio::test]
async fn test_implicit_commit_marks_transaction_committed() {
    let (driver, client) = mock_client("mysql");

    let trx = Transaction::begin(client.clone(), None, None)
        .await
        .expect("outer begin should succeed");
    let inner = Transaction::begin(client.clone(), Some(trx.clone()), None)
        .await
        .expect("inner begin should succeed");

    // rolling back to a savepoint a DDL statement committed away raises
    // errno 1305; the engine treats the transaction as already committed
    driver.push_error(DriverError::with_code("SAVEPOINT does not exist", "1305"));
    inner
        .rollback()
        .await
        .expect("implicit commit is tolerated");
    assert_eq!(inner.state(), TxState::Committed);

    trx.commit().await.expect("outer commit should succeed");
}

// ============================================================================
// Dialect transaction styles
// ============================================================================

#[tokio::test]
async fn test_autocommit_style_toggles_the_driver_flag() {
    let (driver, client) = mock_client("oracle");

    client
        .transaction(|trx| async move {
            trx.query(&QueryAst::select("users")).await?;
            Ok(())
        })
        .await
        .expect("transaction should commit");

    assert_eq!(
        driver.executed(),
        vec![
            "#autocommit=false".to_string(),
            "select * from \"users\"".to_string(),
            "#commit".to_string(),
            "#autocommit=true".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_autocommit_restored_after_rollback() {
    let (driver, client) = mock_client("oracle");

    let _ = client
        .transaction::<(), _, _>(|_trx| async move {
            Err(QuarryError::Transaction("caller bailed".into()))
        })
        .await;

    assert_eq!(
        driver.executed(),
        vec![
            "#autocommit=false".to_string(),
            "#rollback".to_string(),
            "#autocommit=true".to_string(),
        ]
    );
}

// ============================================================================
// External connections
// ============================================================================

#[tokio::test]
async fn test_external_connection_stays_in_caller_custody() {
    let (driver, client) = mock_client("pg");
    let conn: Arc<dyn DriverConnection> = Arc::from(
        driver
            .connect(&quarry_core::ConnectionSettings::default())
            .await
            .expect("connect should succeed"),
    );

    client
        .transaction_with_connection(conn.clone(), |trx| async move {
            trx.query(&QueryAst::select("users")).await?;
            Ok(())
        })
        .await
        .expect("transaction should commit");

    // never pooled, never closed
    assert_eq!(client.pool().stats().total(), 0);
    assert_eq!(driver.closed_count(), 0);
    assert!(conn.is_alive());
}

// ============================================================================
// Failure modes
// ============================================================================

#[tokio::test]
async fn test_failed_begin_surfaces_and_retires_the_connection() {
    let (driver, client) = mock_client("pg");
    driver.push_error(DriverError::new("server shutting down"));

    let err = client
        .transaction(|_trx| async move { Ok(()) })
        .await
        .expect_err("BEGIN is scripted to fail");

    assert!(matches!(err, QuarryError::Transaction(_)));
    assert_eq!(client.pool().stats().idle(), 0);
}

#[tokio::test]
async fn test_abandoned_transaction_rolls_back_on_drop() {
    let (driver, client) = mock_client("pg");

    let trx = Transaction::begin(client.clone(), None, None)
        .await
        .expect("begin should succeed");
    trx.query(&QueryAst::select("users"))
        .await
        .expect("query should succeed");
    drop(trx);

    // rollback and close run on a detached task
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(driver.executed().last(), Some(&"ROLLBACK".to_string()));
    assert_eq!(driver.closed_count(), 1);
    assert_eq!(client.pool().stats().idle(), 0);
}

#[tokio::test]
async fn test_abandoned_nested_transaction_rolls_back_its_savepoint() {
    let (driver, client) = mock_client("pg");

    let trx = Transaction::begin(client.clone(), None, None)
        .await
        .expect("outer begin should succeed");
    let inner = Transaction::begin(client.clone(), Some(trx.clone()), None)
        .await
        .expect("inner begin should succeed");
    drop(inner);

    tokio::time::sleep(Duration::from_millis(50)).await;
    let executed = driver.executed();
    assert!(
        executed
            .last()
            .expect("statements were executed")
            .starts_with("ROLLBACK TO SAVEPOINT trx_")
    );

    trx.commit().await.expect("outer commit should succeed");
}

#[tokio::test]
async fn test_rollback_failure_carries_the_original_error() {
    let (driver, client) = mock_client("pg");
    // BEGIN succeeds, ROLLBACK fails
    driver.push(crate::testing::MockReply::Respond(
        quarry_core::DriverResponse::empty(quarry_core::Command::Other),
    ));
    driver.push_error(DriverError::new("connection reset"));

    let err = client
        .transaction::<(), _, _>(|_trx| async move {
            Err(QuarryError::Transaction("caller bailed".into()))
        })
        .await
        .expect_err("both scope and rollback fail");

    match err {
        QuarryError::Transaction(message) => {
            assert!(message.contains("caller bailed"));
            assert!(message.contains("rollback also failed"));
        }
        other => panic!("expected Transaction error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_runner_outcomes_flow_through_transactions() {
    let (driver, client) = mock_client("pg");
    driver.push(crate::testing::MockReply::Respond(
        quarry_core::DriverResponse::empty(quarry_core::Command::Other),
    ));
    driver.push_rows(vec![quarry_core::Row::new(
        vec!["id".into()],
        vec![quarry_core::Value::Int(7)],
    )]);

    let rows = client
        .transaction(|trx| async move {
            let outcomes = trx.query(&QueryAst::select("users")).await?;
            match outcomes.into_iter().next() {
                Some(QueryOutcome::Rows(rows)) => Ok(rows),
                other => panic!("expected rows, got {:?}", other),
            }
        })
        .await
        .expect("transaction should commit");

    assert_eq!(rows.len(), 1);
}
