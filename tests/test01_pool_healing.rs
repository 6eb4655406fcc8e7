#![cfg(feature = "mock")]

use std::time::Duration;

use pg_steady::prelude::*;
use pg_steady::test_utils::{MockCall, MockDatabase};
use tracing_subscriber::EnvFilter;

fn settings() -> PoolSettings {
    PoolSettings {
        pool_size: 2,
        checkout_timeout: Duration::from_millis(200),
        max_heal_attempts: 10,
        heal_backoff: Duration::ZERO,
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn executes(db: &MockDatabase) -> usize {
    db.calls()
        .iter()
        .filter(|c| matches!(c, MockCall::Execute { .. }))
        .count()
}

#[tokio::test]
async fn lost_connection_heals_and_retries() -> Result<(), PgSteadyError> {
    init_tracing();
    let db = MockDatabase::new();
    db.respond_rows("SELECT 1 AS one", &["one"], vec![vec![RowValues::Int(1)]]);
    let pool = db.pool(settings());

    db.lose_connection_for(3);
    let rs = pool.execute("SELECT 1 AS one", &[]).await?;

    assert_eq!(
        rs.first().and_then(|row| row.get("one")),
        Some(&RowValues::Int(1))
    );
    let stats = pool.stats();
    assert_eq!(stats.heals, 3);
    assert_eq!(stats.generation, 3);
    assert_eq!(executes(&db), 4);
    assert!(db.connects() >= 4);
    Ok(())
}

#[tokio::test]
async fn gives_up_after_heal_budget_is_spent() {
    init_tracing();
    let db = MockDatabase::new();
    let pool = db.pool(settings());

    db.lose_connection_for(u32::MAX);
    let err = pool.execute("SELECT 1", &[]).await.unwrap_err();

    assert!(err.is_connection_lost());
    assert_eq!(pool.stats().heals, 10);
    assert_eq!(executes(&db), 11);
}

#[tokio::test]
async fn refused_connect_heals_and_retries() -> Result<(), PgSteadyError> {
    init_tracing();
    let db = MockDatabase::new();
    let pool = db.pool(PoolSettings {
        checkout_timeout: Duration::from_millis(50),
        ..settings()
    });

    db.refuse_connections_for(1);
    pool.execute("SELECT 1", &[]).await?;

    assert_eq!(pool.stats().heals, 1);
    assert_eq!(db.connects(), 1);
    Ok(())
}

#[tokio::test]
async fn unreachable_server_spends_heal_budget() {
    init_tracing();
    let db = MockDatabase::new();
    let pool = db.pool(PoolSettings {
        checkout_timeout: Duration::from_millis(50),
        max_heal_attempts: 2,
        ..settings()
    });

    db.refuse_connections_for(u32::MAX);
    let outcome = tokio::time::timeout(Duration::from_secs(3), pool.execute("SELECT 1", &[]))
        .await
        .expect("pool gives up instead of waiting forever");

    let err = outcome.unwrap_err();
    assert!(err.is_connection_lost());
    assert_eq!(pool.stats().heals, 2);
    assert_eq!(db.connects(), 0);
}

#[tokio::test]
async fn other_errors_are_not_healed() {
    let db = MockDatabase::new();
    db.syntax_error_on("SELEKT");
    let pool = db.pool(settings());

    let err = pool.execute("SELEKT 1", &[]).await.unwrap_err();

    assert!(matches!(err, PgSteadyError::StatementSyntaxError { .. }));
    assert_eq!(pool.stats().heals, 0);
    assert_eq!(executes(&db), 1);
}

#[tokio::test]
async fn transaction_is_rerun_after_lost_begin() -> Result<(), PgSteadyError> {
    let db = MockDatabase::new();
    let pool = db.pool(settings());

    db.lose_connection_for(1);
    let total = pool
        .transaction(|conn| {
            Box::pin(async move {
                conn.execute("UPDATE counters SET n = n + 1", &[]).await?;
                Ok(1)
            })
        })
        .await?;

    assert_eq!(total, 1);
    assert_eq!(pool.stats().heals, 1);
    let calls = db.calls();
    let begins = calls.iter().filter(|c| **c == MockCall::Begin).count();
    let commits = calls.iter().filter(|c| **c == MockCall::Commit).count();
    assert_eq!(begins, 2);
    assert_eq!(commits, 1);
    Ok(())
}

#[tokio::test]
async fn failing_block_rolls_back() {
    let db = MockDatabase::new();
    let pool = db.pool(settings());

    let err = pool
        .transaction(|conn| {
            Box::pin(async move {
                conn.execute("UPDATE counters SET n = n + 1", &[]).await?;
                Err::<(), _>(PgSteadyError::ExecutionError("business rule".into()))
            })
        })
        .await
        .unwrap_err();

    assert!(matches!(err, PgSteadyError::ExecutionError(_)));
    let calls = db.calls();
    assert!(calls.contains(&MockCall::Rollback));
    assert!(!calls.contains(&MockCall::Commit));
}

#[tokio::test]
async fn checkout_timeout_is_retried() -> Result<(), PgSteadyError> {
    let db = MockDatabase::new();
    let pool = db.pool(PoolSettings {
        pool_size: 1,
        checkout_timeout: Duration::from_millis(50),
        ..settings()
    });

    let holder = pool.with(|conn| async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        drop(conn);
        Ok(())
    });
    let waiter = async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        pool.execute("SELECT 1", &[]).await
    };
    let (held, waited) = tokio::join!(holder, waiter);
    held?;
    waited?;

    let stats = pool.stats();
    assert!(stats.checkout_retries >= 1);
    assert_eq!(stats.heals, 0);
    Ok(())
}
