#![cfg(feature = "mock")]

use std::time::Duration;

use pg_steady::prelude::*;
use pg_steady::test_utils::{MockCall, MockDatabase, MockSession};

fn single_session() -> PoolSettings {
    PoolSettings {
        pool_size: 1,
        checkout_timeout: Duration::from_millis(200),
        max_heal_attempts: 2,
        heal_backoff: Duration::ZERO,
    }
}

fn count(db: &MockDatabase, pred: impl Fn(&MockCall) -> bool) -> usize {
    db.calls().iter().filter(|c| pred(c)).count()
}

#[tokio::test]
async fn missing_statement_is_prepared_once_per_session() -> Result<(), PgSteadyError> {
    let db = MockDatabase::new();
    db.respond_rows("SELECT id FROM users", &["id"], vec![vec![RowValues::Int(7)]]);
    let pool = db.pool(single_session());

    let first = pool.exec_stmt("users_all", "SELECT id FROM users", &[]).await?;
    let second = pool.exec_stmt("users_all", "SELECT id FROM users", &[]).await?;

    assert_eq!(first.len(), 1);
    assert_eq!(second.first().unwrap().try_int("id")?, 7);
    assert_eq!(count(&db, |c| matches!(c, MockCall::Prepare { .. })), 1);
    assert_eq!(
        count(&db, |c| matches!(c, MockCall::ExecutePrepared { .. })),
        3
    );
    Ok(())
}

#[tokio::test]
async fn transaction_falls_back_to_plain_execution() -> Result<(), PgSteadyError> {
    let db = MockDatabase::new();
    db.respond_rows("SELECT id FROM users", &["id"], vec![vec![RowValues::Int(7)]]);
    let pool = db.pool(single_session());

    let rows = pool
        .transaction(|conn| {
            Box::pin(async move { exec_stmt(conn, "users_all", "SELECT id FROM users", &[]).await })
        })
        .await?;

    assert_eq!(rows.len(), 1);
    let calls: Vec<MockCall> = db
        .calls()
        .into_iter()
        .filter(|c| *c != MockCall::Connect)
        .collect();
    assert_eq!(
        calls,
        vec![
            MockCall::Begin,
            MockCall::Execute {
                sql: "SELECT id FROM users".into(),
                params: vec![],
            },
            MockCall::Commit,
        ]
    );
    Ok(())
}

#[tokio::test]
async fn failed_transaction_still_skips_prepared_statements() {
    let db = MockDatabase::new();
    db.syntax_error_on("BROKEN");
    let mut session = MockSession::new(db.clone());

    session.begin().await.unwrap();
    assert!(session.execute("BROKEN", &[]).await.is_err());
    assert_eq!(session.transaction_state(), TransactionState::Failed);

    let _ = exec_stmt(&mut session, "q", "SELECT 1", &[]).await;
    assert_eq!(count(&db, |c| matches!(c, MockCall::Prepare { .. })), 0);
    session.rollback().await.unwrap();
    assert_eq!(session.transaction_state(), TransactionState::Idle);
}

#[tokio::test]
async fn syntax_error_during_prepare_is_not_retried() {
    let db = MockDatabase::new();
    db.syntax_error_on("SELEC ");
    let pool = db.pool(single_session());

    let err = pool
        .exec_stmt("broken", "SELEC id FROM users", &[])
        .await
        .unwrap_err();

    assert!(matches!(err, PgSteadyError::StatementSyntaxError { .. }));
    assert_eq!(count(&db, |c| matches!(c, MockCall::Prepare { .. })), 1);
    assert_eq!(
        count(&db, |c| matches!(c, MockCall::ExecutePrepared { .. })),
        1
    );
    assert_eq!(pool.stats().heals, 0);
}

#[tokio::test]
async fn statements_are_per_session() -> Result<(), PgSteadyError> {
    let db = MockDatabase::new();
    let mut a = MockSession::new(db.clone());
    let mut b = MockSession::new(db.clone());

    exec_stmt(&mut a, "q", "SELECT 1", &[]).await?;
    exec_stmt(&mut b, "q", "SELECT 1", &[]).await?;
    exec_stmt(&mut a, "q", "SELECT 1", &[]).await?;

    assert_eq!(count(&db, |c| matches!(c, MockCall::Prepare { .. })), 2);
    assert_eq!(a.prepared_names(), vec!["q".to_string()]);
    Ok(())
}
