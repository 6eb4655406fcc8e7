#![cfg(feature = "mock")]

use std::sync::Arc;
use std::time::Duration;

use pg_steady::prelude::*;
use pg_steady::test_utils::{MockCall, MockDatabase};

fn setup() -> (MockDatabase, Dataset) {
    let db = MockDatabase::new();
    let pool = db.pool(PoolSettings {
        pool_size: 1,
        checkout_timeout: Duration::from_millis(200),
        max_heal_attempts: 2,
        heal_backoff: Duration::ZERO,
    });
    let users = Dataset::new(Arc::new(pool), "users").unwrap();
    (db, users)
}

/// SQL and parameters of every statement prepared so far.
fn prepared(db: &MockDatabase) -> Vec<(String, Vec<RowValues>)> {
    let calls = db.calls();
    calls
        .iter()
        .filter_map(|c| match c {
            MockCall::Prepare { name, sql } => {
                let params = calls.iter().find_map(|other| match other {
                    MockCall::ExecutePrepared { name: n, params } if n == name => Some(params.clone()),
                    _ => None,
                });
                Some((sql.clone(), params.unwrap_or_default()))
            }
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn insert_skips_managed_columns() -> Result<(), PgSteadyError> {
    let (db, users) = setup();

    users
        .insert(vec![
            ("email", RowValues::from("a@example.com")),
            ("id", RowValues::Int(99)),
            ("created_at", RowValues::Null),
        ])
        .await?;

    assert_eq!(
        prepared(&db),
        vec![(
            "INSERT INTO \"users\" (\"email\") VALUES ($1) RETURNING *".to_string(),
            vec![RowValues::from("a@example.com")]
        )]
    );
    Ok(())
}

#[tokio::test]
async fn insert_with_column_types_casts_placeholders() -> Result<(), PgSteadyError> {
    let (db, users) = setup();
    let users = users.with_column_types([("role", "user_role")]);

    users
        .insert(vec![("email", "b@example.com"), ("role", "admin")])
        .await?;

    assert_eq!(
        prepared(&db)[0].0,
        "INSERT INTO \"users\" (\"email\", \"role\") VALUES ($1, $2::user_role) RETURNING *"
    );
    Ok(())
}

#[tokio::test]
async fn update_and_delete_target_one_id() -> Result<(), PgSteadyError> {
    let (db, users) = setup();

    users.update(5, vec![("email", "c@example.com")]).await?;
    users.delete(5).await?;

    let statements = prepared(&db);
    assert_eq!(
        statements[0],
        (
            "UPDATE \"users\" SET \"email\" = $1 WHERE \"users\".\"id\" = $2 RETURNING *".to_string(),
            vec![RowValues::from("c@example.com"), RowValues::Int(5)]
        )
    );
    assert_eq!(
        statements[1].0,
        "DELETE FROM \"users\" WHERE \"users\".\"id\" = $1 RETURNING *"
    );
    Ok(())
}

#[tokio::test]
async fn find_maps_rows() -> Result<(), PgSteadyError> {
    let (db, users) = setup();
    db.respond_rows(
        "SELECT * FROM \"users\" WHERE \"users\".\"id\" = $1 LIMIT 1",
        &["id", "email"],
        vec![vec![RowValues::Int(1), RowValues::from("a@example.com")]],
    );
    let emails = users.with_mapper(|row| row.try_text("email"));

    let found = emails.find(1).await?;

    assert_eq!(found, Some(Some("a@example.com".to_string())));
    Ok(())
}

#[tokio::test]
async fn scope_applies_to_reads() -> Result<(), PgSteadyError> {
    let (db, users) = setup();
    let live = users.with_scope("deleted_at IS NULL")?;
    db.respond_rows(
        "SELECT COUNT(*) FROM \"users\" WHERE deleted_at IS NULL",
        &["count"],
        vec![vec![RowValues::Int(3)]],
    );

    assert_eq!(live.count().await?, 3);
    live.all().await?;
    live.last("id").await?;

    let sql: Vec<String> = prepared(&db).into_iter().map(|(sql, _)| sql).collect();
    assert_eq!(
        sql,
        vec![
            "SELECT COUNT(*) FROM \"users\" WHERE deleted_at IS NULL",
            "SELECT * FROM \"users\" WHERE deleted_at IS NULL",
            "SELECT * FROM \"users\" WHERE deleted_at IS NULL ORDER BY \"users\".\"id\" DESC LIMIT 1",
        ]
    );
    Ok(())
}

#[tokio::test]
async fn page_uses_keyset_cursor() -> Result<(), PgSteadyError> {
    let (db, users) = setup();

    users
        .page(40, 20, "id", Direction::Asc, vec![("active", true)])
        .await?;
    users
        .page(40, 20, "id", Direction::Desc, WhereClause::Empty)
        .await?;

    let statements = prepared(&db);
    assert_eq!(
        statements[0],
        (
            "SELECT * FROM \"users\" WHERE \"users\".\"id\" > $2 AND (\"users\".\"active\" = $1) \
             ORDER BY \"users\".\"id\" ASC LIMIT 20"
                .to_string(),
            vec![RowValues::Bool(true), RowValues::Int(40)]
        )
    );
    assert_eq!(
        statements[1].0,
        "SELECT * FROM \"users\" WHERE \"users\".\"id\" < $1 ORDER BY \"users\".\"id\" DESC LIMIT 20"
    );
    Ok(())
}

#[tokio::test]
async fn invalid_table_is_rejected() {
    let db = MockDatabase::new();
    let pool = db.pool(PoolSettings::default());
    assert!(matches!(
        Dataset::new(Arc::new(pool), "users; DROP TABLE x"),
        Err(PgSteadyError::InvalidIdentifier(_))
    ));
}
