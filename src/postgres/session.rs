use std::collections::HashMap;

use async_trait::async_trait;
use futures_util::{TryStreamExt, pin_mut};
use tokio_postgres::{Client, Statement};

use super::params::as_refs;
use super::query::build_result_set;
use crate::error::PgSteadyError;
use crate::results::ResultSet;
use crate::session::{DbSession, TransactionState};
use crate::types::RowValues;

/// One `tokio-postgres` client plus the prepared statements registered on it.
pub struct PgSession {
    client: Client,
    statements: HashMap<String, Statement>,
    state: TransactionState,
}

impl PgSession {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            client,
            statements: HashMap::new(),
            state: TransactionState::Idle,
        }
    }

    /// Number of named statements prepared on this session.
    #[must_use]
    pub fn prepared_count(&self) -> usize {
        self.statements.len()
    }

    async fn run(
        &self,
        statement: &Statement,
        params: &[RowValues],
    ) -> Result<ResultSet, PgSteadyError> {
        let stream = self
            .client
            .query_raw(statement, as_refs(params))
            .await?;
        pin_mut!(stream);

        let mut rows = Vec::new();
        while let Some(row) = stream.try_next().await? {
            rows.push(row);
        }
        let affected = stream.rows_affected().unwrap_or(0);
        build_result_set(statement.columns(), &rows, affected)
    }

    // Any failure inside an open transaction poisons it until ROLLBACK.
    fn track<T>(&mut self, result: Result<T, PgSteadyError>) -> Result<T, PgSteadyError> {
        if result.is_err() && self.state == TransactionState::InTransaction {
            self.state = TransactionState::Failed;
        }
        result
    }
}

#[async_trait]
impl DbSession for PgSession {
    async fn execute(
        &mut self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<ResultSet, PgSteadyError> {
        let result = match self.client.prepare(sql).await {
            Ok(statement) => self.run(&statement, params).await,
            Err(err) => Err(err.into()),
        };
        self.track(result)
    }

    async fn execute_prepared(
        &mut self,
        name: &str,
        params: &[RowValues],
    ) -> Result<ResultSet, PgSteadyError> {
        let Some(statement) = self.statements.get(name).cloned() else {
            return Err(PgSteadyError::UndefinedPreparedStatement(name.to_string()));
        };
        let result = self.run(&statement, params).await;
        self.track(result)
    }

    async fn prepare(&mut self, name: &str, sql: &str) -> Result<(), PgSteadyError> {
        let result = self.client.prepare(sql).await.map_err(PgSteadyError::from);
        let statement = self.track(result)?;
        self.statements.insert(name.to_string(), statement);
        Ok(())
    }

    async fn batch_execute(&mut self, sql: &str) -> Result<(), PgSteadyError> {
        let result = self
            .client
            .batch_execute(sql)
            .await
            .map_err(PgSteadyError::from);
        self.track(result)
    }

    async fn begin(&mut self) -> Result<(), PgSteadyError> {
        self.client.simple_query("BEGIN").await?;
        self.state = TransactionState::InTransaction;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), PgSteadyError> {
        let result = self.client.simple_query("COMMIT").await;
        self.state = TransactionState::Idle;
        result?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), PgSteadyError> {
        let result = self.client.simple_query("ROLLBACK").await;
        self.state = TransactionState::Idle;
        result?;
        Ok(())
    }

    fn transaction_state(&self) -> TransactionState {
        self.state
    }

    fn is_broken(&self) -> bool {
        self.client.is_closed()
    }
}
