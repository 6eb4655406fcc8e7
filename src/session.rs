use async_trait::async_trait;

use crate::error::PgSteadyError;
use crate::results::ResultSet;
use crate::types::RowValues;

/// Transaction status of one session, as far as this crate has driven it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionState {
    #[default]
    Idle,
    InTransaction,
    /// A statement failed inside the open transaction; only `ROLLBACK` is useful now.
    Failed,
}

impl TransactionState {
    #[must_use]
    pub fn is_in_transaction(self) -> bool {
        !matches!(self, TransactionState::Idle)
    }
}

/// The operations this crate needs from one database session.
///
/// Everything the pool, executor and migrator do goes through this trait; nothing else
/// of the underlying client is reachable.
#[async_trait]
pub trait DbSession: Send {
    /// Run `sql` with positional parameters, without a named statement.
    async fn execute(&mut self, sql: &str, params: &[RowValues])
    -> Result<ResultSet, PgSteadyError>;

    /// Run a statement previously registered with [`DbSession::prepare`].
    ///
    /// # Errors
    /// Returns `PgSteadyError::UndefinedPreparedStatement` when `name` is unknown to
    /// this session.
    async fn execute_prepared(
        &mut self,
        name: &str,
        params: &[RowValues],
    ) -> Result<ResultSet, PgSteadyError>;

    async fn prepare(&mut self, name: &str, sql: &str) -> Result<(), PgSteadyError>;

    /// Run one or more parameterless statements separated by `;`.
    async fn batch_execute(&mut self, sql: &str) -> Result<(), PgSteadyError>;

    async fn begin(&mut self) -> Result<(), PgSteadyError>;

    async fn commit(&mut self) -> Result<(), PgSteadyError>;

    async fn rollback(&mut self) -> Result<(), PgSteadyError>;

    fn transaction_state(&self) -> TransactionState;

    /// Whether the transport under this session is gone.
    fn is_broken(&self) -> bool;
}
