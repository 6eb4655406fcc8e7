use async_trait::async_trait;
use tracing::{debug, error};

use crate::error::PgSteadyError;
use crate::results::ResultSet;
use crate::session::DbSession;
use crate::types::RowValues;

/// Run a named statement on `session`, creating the prepared statement on first use.
///
/// Inside a transaction (open or failed) prepared statements are skipped and `sql` is
/// executed directly. Outside one, a missing statement is prepared and the call retried
/// once; a syntax error from `prepare` is logged and returned as is.
///
/// # Errors
/// Propagates any failure other than the first "statement does not exist".
pub async fn exec_stmt<S>(
    session: &mut S,
    name: &str,
    sql: &str,
    params: &[RowValues],
) -> Result<ResultSet, PgSteadyError>
where
    S: DbSession + ?Sized,
{
    if session.transaction_state().is_in_transaction() {
        debug!(
            statement = name,
            "Unable to use statements within a transaction - falling back to plain execution"
        );
        return session.execute(sql, params).await;
    }

    match session.execute_prepared(name, params).await {
        Err(PgSteadyError::UndefinedPreparedStatement(_)) => {
            debug!(statement = name, "Creating missing prepared statement");
            if let Err(err) = session.prepare(name, sql).await {
                if matches!(err, PgSteadyError::StatementSyntaxError { .. }) {
                    error!(statement = name, sql, error = %err, "failed to prepare statement");
                }
                return Err(err);
            }
            session.execute_prepared(name, params).await
        }
        other => other,
    }
}

/// Something that can run named and unnamed statements, usually a [`crate::pool::ConnectionPool`].
///
/// `Query` and `Dataset` execute through this seam so they can be driven by any backend.
#[async_trait]
pub trait StatementRunner: Send + Sync {
    async fn exec_stmt(
        &self,
        name: &str,
        sql: &str,
        params: &[RowValues],
    ) -> Result<ResultSet, PgSteadyError>;

    async fn execute(&self, sql: &str, params: &[RowValues]) -> Result<ResultSet, PgSteadyError>;
}
