//! Self-healing connection pool over `bb8`.

mod config;
mod healing;

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use bb8::{ManageConnection, Pool, PooledConnection, RunError};
use futures_util::future::BoxFuture;
use tracing::{info, warn};

pub use config::{PoolConfig, PoolSettings};
use healing::{ConnectErrors, HealBudget};

use crate::error::PgSteadyError;
use crate::executor::{self, StatementRunner};
use crate::postgres::PgManager;
use crate::results::ResultSet;
use crate::session::DbSession;
use crate::types::RowValues;

/// A checked-out session. Dropping it returns the connection to the pool it came from.
pub type PooledSession<M> = PooledConnection<'static, M>;

/// Diagnostic counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    /// Number of times the pool was rebuilt after a connection loss.
    pub heals: u64,
    /// Checkouts that timed out and were retried.
    pub checkout_retries: u64,
    /// Increments on every rebuild.
    pub generation: u64,
}

struct PoolInner<M: ManageConnection> {
    manager: M,
    settings: PoolSettings,
    pool: RwLock<Pool<M>>,
    connect_errors: ConnectErrors,
    generation: AtomicU64,
    heals: AtomicU64,
    checkout_retries: AtomicU64,
}

/// Pool of database sessions that rebuilds itself when connections are lost.
///
/// Cloning is cheap; clones share the same slots.
pub struct ConnectionPool<M: ManageConnection> {
    inner: Arc<PoolInner<M>>,
}

impl<M: ManageConnection> Clone for ConnectionPool<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl ConnectionPool<PgManager> {
    /// Validate `config` and build a Postgres pool. Connections are opened lazily.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// Returns `PgSteadyError::ConfigError` if the options are invalid.
    #[allow(clippy::unused_async)]
    pub async fn configure(config: PoolConfig) -> Result<Self, PgSteadyError> {
        let (pg_config, settings) = config.validate()?;
        info!(
            pool_size = settings.pool_size,
            checkout_timeout_ms = config.checkout_timeout_ms,
            "configuring postgres pool"
        );
        Ok(Self::with_manager(PgManager::new(pg_config), settings))
    }
}

impl<M> ConnectionPool<M>
where
    M: ManageConnection<Error = PgSteadyError> + Clone,
    M::Connection: DbSession,
{
    /// Build a pool around any session manager.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn with_manager(manager: M, settings: PoolSettings) -> Self {
        let connect_errors = ConnectErrors::default();
        let pool = build_pool(manager.clone(), &settings, &connect_errors);
        Self {
            inner: Arc::new(PoolInner {
                manager,
                settings,
                pool: RwLock::new(pool),
                connect_errors,
                generation: AtomicU64::new(0),
                heals: AtomicU64::new(0),
                checkout_retries: AtomicU64::new(0),
            }),
        }
    }

    #[must_use]
    pub fn settings(&self) -> &PoolSettings {
        &self.inner.settings
    }

    #[must_use]
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            heals: self.inner.heals.load(Ordering::SeqCst),
            checkout_retries: self.inner.checkout_retries.load(Ordering::SeqCst),
            generation: self.inner.generation.load(Ordering::SeqCst),
        }
    }

    /// Check out a session, run `block` with it, and return its result.
    ///
    /// A checkout timeout is retried without limit. A lost connection, whether `block`
    /// hit it or the server refused a new one during checkout, rebuilds every pool member, waits the heal backoff and reruns
    /// `block` on a fresh session, up to the configured number of attempts.
    ///
    /// # Errors
    /// Returns whatever `block` fails with, or the last connection loss once the heal
    /// budget is spent.
    pub async fn with<F, Fut, T>(&self, mut block: F) -> Result<T, PgSteadyError>
    where
        F: FnMut(PooledSession<M>) -> Fut,
        Fut: Future<Output = Result<T, PgSteadyError>>,
    {
        let mut budget = self.budget();
        loop {
            let (pool, generation) = self.snapshot();
            let outcome = match self.checkout(&pool).await {
                Ok(conn) => block(conn).await,
                Err(err) => Err(err),
            };
            match outcome {
                Err(err) if err.is_connection_lost() => {
                    budget.record(err)?;
                    self.heal(generation);
                    tokio::time::sleep(budget.backoff()).await;
                }
                other => return other,
            }
        }
    }

    /// Run `block` inside `BEGIN`/`COMMIT` on one session; an error rolls back.
    ///
    /// Healing applies as for [`ConnectionPool::with`]: a transaction that lost its
    /// connection is rerun from the start on a rebuilt pool.
    ///
    /// ```rust,no_run
    /// # use pg_steady::prelude::*;
    /// # async fn demo(pool: ConnectionPool<PgManager>) -> Result<(), PgSteadyError> {
    /// let moved = pool
    ///     .transaction(|conn| {
    ///         Box::pin(async move {
    ///             conn.execute("UPDATE accounts SET balance = balance - 5 WHERE id = $1", &[RowValues::Int(1)]).await?;
    ///             conn.execute("UPDATE accounts SET balance = balance + 5 WHERE id = $1", &[RowValues::Int(2)]).await?;
    ///             Ok(5)
    ///         })
    ///     })
    ///     .await?;
    /// # let _ = moved;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    /// Returns the error from `block` (after rolling back) or from `BEGIN`/`COMMIT`.
    pub async fn transaction<F, T>(&self, mut block: F) -> Result<T, PgSteadyError>
    where
        F: for<'c> FnMut(&'c mut M::Connection) -> BoxFuture<'c, Result<T, PgSteadyError>>,
    {
        let mut budget = self.budget();
        loop {
            let (pool, generation) = self.snapshot();
            let outcome = match self.checkout(&pool).await {
                Ok(mut conn) => run_in_transaction(&mut *conn, &mut block).await,
                Err(err) => Err(err),
            };
            match outcome {
                Err(err) if err.is_connection_lost() => {
                    budget.record(err)?;
                    self.heal(generation);
                    tokio::time::sleep(budget.backoff()).await;
                }
                other => return other,
            }
        }
    }

    /// Run a named statement through the prepared-statement executor.
    ///
    /// # Errors
    /// See [`executor::exec_stmt`] and [`ConnectionPool::with`].
    pub async fn exec_stmt(
        &self,
        name: &str,
        sql: &str,
        params: &[RowValues],
    ) -> Result<ResultSet, PgSteadyError> {
        self.with(|mut conn| async move { executor::exec_stmt(&mut *conn, name, sql, params).await })
            .await
    }

    /// Run `sql` unprepared.
    ///
    /// # Errors
    /// See [`ConnectionPool::with`].
    pub async fn execute(&self, sql: &str, params: &[RowValues]) -> Result<ResultSet, PgSteadyError> {
        self.with(|mut conn| async move { conn.execute(sql, params).await })
            .await
    }

    /// Run parameterless statements separated by `;`.
    ///
    /// # Errors
    /// See [`ConnectionPool::with`].
    pub async fn batch_execute(&self, sql: &str) -> Result<(), PgSteadyError> {
        self.with(|mut conn| async move { conn.batch_execute(sql).await })
            .await
    }

    fn budget(&self) -> HealBudget {
        HealBudget::new(
            self.inner.settings.max_heal_attempts,
            self.inner.settings.heal_backoff,
        )
    }

    fn snapshot(&self) -> (Pool<M>, u64) {
        let guard = self
            .inner
            .pool
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        (guard.clone(), self.inner.generation.load(Ordering::SeqCst))
    }

    async fn checkout(&self, pool: &Pool<M>) -> Result<PooledSession<M>, PgSteadyError> {
        loop {
            match pool.get_owned().await {
                Ok(conn) => {
                    self.inner.connect_errors.clear();
                    return Ok(conn);
                }
                Err(RunError::TimedOut) => {
                    // a timeout that follows a failed connect means the server is unreachable
                    if let Some(err) = self.inner.connect_errors.take() {
                        return Err(err);
                    }
                    self.inner.checkout_retries.fetch_add(1, Ordering::SeqCst);
                    let err = PgSteadyError::PoolCheckoutTimeout(self.inner.settings.checkout_timeout);
                    warn!(error = %err, "Timeout in checking out DB connection from pool - retrying");
                }
                Err(RunError::User(err)) => return Err(err),
            }
        }
    }

    /// Replace every pool member, unless another caller already did since `seen`.
    fn heal(&self, seen: u64) {
        let mut guard = self
            .inner
            .pool
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if self.inner.generation.load(Ordering::SeqCst) != seen {
            return;
        }
        *guard = build_pool(
            self.inner.manager.clone(),
            &self.inner.settings,
            &self.inner.connect_errors,
        );
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.inner.heals.fetch_add(1, Ordering::SeqCst);
    }
}

fn build_pool<M>(manager: M, settings: &PoolSettings, connect_errors: &ConnectErrors) -> Pool<M>
where
    M: ManageConnection<Error = PgSteadyError>,
{
    Pool::builder()
        .max_size(settings.pool_size)
        .connection_timeout(settings.checkout_timeout)
        .retry_connection(false)
        .error_sink(Box::new(connect_errors.clone()))
        .build_unchecked(manager)
}

async fn run_in_transaction<C, F, T>(conn: &mut C, block: &mut F) -> Result<T, PgSteadyError>
where
    C: DbSession,
    F: for<'c> FnMut(&'c mut C) -> BoxFuture<'c, Result<T, PgSteadyError>>,
{
    conn.begin().await?;
    match block(conn).await {
        Ok(value) => {
            conn.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = conn.rollback().await {
                warn!(error = %rollback_err, "rollback after failed transaction also failed");
            }
            Err(err)
        }
    }
}

#[async_trait]
impl<M> StatementRunner for ConnectionPool<M>
where
    M: ManageConnection<Error = PgSteadyError> + Clone,
    M::Connection: DbSession,
{
    async fn exec_stmt(
        &self,
        name: &str,
        sql: &str,
        params: &[RowValues],
    ) -> Result<ResultSet, PgSteadyError> {
        ConnectionPool::exec_stmt(self, name, sql, params).await
    }

    async fn execute(&self, sql: &str, params: &[RowValues]) -> Result<ResultSet, PgSteadyError> {
        ConnectionPool::execute(self, sql, params).await
    }
}
