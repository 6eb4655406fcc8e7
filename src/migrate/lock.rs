use std::time::Duration;

use bb8::ManageConnection;
use tracing::debug;

use super::sql::{ACQUIRE_LOCK, LOCK_TABLE, RELEASE_LOCK};
use crate::error::PgSteadyError;
use crate::pool::ConnectionPool;
use crate::session::DbSession;
use crate::types::RowValues;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockSettings {
    /// A lock held longer than this is considered abandoned and may be taken over.
    pub stale_after: Duration,
    pub poll_interval: Duration,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            stale_after: Duration::from_secs(15),
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// Cross-process lock kept in the single-row `schema_lock` table.
///
/// A missing table counts as unlocked so the bootstrap migration can run.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaLock {
    settings: LockSettings,
}

impl SchemaLock {
    #[must_use]
    pub fn new(settings: LockSettings) -> Self {
        Self { settings }
    }

    #[must_use]
    pub fn settings(&self) -> LockSettings {
        self.settings
    }

    /// Poll until this process holds the lock.
    ///
    /// # Errors
    /// Propagates execution errors other than a missing lock table.
    pub async fn acquire<M>(&self, pool: &ConnectionPool<M>) -> Result<(), PgSteadyError>
    where
        M: ManageConnection<Error = PgSteadyError> + Clone,
        M::Connection: DbSession,
    {
        let stale = RowValues::Float(self.settings.stale_after.as_secs_f64());
        loop {
            match pool.execute(ACQUIRE_LOCK, std::slice::from_ref(&stale)).await {
                Ok(claimed) if claimed.len() == 1 => {
                    debug!("schema lock acquired");
                    return Ok(());
                }
                Ok(_) => {
                    debug!(
                        poll_ms = self.settings.poll_interval.as_millis(),
                        "schema lock busy - waiting"
                    );
                    tokio::time::sleep(self.settings.poll_interval).await;
                }
                Err(err) if err.is_undefined_relation(LOCK_TABLE) => return Ok(()),
                Err(err) => return Err(err),
            }
        }
    }

    /// # Errors
    /// Propagates execution errors other than a missing lock table.
    pub async fn release<M>(&self, pool: &ConnectionPool<M>) -> Result<(), PgSteadyError>
    where
        M: ManageConnection<Error = PgSteadyError> + Clone,
        M::Connection: DbSession,
    {
        match pool.execute(RELEASE_LOCK, &[]).await {
            Ok(_) => {
                debug!("schema lock released");
                Ok(())
            }
            Err(err) if err.is_undefined_relation(LOCK_TABLE) => Ok(()),
            Err(err) => Err(err),
        }
    }
}
