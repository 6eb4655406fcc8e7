//! Versioned schema migrations with a cross-process lock.
//!
//! Version 0 is built in and creates the `schema_migrations` tracking table and the
//! single-row `schema_lock` table. Every applied version records its up and down SQL
//! so a database can be rolled back by a build that no longer knows those versions.

mod lock;
mod registry;
pub(crate) mod sql;

use std::fmt;
use std::future::Future;

use bb8::ManageConnection;
use tracing::{error, info, warn};

pub use lock::{LockSettings, SchemaLock};
pub use registry::{MigrationBuilder, MigrationPlan, MigrationRegistry, MigrationStep, PlanDirection};

use crate::error::PgSteadyError;
use crate::pool::ConnectionPool;
use crate::session::DbSession;
use crate::types::RowValues;
use sql::{CURRENT_VERSION, DELETE_VERSION, DESTROY, DRIFTED_VERSIONS, INSERT_VERSION, MIGRATIONS_TABLE};

/// Version recorded in the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaVersion {
    /// The tracking table does not exist yet.
    Uninitialized,
    At(i32),
}

impl SchemaVersion {
    /// `-1` when uninitialized, so plans from here include the bootstrap step.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        match self {
            SchemaVersion::Uninitialized => -1,
            SchemaVersion::At(v) => v,
        }
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaVersion::Uninitialized => write!(f, "uninitialized"),
            SchemaVersion::At(v) => write!(f, "{v}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// The database was already at the target.
    NoOp { version: i32 },
    Applied {
        from: i32,
        to: i32,
        /// Versions in the order they ran.
        versions: Vec<i32>,
    },
}

/// Moves a database between registered schema versions.
pub struct SchemaMigrator<M: ManageConnection> {
    pool: ConnectionPool<M>,
    registry: MigrationRegistry,
    lock: SchemaLock,
}

impl<M> SchemaMigrator<M>
where
    M: ManageConnection<Error = PgSteadyError> + Clone,
    M::Connection: DbSession,
{
    #[must_use]
    pub fn new(pool: ConnectionPool<M>, registry: MigrationRegistry) -> Self {
        Self {
            pool,
            registry,
            lock: SchemaLock::default(),
        }
    }

    #[must_use]
    pub fn with_lock_settings(mut self, settings: LockSettings) -> Self {
        self.lock = SchemaLock::new(settings);
        self
    }

    #[must_use]
    pub fn registry(&self) -> &MigrationRegistry {
        &self.registry
    }

    #[must_use]
    pub fn pool(&self) -> &ConnectionPool<M> {
        &self.pool
    }

    /// Highest recorded version; `At(0)` for an empty tracking table.
    ///
    /// # Errors
    /// Propagates execution errors other than a missing tracking table.
    pub async fn current_version(&self) -> Result<SchemaVersion, PgSteadyError> {
        match self.pool.execute(CURRENT_VERSION, &[]).await {
            Ok(rows) => {
                let version = rows
                    .first()
                    .and_then(|row| row.get("version"))
                    .and_then(RowValues::as_int)
                    .copied()
                    .unwrap_or(0);
                Ok(SchemaVersion::At(i32::try_from(version).map_err(|_| {
                    PgSteadyError::ExecutionError(format!("recorded version {version} out of range"))
                })?))
            }
            Err(err) if err.is_undefined_relation(MIGRATIONS_TABLE) => Ok(SchemaVersion::Uninitialized),
            Err(err) => Err(err),
        }
    }

    /// Bring the schema to `target`, or to the latest registered version.
    ///
    /// Runs under the schema lock, and every step of the plan runs in one transaction:
    /// either all of them are applied or none are. Forward steps run their up SQL and
    /// record the version; rollback steps remove the record and run their down SQL, newest
    /// first. Version 0 is never rolled back.
    ///
    /// # Errors
    /// `InvalidVersion` or `UnknownVersion` for a bad explicit target,
    /// `IrreversibleVersion` when a rollback step has no down SQL, and any failure from
    /// the migration SQL itself.
    pub async fn migrate(&self, target: Option<i32>) -> Result<MigrationOutcome, PgSteadyError> {
        let target = match target {
            Some(t) if t < 0 => return Err(PgSteadyError::InvalidVersion(t)),
            Some(t) if !self.registry.contains(t) => return Err(PgSteadyError::UnknownVersion(t)),
            Some(t) => t,
            None => self.registry.latest(),
        };

        let current = self.current_version().await?.as_i32();
        if current == target {
            info!(version = target, "No migrations detected");
            return Ok(MigrationOutcome::NoOp { version: target });
        }

        let mut working = self.registry.clone();
        working.merge_drift(self.drifted_steps().await?);

        self.lock.acquire(&self.pool).await?;
        let outcome = self.apply(&working, target).await;
        match (outcome, self.lock.release(&self.pool).await) {
            (Ok(outcome), Ok(())) => Ok(outcome),
            (Ok(_), Err(release_err)) => Err(release_err),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(release_err)) => {
                warn!(error = %release_err, "failed to release schema lock after failed migration");
                Err(err)
            }
        }
    }

    /// Undo the most recent version.
    ///
    /// # Errors
    /// See [`SchemaMigrator::migrate`].
    pub async fn rollback(&self) -> Result<MigrationOutcome, PgSteadyError> {
        match self.current_version().await? {
            SchemaVersion::At(v) if v > 0 => self.rollback_to(v - 1).await,
            other => {
                let version = other.as_i32();
                info!(version, "No migrations detected");
                Ok(MigrationOutcome::NoOp { version })
            }
        }
    }

    // Rollback target may only be known through drift, so it skips the registry check.
    async fn rollback_to(&self, target: i32) -> Result<MigrationOutcome, PgSteadyError> {
        let mut working = self.registry.clone();
        working.merge_drift(self.drifted_steps().await?);
        self.lock.acquire(&self.pool).await?;
        let outcome = self.apply(&working, target).await;
        let released = self.lock.release(&self.pool).await;
        let outcome = outcome?;
        released?;
        Ok(outcome)
    }

    /// Drop every table and enum type in the current schema.
    ///
    /// # Errors
    /// Propagates execution errors.
    pub async fn destroy(&self) -> Result<(), PgSteadyError> {
        warn!("destroying all tables and enum types in the current schema");
        self.pool.batch_execute(DESTROY).await
    }

    /// Run `block` while holding the schema lock; the lock is released afterwards
    /// whether `block` succeeded or not.
    ///
    /// # Errors
    /// Returns the error from `block`, or from acquiring or releasing the lock.
    pub async fn schema_lock<F, Fut, T>(&self, block: F) -> Result<T, PgSteadyError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, PgSteadyError>>,
    {
        self.lock.acquire(&self.pool).await?;
        let result = block().await;
        let released = self.lock.release(&self.pool).await;
        let value = result?;
        released?;
        Ok(value)
    }

    /// Versions recorded beyond what this build registers.
    async fn drifted_steps(&self) -> Result<Vec<MigrationStep>, PgSteadyError> {
        let latest = RowValues::Int(i64::from(self.registry.latest()));
        let rows = match self.pool.execute(DRIFTED_VERSIONS, &[latest]).await {
            Ok(rows) => rows,
            Err(err) if err.is_undefined_relation(MIGRATIONS_TABLE) => return Ok(Vec::new()),
            Err(err) => return Err(err),
        };
        let mut steps = Vec::with_capacity(rows.len());
        for row in rows.into_rows() {
            let version = row
                .get("version")
                .and_then(RowValues::as_int)
                .copied()
                .ok_or_else(|| PgSteadyError::ExecutionError("drift row without version".into()))?;
            let version = i32::try_from(version)
                .map_err(|_| PgSteadyError::ExecutionError(format!("recorded version {version} out of range")))?;
            steps.push(MigrationStep {
                version,
                up: row.try_text("up")?.unwrap_or_default(),
                down: row.try_text("down")?,
            });
        }
        if let Some(last) = steps.last() {
            warn!(
                registered = self.registry.latest(),
                recorded = last.version,
                "database has versions this build does not register; using their recorded SQL"
            );
        }
        Ok(steps)
    }

    async fn apply(&self, registry: &MigrationRegistry, target: i32) -> Result<MigrationOutcome, PgSteadyError> {
        let current = self.current_version().await?.as_i32();
        if current == target {
            info!(version = target, "No migrations detected");
            return Ok(MigrationOutcome::NoOp { version: target });
        }
        let plan = registry.plan(current, target)?;
        let versions = plan.versions();
        info!(from = current, to = target, ?versions, "applying migrations");

        let applied = self
            .pool
            .transaction(|conn| {
                let plan = plan.clone();
                Box::pin(async move {
                    for step in &plan.steps {
                        apply_step(conn, plan.direction, step).await?;
                    }
                    Ok(())
                })
            })
            .await;
        if let Err(err) = applied {
            error!(error = %err, from = current, to = target, "migration failed - rolled back");
            return Err(err);
        }
        Ok(MigrationOutcome::Applied {
            from: current,
            to: target,
            versions,
        })
    }
}

async fn apply_step<C: DbSession + ?Sized>(
    conn: &mut C,
    direction: PlanDirection,
    step: &MigrationStep,
) -> Result<(), PgSteadyError> {
    let version = RowValues::Int(i64::from(step.version));
    match direction {
        PlanDirection::Up => {
            conn.batch_execute(&step.up).await?;
            let down = step.down.clone().map_or(RowValues::Null, RowValues::Text);
            conn.execute(INSERT_VERSION, &[version, RowValues::Text(step.up.clone()), down])
                .await?;
        }
        PlanDirection::Down => {
            let down = step
                .down
                .as_deref()
                .ok_or(PgSteadyError::IrreversibleVersion(step.version))?;
            conn.execute(DELETE_VERSION, &[version]).await?;
            conn.batch_execute(down).await?;
        }
    }
    Ok(())
}
