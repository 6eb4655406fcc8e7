//! Scripted in-memory backend.
//!
//! [`MockDatabase`] is shared by every session a [`MockManager`] hands out. It keeps a
//! log of every call, understands the migration and lock statements this crate issues,
//! tracks tables created and dropped by batches, and can be told to lose connections or
//! reject SQL on demand.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bb8::ManageConnection;
use chrono::Utc;
use lazy_static::lazy_static;
use regex::Regex;

use crate::error::PgSteadyError;
use crate::migrate::sql::{
    ACQUIRE_LOCK, CURRENT_VERSION, DELETE_VERSION, DESTROY, DRIFTED_VERSIONS, INSERT_VERSION,
    LOCK_TABLE, MIGRATIONS_TABLE, RELEASE_LOCK,
};
use crate::pool::{ConnectionPool, PoolSettings};
use crate::results::ResultSet;
use crate::session::{DbSession, TransactionState};
use crate::types::RowValues;

lazy_static! {
    static ref CREATE_TABLE: Regex =
        Regex::new(r"(?i)^CREATE\s+TABLE\s+(?:IF\s+NOT\s+EXISTS\s+)?(\w+)").unwrap();
    static ref DROP_TABLE: Regex =
        Regex::new(r"(?i)^DROP\s+TABLE\s+(?:IF\s+EXISTS\s+)?(\w+)").unwrap();
    static ref INSERT_LOCK_ROW: Regex = Regex::new(r"(?i)^INSERT\s+INTO\s+schema_lock\b").unwrap();
}

/// One call observed by a mock session.
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    Connect,
    Execute { sql: String, params: Vec<RowValues> },
    ExecutePrepared { name: String, params: Vec<RowValues> },
    Prepare { name: String, sql: String },
    Batch(String),
    Begin,
    Commit,
    Rollback,
}

/// Tables and migration rows. Snapshotted at `BEGIN`, restored at `ROLLBACK`.
#[derive(Debug, Clone, Default)]
struct MockSchema {
    tables: BTreeSet<String>,
    versions: BTreeMap<i32, (String, Option<String>)>,
    // Outer `None`: no lock row. Inner: when it was taken.
    lock: Option<Option<Instant>>,
}

#[derive(Default)]
struct MockState {
    schema: MockSchema,
    calls: Vec<MockCall>,
    connects: u64,
    lost_statements: u32,
    refused_connects: u32,
    syntax_errors: Vec<String>,
    failing_batches: Vec<String>,
    responses: HashMap<String, ResultSet>,
}

/// Handle to the shared mock state. Clones observe the same database.
#[derive(Clone, Default)]
pub struct MockDatabase {
    state: Arc<Mutex<MockState>>,
}

impl MockDatabase {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A pool over this database.
    #[must_use]
    pub fn pool(&self, settings: PoolSettings) -> ConnectionPool<MockManager> {
        ConnectionPool::with_manager(MockManager::new(self.clone()), settings)
    }

    /// The next `count` statements fail with `ConnectionLost` and break their session.
    pub fn lose_connection_for(&self, count: u32) {
        self.state().lost_statements = count;
    }

    /// The next `count` connection attempts are refused with `ConnectionLost`.
    pub fn refuse_connections_for(&self, count: u32) {
        self.state().refused_connects = count;
    }

    /// Statements containing `fragment` fail with a syntax error.
    pub fn syntax_error_on(&self, fragment: impl Into<String>) {
        self.state().syntax_errors.push(fragment.into());
    }

    /// Batch statements containing `fragment` fail with a syntax error.
    pub fn fail_batches_containing(&self, fragment: impl Into<String>) {
        self.state().failing_batches.push(fragment.into());
    }

    /// Return `result` whenever exactly `sql` is executed.
    pub fn respond(&self, sql: impl Into<String>, result: ResultSet) {
        self.state().responses.insert(sql.into(), result);
    }

    pub fn respond_rows(&self, sql: impl Into<String>, columns: &[&str], rows: Vec<Vec<RowValues>>) {
        let columns = columns.iter().map(ToString::to_string).collect();
        self.respond(sql, ResultSet::from_rows(columns, rows));
    }

    #[must_use]
    pub fn calls(&self) -> Vec<MockCall> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// SQL of every batch run so far, in order.
    #[must_use]
    pub fn batches(&self) -> Vec<String> {
        self.state()
            .calls
            .iter()
            .filter_map(|c| match c {
                MockCall::Batch(sql) => Some(sql.clone()),
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub fn connects(&self) -> u64 {
        self.state().connects
    }

    #[must_use]
    pub fn tables(&self) -> Vec<String> {
        self.state().schema.tables.iter().cloned().collect()
    }

    #[must_use]
    pub fn has_table(&self, name: &str) -> bool {
        self.state().schema.tables.contains(name)
    }

    /// Versions recorded in `schema_migrations`.
    #[must_use]
    pub fn versions(&self) -> Vec<i32> {
        self.state().schema.versions.keys().copied().collect()
    }

    /// Record a version as if an older or newer build had applied it.
    pub fn record_version(&self, version: i32, up: &str, down: Option<&str>) {
        self.state()
            .schema
            .versions
            .insert(version, (up.to_string(), down.map(ToString::to_string)));
    }

    /// Whether the schema lock row is currently held.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        matches!(self.state().schema.lock, Some(Some(_)))
    }

    /// Mark the lock as taken by another process.
    pub fn hold_lock(&self) {
        self.state().schema.lock = Some(Some(Instant::now()));
    }

    fn record(&self, call: MockCall) {
        self.state().calls.push(call);
    }

    // Consumes one scripted connection loss, if any remain.
    fn take_lost(&self) -> bool {
        let mut state = self.state();
        if state.lost_statements > 0 {
            state.lost_statements -= 1;
            true
        } else {
            false
        }
    }

    fn take_refused(&self) -> bool {
        let mut state = self.state();
        if state.refused_connects > 0 {
            state.refused_connects -= 1;
            true
        } else {
            false
        }
    }

    fn check_syntax(&self, sql: &str) -> Result<(), PgSteadyError> {
        let state = self.state();
        match state.syntax_errors.iter().find(|f| sql.contains(f.as_str())) {
            Some(fragment) => Err(PgSteadyError::syntax_error(format!(
                "syntax error at or near \"{fragment}\""
            ))),
            None => Ok(()),
        }
    }

    fn run_sql(&self, sql: &str, params: &[RowValues]) -> Result<ResultSet, PgSteadyError> {
        self.check_syntax(sql)?;
        let mut guard = self.state();
        let MockState {
            schema, responses, ..
        } = &mut *guard;
        let needs = |schema: &MockSchema, table: &str| {
            if schema.tables.contains(table) {
                Ok(())
            } else {
                Err(PgSteadyError::undefined_table(table))
            }
        };
        match sql {
            CURRENT_VERSION => {
                needs(schema, MIGRATIONS_TABLE)?;
                let rows = schema
                    .versions
                    .keys()
                    .next_back()
                    .map(|v| vec![vec![RowValues::Int(i64::from(*v))]])
                    .unwrap_or_default();
                Ok(ResultSet::from_rows(vec!["version".into()], rows))
            }
            DRIFTED_VERSIONS => {
                needs(schema, MIGRATIONS_TABLE)?;
                let above = int_param(params, 0)?;
                let rows = schema
                    .versions
                    .iter()
                    .filter(|(v, _)| i64::from(**v) > above)
                    .map(|(v, (up, down))| {
                        vec![
                            RowValues::Int(i64::from(*v)),
                            RowValues::Text(up.clone()),
                            down.clone().map_or(RowValues::Null, RowValues::Text),
                        ]
                    })
                    .collect();
                Ok(ResultSet::from_rows(
                    vec!["version".into(), "up".into(), "down".into()],
                    rows,
                ))
            }
            INSERT_VERSION => {
                needs(schema, MIGRATIONS_TABLE)?;
                let version = i32::try_from(int_param(params, 0)?)
                    .map_err(|e| PgSteadyError::ParameterError(e.to_string()))?;
                let up = params.get(1).and_then(RowValues::as_text).unwrap_or_default();
                let down = params.get(2).and_then(RowValues::as_text).map(ToString::to_string);
                schema.versions.insert(version, (up.to_string(), down));
                Ok(ResultSet::affected(1))
            }
            DELETE_VERSION => {
                needs(schema, MIGRATIONS_TABLE)?;
                let version = int_param(params, 0)?;
                let removed = i32::try_from(version)
                    .ok()
                    .and_then(|v| schema.versions.remove(&v))
                    .is_some();
                Ok(ResultSet::affected(usize::from(removed)))
            }
            ACQUIRE_LOCK => {
                needs(schema, LOCK_TABLE)?;
                let stale = params.first().and_then(RowValues::as_float).unwrap_or(0.0);
                let stale = Duration::from_secs_f64(stale.max(0.0));
                let free = match schema.lock {
                    Some(None) => true,
                    Some(Some(taken)) => taken.elapsed() >= stale,
                    None => false,
                };
                if !free {
                    return Ok(ResultSet::from_rows(vec!["locked_at".into()], Vec::new()));
                }
                schema.lock = Some(Some(Instant::now()));
                Ok(ResultSet::from_rows(
                    vec!["locked_at".into()],
                    vec![vec![RowValues::Timestamp(Utc::now().naive_utc())]],
                ))
            }
            RELEASE_LOCK => {
                needs(schema, LOCK_TABLE)?;
                let held = schema.lock.is_some();
                if held {
                    schema.lock = Some(None);
                }
                Ok(ResultSet::affected(usize::from(held)))
            }
            other => Ok(responses.get(other).cloned().unwrap_or_default()),
        }
    }

    fn run_batch(&self, sql: &str) -> Result<(), PgSteadyError> {
        self.check_syntax(sql)?;
        let mut state = self.state();
        if let Some(fragment) = state.failing_batches.iter().find(|f| sql.contains(f.as_str())) {
            return Err(PgSteadyError::syntax_error(format!(
                "syntax error at or near \"{fragment}\""
            )));
        }
        if sql == DESTROY {
            state.schema = MockSchema::default();
            return Ok(());
        }
        let schema = &mut state.schema;
        for statement in sql.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            if let Some(caps) = CREATE_TABLE.captures(statement) {
                schema.tables.insert(caps[1].to_string());
            } else if let Some(caps) = DROP_TABLE.captures(statement) {
                let table = &caps[1];
                schema.tables.remove(table);
                if table == LOCK_TABLE {
                    schema.lock = None;
                } else if table == MIGRATIONS_TABLE {
                    schema.versions.clear();
                }
            } else if INSERT_LOCK_ROW.is_match(statement) && schema.lock.is_none() {
                schema.lock = Some(None);
            }
        }
        Ok(())
    }
}

fn int_param(params: &[RowValues], index: usize) -> Result<i64, PgSteadyError> {
    params
        .get(index)
        .and_then(RowValues::as_int)
        .copied()
        .ok_or_else(|| PgSteadyError::ParameterError(format!("expected an integer at ${}", index + 1)))
}

/// One session on a [`MockDatabase`].
pub struct MockSession {
    db: MockDatabase,
    prepared: HashMap<String, String>,
    state: TransactionState,
    snapshot: Option<MockSchema>,
    broken: bool,
}

impl MockSession {
    #[must_use]
    pub fn new(db: MockDatabase) -> Self {
        Self {
            db,
            prepared: HashMap::new(),
            state: TransactionState::Idle,
            snapshot: None,
            broken: false,
        }
    }

    #[must_use]
    pub fn prepared_names(&self) -> Vec<String> {
        self.prepared.keys().cloned().collect()
    }

    fn guard(&mut self) -> Result<(), PgSteadyError> {
        if self.broken {
            return Err(PgSteadyError::connection_lost("mock session already broken"));
        }
        if self.db.take_lost() {
            self.broken = true;
            return Err(PgSteadyError::connection_lost("mock connection dropped"));
        }
        Ok(())
    }

    fn track<T>(&mut self, result: Result<T, PgSteadyError>) -> Result<T, PgSteadyError> {
        if result.is_err() && self.state == TransactionState::InTransaction {
            self.state = TransactionState::Failed;
        }
        result
    }

    fn end_transaction(&mut self, restore: bool) {
        if let Some(snapshot) = self.snapshot.take() {
            if restore {
                self.db.state().schema = snapshot;
            }
        }
        self.state = TransactionState::Idle;
    }
}

#[async_trait]
impl DbSession for MockSession {
    async fn execute(
        &mut self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<ResultSet, PgSteadyError> {
        self.db.record(MockCall::Execute {
            sql: sql.to_string(),
            params: params.to_vec(),
        });
        let result = self.guard().and_then(|()| self.db.run_sql(sql, params));
        self.track(result)
    }

    async fn execute_prepared(
        &mut self,
        name: &str,
        params: &[RowValues],
    ) -> Result<ResultSet, PgSteadyError> {
        self.db.record(MockCall::ExecutePrepared {
            name: name.to_string(),
            params: params.to_vec(),
        });
        let result = self.guard().and_then(|()| match self.prepared.get(name) {
            Some(sql) => self.db.run_sql(sql, params),
            None => Err(PgSteadyError::UndefinedPreparedStatement(name.to_string())),
        });
        self.track(result)
    }

    async fn prepare(&mut self, name: &str, sql: &str) -> Result<(), PgSteadyError> {
        self.db.record(MockCall::Prepare {
            name: name.to_string(),
            sql: sql.to_string(),
        });
        let result = self.guard().and_then(|()| self.db.check_syntax(sql));
        self.track(result)?;
        self.prepared.insert(name.to_string(), sql.to_string());
        Ok(())
    }

    async fn batch_execute(&mut self, sql: &str) -> Result<(), PgSteadyError> {
        self.db.record(MockCall::Batch(sql.to_string()));
        let result = self.guard().and_then(|()| self.db.run_batch(sql));
        self.track(result)
    }

    async fn begin(&mut self) -> Result<(), PgSteadyError> {
        self.db.record(MockCall::Begin);
        self.guard()?;
        self.snapshot = Some(self.db.state().schema.clone());
        self.state = TransactionState::InTransaction;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), PgSteadyError> {
        self.db.record(MockCall::Commit);
        if let Err(err) = self.guard() {
            self.end_transaction(true);
            return Err(err);
        }
        // Committing a failed transaction rolls it back, as Postgres does.
        let failed = self.state == TransactionState::Failed;
        self.end_transaction(failed);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), PgSteadyError> {
        self.db.record(MockCall::Rollback);
        self.end_transaction(true);
        if self.broken {
            return Err(PgSteadyError::connection_lost("mock session already broken"));
        }
        Ok(())
    }

    fn transaction_state(&self) -> TransactionState {
        self.state
    }

    fn is_broken(&self) -> bool {
        self.broken
    }
}

/// bb8 manager producing [`MockSession`]s on one shared [`MockDatabase`].
#[derive(Clone)]
pub struct MockManager {
    db: MockDatabase,
}

impl MockManager {
    #[must_use]
    pub fn new(db: MockDatabase) -> Self {
        Self { db }
    }

    #[must_use]
    pub fn database(&self) -> &MockDatabase {
        &self.db
    }
}

impl ManageConnection for MockManager {
    type Connection = MockSession;
    type Error = PgSteadyError;

    #[allow(clippy::manual_async_fn)]
    fn connect(&self) -> impl Future<Output = Result<Self::Connection, Self::Error>> + Send {
        let db = self.db.clone();
        async move {
            if db.take_refused() {
                return Err(PgSteadyError::connection_lost("mock connection refused"));
            }
            db.state().connects += 1;
            db.record(MockCall::Connect);
            Ok(MockSession::new(db))
        }
    }

    #[allow(clippy::manual_async_fn)]
    fn is_valid(
        &self,
        conn: &mut Self::Connection,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        async move {
            if conn.is_broken() {
                Err(PgSteadyError::connection_lost("mock session already broken"))
            } else {
                Ok(())
            }
        }
    }

    fn has_broken(&self, conn: &mut Self::Connection) -> bool {
        conn.is_broken()
    }
}
