//! Convenient imports for common functionality.
//!
//! This module re-exports the most commonly used types and functions
//! to make it easier to get started with the library.

pub use crate::dataset::{Dataset, RowMapper};
pub use crate::error::PgSteadyError;
pub use crate::executor::{StatementRunner, exec_stmt};
pub use crate::migrate::{
    LockSettings, MigrationOutcome, MigrationRegistry, SchemaMigrator, SchemaVersion,
};
pub use crate::pool::{ConnectionPool, PoolConfig, PoolSettings, PoolStats, PooledSession};
pub use crate::postgres::{PgManager, PgSession};
pub use crate::query_builder::{Query, WhereClause};
pub use crate::results::{CustomDbRow, ResultSet};
pub use crate::session::{DbSession, TransactionState};
pub use crate::types::{Direction, RowValues};
