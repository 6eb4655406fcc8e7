//! Postgres access that survives dropped connections.
//!
//! - [`pool::ConnectionPool`]: a `bb8` pool that rebuilds itself when the server goes away
//!   and reruns the interrupted operation.
//! - [`executor::exec_stmt`]: named prepared statements created lazily per session.
//! - [`query_builder::Query`]: sanitized single-table SQL with keyset pagination.
//! - [`dataset::Dataset`]: CRUD for one table on top of `Query`.
//! - [`migrate::SchemaMigrator`]: versioned up/down migrations under a cross-process lock.
//!
//! ```rust,no_run
//! use pg_steady::prelude::*;
//!
//! # async fn demo() -> Result<(), PgSteadyError> {
//! let pool = ConnectionPool::configure(PoolConfig::new("postgres://app@localhost/app")).await?;
//! let recent = Query::new("events")?
//!     .where_clause(("kind = ?", vec![RowValues::from("login")]))?
//!     .cursor(Some("id"), Some(RowValues::Int(100)), Direction::Desc)?
//!     .limit(Some(50))?;
//! # let _ = (pool, recent);
//! # Ok(())
//! # }
//! ```

pub mod dataset;
pub mod error;
pub mod executor;
pub mod migrate;
pub mod pool;
pub mod postgres;
pub mod prelude;
pub mod query_builder;
pub mod results;
pub mod session;
pub mod translation;
pub mod types;

#[cfg(any(feature = "mock", feature = "test-utils-postgres"))]
pub mod test_utils;

pub use error::PgSteadyError;
pub use results::{CustomDbRow, ResultSet};
pub use types::{Direction, RowValues};
