use std::time::Duration;

use thiserror::Error;
use tokio_postgres::error::SqlState;

/// Boxed driver error kept as the `source` of classified failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum PgSteadyError {
    /// The transport to the server is gone (broken socket, terminated backend, unable to send).
    #[error("database connection lost: {message}")]
    ConnectionLost {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("timed out after {0:?} checking out a pooled connection")]
    PoolCheckoutTimeout(Duration),

    #[error("prepared statement \"{0}\" does not exist")]
    UndefinedPreparedStatement(String),

    #[error("SQL syntax error: {message}")]
    StatementSyntaxError {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("undefined table: {message}")]
    UndefinedTable {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error(transparent)]
    Postgres(tokio_postgres::Error),

    #[error("invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("use placeholders in WHERE clause: {0:?}")]
    UnsafeWhereClause(String),

    #[error("invalid ORDER BY direction: {0:?}")]
    InvalidDirection(String),

    #[error("LIMIT must be a non-negative integer, got {0}")]
    InvalidLimit(i64),

    #[error("cursor offset cannot be empty when a cursor column is set")]
    MissingOffset,

    #[error("broken migration version sequence: expected {expected}, got {found}")]
    BrokenVersionSequence { expected: i32, found: i32 },

    #[error("duplicate migration version {0}")]
    DuplicateVersion(i32),

    #[error("migration version {0} does not exist")]
    UnknownVersion(i32),

    #[error("migration version must be an integer >= 0, got {0}")]
    InvalidVersion(i32),

    #[error("migration version {0} has no down migration recorded")]
    IrreversibleVersion(i32),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Parameter conversion error: {0}")]
    ParameterError(String),

    #[error("SQL execution error: {0}")]
    ExecutionError(String),
}

impl PgSteadyError {
    /// Build a `ConnectionLost` without an underlying driver error.
    pub fn connection_lost(message: impl Into<String>) -> Self {
        Self::ConnectionLost {
            message: message.into(),
            source: None,
        }
    }

    /// Build an `UndefinedTable` for `relation` using the server's wording.
    pub fn undefined_table(relation: &str) -> Self {
        Self::UndefinedTable {
            message: format!("relation \"{relation}\" does not exist"),
            source: None,
        }
    }

    /// Build a `StatementSyntaxError` without an underlying driver error.
    pub fn syntax_error(message: impl Into<String>) -> Self {
        Self::StatementSyntaxError {
            message: message.into(),
            source: None,
        }
    }

    /// Whether the pool should heal and retry after this error.
    #[must_use]
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, Self::ConnectionLost { .. })
    }

    /// Whether this is the "relation does not exist" error for exactly `relation`.
    ///
    /// Any other missing relation is a real failure and must not be mistaken for a
    /// bootstrap state.
    #[must_use]
    pub fn is_undefined_relation(&self, relation: &str) -> bool {
        match self {
            Self::UndefinedTable { message, .. } => {
                message.contains(&format!("relation \"{relation}\" does not exist"))
            }
            _ => false,
        }
    }
}

impl From<tokio_postgres::Error> for PgSteadyError {
    fn from(err: tokio_postgres::Error) -> Self {
        let message = match err.as_db_error() {
            Some(db) => db.message().to_string(),
            None => err.to_string(),
        };

        if err.is_closed() || is_io_failure(&err) {
            return Self::ConnectionLost {
                message,
                source: Some(Box::new(err)),
            };
        }

        match err.code() {
            Some(code) if is_connection_state(code) => Self::ConnectionLost {
                message,
                source: Some(Box::new(err)),
            },
            Some(code) if *code == SqlState::INVALID_SQL_STATEMENT_NAME => {
                Self::UndefinedPreparedStatement(message)
            }
            Some(code) if *code == SqlState::SYNTAX_ERROR => Self::StatementSyntaxError {
                message,
                source: Some(Box::new(err)),
            },
            Some(code) if *code == SqlState::UNDEFINED_TABLE => Self::UndefinedTable {
                message,
                source: Some(Box::new(err)),
            },
            _ => Self::Postgres(err),
        }
    }
}

impl From<std::convert::Infallible> for PgSteadyError {
    fn from(never: std::convert::Infallible) -> Self {
        match never {}
    }
}

fn is_io_failure(err: &tokio_postgres::Error) -> bool {
    std::error::Error::source(err)
        .is_some_and(|source| source.downcast_ref::<std::io::Error>().is_some())
}

// Class 08 plus the operator-intervention codes a terminated backend reports.
fn is_connection_state(code: &SqlState) -> bool {
    code.code().starts_with("08")
        || *code == SqlState::ADMIN_SHUTDOWN
        || *code == SqlState::CRASH_SHUTDOWN
        || *code == SqlState::CANNOT_CONNECT_NOW
}
