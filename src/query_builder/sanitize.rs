use lazy_static::lazy_static;
use regex::Regex;

use crate::error::PgSteadyError;

lazy_static! {
    static ref IDENTIFIER: Regex =
        Regex::new(r"^(?:\*|[A-Za-z0-9_]+)$").expect("identifier pattern is valid");
}

/// Whether `name` is an acceptable column or table identifier (or the `*` wildcard).
#[must_use]
pub fn is_valid_identifier(name: &str) -> bool {
    IDENTIFIER.is_match(name)
}

/// Validate a table name and render it quoted.
///
/// # Errors
/// Returns `PgSteadyError::InvalidIdentifier` for anything other than `[A-Za-z0-9_]+`.
pub fn quote_table(table: &str) -> Result<String, PgSteadyError> {
    if table == "*" || !is_valid_identifier(table) {
        return Err(PgSteadyError::InvalidIdentifier(table.to_string()));
    }
    Ok(format!("\"{table}\""))
}

/// Validate a column name and render it quoted, optionally qualified by `table`.
///
/// ```rust
/// use pg_steady::query_builder::sanitize_column;
///
/// assert_eq!(sanitize_column("user_id", None).unwrap(), "\"user_id\"");
/// assert_eq!(sanitize_column("id", Some("users")).unwrap(), "\"users\".\"id\"");
/// assert_eq!(sanitize_column("*", Some("users")).unwrap(), "*");
/// assert!(sanitize_column("users; DROP TABLE x", None).is_err());
/// ```
///
/// # Errors
/// Returns `PgSteadyError::InvalidIdentifier` if either name fails validation.
pub fn sanitize_column(column: &str, table: Option<&str>) -> Result<String, PgSteadyError> {
    if !is_valid_identifier(column) {
        return Err(PgSteadyError::InvalidIdentifier(column.to_string()));
    }
    if column == "*" {
        return Ok("*".to_string());
    }
    match table {
        Some(table) => Ok(format!("{}.\"{column}\"", quote_table(table)?)),
        None => Ok(format!("\"{column}\"")),
    }
}

/// Sanitize every column in `columns`.
///
/// # Errors
/// Fails on the first invalid identifier.
pub fn sanitize_columns<I, S>(columns: I, table: Option<&str>) -> Result<Vec<String>, PgSteadyError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    columns
        .into_iter()
        .map(|col| sanitize_column(col.as_ref(), table))
        .collect()
}
