use std::collections::HashMap;
use std::sync::Arc;

use crate::error::PgSteadyError;
use crate::types::RowValues;

/// A row from a database query result
///
/// This struct represents a single row from a database query result,
/// with access to both the column names and the values.
#[derive(Debug, Clone)]
pub struct CustomDbRow {
    /// The column names for this row (shared across all rows in a result set)
    pub column_names: Arc<Vec<String>>,
    /// The values for this row
    pub rows: Vec<RowValues>,
    #[doc(hidden)]
    pub(crate) column_index_cache: Arc<HashMap<String, usize>>,
}

impl CustomDbRow {
    /// Create a new database row, building its own column-index cache.
    #[must_use]
    pub fn new(column_names: Arc<Vec<String>>, rows: Vec<RowValues>) -> Self {
        let cache = Arc::new(index_columns(&column_names));
        Self {
            column_names,
            rows,
            column_index_cache: cache,
        }
    }

    /// Get the index of a column by name
    #[must_use]
    pub fn get_column_index(&self, column_name: &str) -> Option<usize> {
        if let Some(&idx) = self.column_index_cache.get(column_name) {
            return Some(idx);
        }
        self.column_names.iter().position(|col| col == column_name)
    }

    /// Get a value from the row by column name
    #[must_use]
    pub fn get(&self, column_name: &str) -> Option<&RowValues> {
        self.get_column_index(column_name)
            .and_then(|idx| self.rows.get(idx))
    }

    /// Get a value from the row by column index
    #[must_use]
    pub fn get_by_index(&self, index: usize) -> Option<&RowValues> {
        self.rows.get(index)
    }

    /// Fetch an integer column, failing when it is missing or has another type.
    ///
    /// # Errors
    /// Returns `PgSteadyError::ExecutionError` naming the column.
    pub fn try_int(&self, column_name: &str) -> Result<i64, PgSteadyError> {
        self.get(column_name)
            .and_then(RowValues::as_int)
            .copied()
            .ok_or_else(|| {
                PgSteadyError::ExecutionError(format!("column {column_name} is not an integer"))
            })
    }

    /// Fetch a text column; NULL reads as `None`.
    ///
    /// # Errors
    /// Returns `PgSteadyError::ExecutionError` if the column is missing or not text.
    pub fn try_text(&self, column_name: &str) -> Result<Option<String>, PgSteadyError> {
        match self.get(column_name) {
            Some(RowValues::Null) => Ok(None),
            Some(RowValues::Text(s)) => Ok(Some(s.clone())),
            _ => Err(PgSteadyError::ExecutionError(format!(
                "column {column_name} is not text"
            ))),
        }
    }
}

pub(crate) fn index_columns(column_names: &[String]) -> HashMap<String, usize> {
    column_names
        .iter()
        .enumerate()
        .map(|(i, name)| (name.clone(), i))
        .collect()
}
