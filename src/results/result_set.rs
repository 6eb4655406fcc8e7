use std::collections::HashMap;
use std::sync::Arc;

use super::row::{CustomDbRow, index_columns};
use crate::error::PgSteadyError;
use crate::types::RowValues;

/// A result set from a database query
///
/// Column names and the name-to-index cache are stored once and shared by every row.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    /// The rows returned by the query
    pub results: Vec<CustomDbRow>,
    /// The number of rows affected (for DML statements) or returned
    pub rows_affected: usize,
    column_names: Option<Arc<Vec<String>>>,
    column_index_cache: Option<Arc<HashMap<String, usize>>>,
}

impl ResultSet {
    /// Create a new result set with a known capacity
    #[must_use]
    pub fn with_capacity(capacity: usize) -> ResultSet {
        ResultSet {
            results: Vec::with_capacity(capacity),
            ..ResultSet::default()
        }
    }

    /// Build a result set from column names and row values in one go.
    #[must_use]
    pub fn from_rows(column_names: Vec<String>, rows: Vec<Vec<RowValues>>) -> ResultSet {
        let column_names = Arc::new(column_names);
        let cache = Arc::new(index_columns(&column_names));
        let results: Vec<CustomDbRow> = rows
            .into_iter()
            .map(|rows| CustomDbRow {
                column_names: Arc::clone(&column_names),
                rows,
                column_index_cache: Arc::clone(&cache),
            })
            .collect();
        ResultSet {
            rows_affected: results.len(),
            results,
            column_names: Some(column_names),
            column_index_cache: Some(cache),
        }
    }

    /// A result carrying only an affected-row count.
    #[must_use]
    pub fn affected(rows_affected: usize) -> ResultSet {
        ResultSet {
            rows_affected,
            ..ResultSet::default()
        }
    }

    /// Set the column names for this result set (to be shared by all rows)
    pub fn set_column_names(&mut self, column_names: Arc<Vec<String>>) {
        self.column_index_cache = Some(Arc::new(index_columns(&column_names)));
        self.column_names = Some(column_names);
    }

    /// Get the column names for this result set
    #[must_use]
    pub fn get_column_names(&self) -> Option<&Arc<Vec<String>>> {
        self.column_names.as_ref()
    }

    /// Add a row to the result set.
    ///
    /// # Errors
    /// Returns `PgSteadyError::ExecutionError` if column names have not been set yet.
    pub fn add_row_values(&mut self, row_values: Vec<RowValues>) -> Result<(), PgSteadyError> {
        let (Some(column_names), Some(cache)) = (&self.column_names, &self.column_index_cache) else {
            return Err(PgSteadyError::ExecutionError(
                "row added before column names were set".into(),
            ));
        };
        self.results.push(CustomDbRow {
            column_names: Arc::clone(column_names),
            rows: row_values,
            column_index_cache: Arc::clone(cache),
        });
        self.rows_affected += 1;
        Ok(())
    }

    /// Add an already-built row to the result set
    pub fn add_row(&mut self, row: CustomDbRow) {
        if self.column_names.is_none() {
            self.column_index_cache = Some(row.column_index_cache.clone());
            self.column_names = Some(row.column_names.clone());
        }
        self.results.push(row);
        self.rows_affected += 1;
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// The first row, if any.
    #[must_use]
    pub fn first(&self) -> Option<&CustomDbRow> {
        self.results.first()
    }

    /// Consume the set and return the owned rows.
    #[must_use]
    pub fn into_rows(self) -> Vec<CustomDbRow> {
        self.results
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_share_column_lookup() {
        let rs = ResultSet::from_rows(
            vec!["id".into(), "name".into()],
            vec![
                vec![RowValues::Int(1), RowValues::Text("a".into())],
                vec![RowValues::Int(2), RowValues::Null],
            ],
        );
        assert_eq!(rs.len(), 2);
        assert_eq!(rs.rows_affected, 2);
        assert_eq!(rs.results[1].try_int("id").unwrap(), 2);
        assert_eq!(rs.results[0].try_text("name").unwrap().as_deref(), Some("a"));
        assert_eq!(rs.results[1].try_text("name").unwrap(), None);
        assert!(rs.results[0].get("missing").is_none());
        assert!(Arc::ptr_eq(
            &rs.results[0].column_index_cache,
            &rs.results[1].column_index_cache
        ));
    }

    #[test]
    fn rows_without_columns_are_rejected() {
        let mut rs = ResultSet::with_capacity(1);
        assert!(matches!(
            rs.add_row_values(vec![RowValues::Int(1)]),
            Err(PgSteadyError::ExecutionError(_))
        ));
        assert!(rs.is_empty());

        rs.set_column_names(Arc::new(vec!["id".into()]));
        rs.add_row_values(vec![RowValues::Int(1)]).unwrap();
        assert_eq!(rs.len(), 1);
        assert_eq!(rs.rows_affected, 1);
    }
}
