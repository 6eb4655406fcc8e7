use std::collections::HashMap;
use std::sync::Arc;

use crate::error::PgSteadyError;
use crate::executor::StatementRunner;
use crate::query_builder::{Parameters, Query, WhereClause, quote_table, sanitize_column};
use crate::results::CustomDbRow;
use crate::types::{Direction, RowValues};

/// Converts a raw row into the caller's domain type.
pub type RowMapper<T> = Arc<dyn Fn(CustomDbRow) -> Result<T, PgSteadyError> + Send + Sync>;

// Maintained by the database, never written through insert/update.
const MANAGED_COLUMNS: [&str; 3] = ["id", "created_at", "updated_at"];

/// CRUD and pagination for one table.
///
/// Rows come back as [`CustomDbRow`] unless a mapper is installed with
/// [`Dataset::with_mapper`].
///
/// ```rust,no_run
/// # use std::sync::Arc;
/// # use pg_steady::prelude::*;
/// # async fn demo(pool: ConnectionPool<PgManager>) -> Result<(), PgSteadyError> {
/// let users = Dataset::new(Arc::new(pool), "users")?
///     .with_mapper(|row| row.try_text("email"));
/// let created = users.insert(vec![("email", "a@example.com")]).await?;
/// let page = users.page(0, 20, "id", Direction::Asc, WhereClause::Empty).await?;
/// # let _ = (created, page);
/// # Ok(())
/// # }
/// ```
pub struct Dataset<T = CustomDbRow> {
    runner: Arc<dyn StatementRunner>,
    table: String,
    scope: Option<String>,
    column_types: HashMap<String, String>,
    mapper: RowMapper<T>,
}

impl<T> Clone for Dataset<T> {
    fn clone(&self) -> Self {
        Self {
            runner: Arc::clone(&self.runner),
            table: self.table.clone(),
            scope: self.scope.clone(),
            column_types: self.column_types.clone(),
            mapper: Arc::clone(&self.mapper),
        }
    }
}

impl Dataset<CustomDbRow> {
    /// # Errors
    /// Returns `PgSteadyError::InvalidIdentifier` for an invalid table name.
    pub fn new(runner: Arc<dyn StatementRunner>, table: &str) -> Result<Self, PgSteadyError> {
        quote_table(table)?;
        Ok(Self {
            runner,
            table: table.to_string(),
            scope: None,
            column_types: HashMap::new(),
            mapper: Arc::new(Ok::<CustomDbRow, PgSteadyError>),
        })
    }
}

impl<T> Dataset<T> {
    /// Return rows through `mapper` from now on.
    #[must_use]
    pub fn with_mapper<U, F>(self, mapper: F) -> Dataset<U>
    where
        F: Fn(CustomDbRow) -> Result<U, PgSteadyError> + Send + Sync + 'static,
    {
        Dataset {
            runner: self.runner,
            table: self.table,
            scope: self.scope,
            column_types: self.column_types,
            mapper: Arc::new(mapper),
        }
    }

    /// SQL types used as placeholder casts (`$N::type`) on insert and update.
    #[must_use]
    pub fn with_column_types<I, K, V>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.column_types = types
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self
    }

    /// Standing condition for every read and delete, e.g. `deleted_at IS NULL`.
    ///
    /// # Errors
    /// See [`Query::scope`].
    pub fn with_scope(mut self, fragment: &str) -> Result<Self, PgSteadyError> {
        Query::new(&self.table)?.scope(fragment)?;
        self.scope = Some(fragment.to_string());
        Ok(self)
    }

    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    #[must_use]
    pub fn runner(&self) -> &dyn StatementRunner {
        self.runner.as_ref()
    }

    fn query(&self) -> Result<Query, PgSteadyError> {
        self.scoped(Query::new(&self.table)?)
    }

    fn scoped(&self, query: Query) -> Result<Query, PgSteadyError> {
        match &self.scope {
            Some(scope) => query.scope(scope),
            None => Ok(query),
        }
    }

    fn map_one(&self, row: Option<CustomDbRow>) -> Result<Option<T>, PgSteadyError> {
        row.map(|r| (self.mapper)(r)).transpose()
    }

    fn map_all(&self, rows: Vec<CustomDbRow>) -> Result<Vec<T>, PgSteadyError> {
        rows.into_iter().map(|r| (self.mapper)(r)).collect()
    }

    /// A query selecting `columns` (all when empty).
    ///
    /// # Errors
    /// Returns `PgSteadyError::InvalidIdentifier` for an invalid column.
    pub fn select<I, S>(&self, columns: I) -> Result<Query, PgSteadyError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.query()?.select(columns)
    }

    /// # Errors
    /// See [`Query::where_clause`].
    pub fn where_clause(&self, clause: impl Into<WhereClause>) -> Result<Query, PgSteadyError> {
        self.query()?.where_clause(clause)
    }

    fn writable<I, K, V>(attributes: I) -> Vec<(String, RowValues)>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<RowValues>,
    {
        attributes
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .filter(|(k, _)| !MANAGED_COLUMNS.contains(&k.as_str()))
            .collect()
    }

    /// Insert a row and return it. `id`, `created_at` and `updated_at` are ignored.
    ///
    /// # Errors
    /// Returns identifier errors for invalid keys and propagates execution errors.
    pub async fn insert<I, K, V>(&self, attributes: I) -> Result<Option<T>, PgSteadyError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<RowValues>,
    {
        let bound = Parameters::bind_with(Self::writable(attributes), None, 1, &self.column_types)?;
        let table = quote_table(&self.table)?;
        let command = if bound.is_empty() {
            format!("INSERT INTO {table} DEFAULT VALUES")
        } else {
            format!(
                "INSERT INTO {table} ({}) VALUES ({})",
                bound.columns().join(", "),
                bound.typed_indices().join(", ")
            )
        };
        let query = Query::with_command(&self.table, command, bound.values())?;
        self.map_one(query.to_vec(self.runner()).await?.into_iter().next())
    }

    /// Update the row with `id` and return it; with nothing to write it is just fetched.
    ///
    /// # Errors
    /// Returns identifier errors for invalid keys and propagates execution errors.
    pub async fn update<I, K, V>(
        &self,
        id: impl Into<RowValues>,
        attributes: I,
    ) -> Result<Option<T>, PgSteadyError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<RowValues>,
    {
        let id = id.into();
        let bound = Parameters::bind_with(Self::writable(attributes), None, 1, &self.column_types)?;
        if bound.is_empty() {
            return self.find(id).await;
        }
        let assignments: Vec<String> = bound
            .iter()
            .map(|p| format!("{} = {}", p.column, p.typed_index()))
            .collect();
        let command = format!(
            "UPDATE {} SET {} WHERE {} = ${}",
            quote_table(&self.table)?,
            assignments.join(", "),
            sanitize_column("id", Some(&self.table))?,
            bound.len() + 1
        );
        let mut params = bound.values();
        params.push(id);
        let query = Query::with_command(&self.table, command, params)?;
        self.map_one(query.to_vec(self.runner()).await?.into_iter().next())
    }

    /// Delete the row with `id` and return it.
    ///
    /// # Errors
    /// Propagates execution errors.
    pub async fn delete(&self, id: impl Into<RowValues>) -> Result<Option<T>, PgSteadyError> {
        let command = format!("DELETE FROM {}", quote_table(&self.table)?);
        let query = self
            .scoped(Query::with_command(&self.table, command, Vec::new())?)?
            .where_eq("id", id)?;
        self.map_one(query.to_vec(self.runner()).await?.into_iter().next())
    }

    /// # Errors
    /// Propagates execution errors.
    pub async fn find(&self, id: impl Into<RowValues>) -> Result<Option<T>, PgSteadyError> {
        let query = self.query()?.where_eq("id", id)?;
        self.map_one(query.first(self.runner()).await?)
    }

    /// # Errors
    /// Propagates execution errors.
    pub async fn all(&self) -> Result<Vec<T>, PgSteadyError> {
        self.map_all(self.query()?.to_vec(self.runner()).await?)
    }

    /// The row with the smallest `sort_by`.
    ///
    /// # Errors
    /// Returns `PgSteadyError::InvalidIdentifier` for a bad column and propagates
    /// execution errors.
    pub async fn first(&self, sort_by: &str) -> Result<Option<T>, PgSteadyError> {
        let query = self.query()?.order(sort_by, Direction::Asc)?;
        self.map_one(query.first(self.runner()).await?)
    }

    /// The row with the largest `sort_by`.
    ///
    /// # Errors
    /// Returns `PgSteadyError::InvalidIdentifier` for a bad column and propagates
    /// execution errors.
    pub async fn last(&self, sort_by: &str) -> Result<Option<T>, PgSteadyError> {
        let query = self.query()?.order(sort_by, Direction::Desc)?;
        self.map_one(query.first(self.runner()).await?)
    }

    /// # Errors
    /// Propagates execution errors.
    pub async fn count(&self) -> Result<i64, PgSteadyError> {
        self.query()?.count(self.runner()).await
    }

    /// One keyset page: up to `size` rows after `cursor` in `sort_by` order.
    ///
    /// # Errors
    /// Returns builder validation errors and propagates execution errors.
    pub async fn page(
        &self,
        cursor: impl Into<RowValues>,
        size: i64,
        sort_by: &str,
        direction: Direction,
        filter: impl Into<WhereClause>,
    ) -> Result<Vec<T>, PgSteadyError> {
        let query = self
            .query()?
            .where_clause(filter)?
            .cursor(Some(sort_by), Some(cursor.into()), direction)?
            .limit(Some(size))?;
        self.map_all(query.to_vec(self.runner()).await?)
    }
}
