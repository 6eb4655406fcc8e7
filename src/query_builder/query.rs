use std::collections::HashMap;
use std::fmt;

use sha2::{Digest, Sha256};

use super::clause::{WhereClause, check_placeholders_only};
use super::parameters::Parameters;
use super::sanitize::{quote_table, sanitize_column, sanitize_columns};
use crate::error::PgSteadyError;
use crate::executor::StatementRunner;
use crate::results::{CustomDbRow, ResultSet};
use crate::translation::renumber_placeholders;
use crate::types::{Direction, RowValues};

/// Prepared-statement name for `sql` issued against `table`.
///
/// Derived from the text only, so bound values never change it.
#[must_use]
pub fn statement_name(table: &str, sql: &str) -> String {
    let digest = Sha256::new()
        .chain_update(table.as_bytes())
        .chain_update(sql.as_bytes())
        .finalize();
    let hex: String = digest[..16].iter().map(|b| format!("{b:02x}")).collect();
    format!("{table}_{hex}")
}

#[derive(Debug, Clone, PartialEq)]
struct Cursor {
    column: String,
    offset: RowValues,
    direction: Direction,
}

#[derive(Debug, Clone, PartialEq)]
struct Condition {
    sql: String,
    /// Wrapped in parentheses when ANDed with other conditions.
    grouped: bool,
}

/// Single-table SQL statement under construction.
///
/// Builder methods validate eagerly and return `Result<Self>`, so a chain stops at the
/// first invalid identifier, direction, limit or clause:
///
/// ```rust
/// use pg_steady::prelude::*;
///
/// # fn main() -> Result<(), PgSteadyError> {
/// let query = Query::new("users")?
///     .where_clause(("age > ?", vec![RowValues::Int(18)]))?
///     .cursor(Some("id"), Some(RowValues::Int(40)), Direction::Asc)?
///     .limit(Some(20))?;
///
/// assert_eq!(
///     query.sql(),
///     "SELECT * FROM \"users\" WHERE \"users\".\"id\" > $2 AND (age > $1) \
///      ORDER BY \"users\".\"id\" ASC LIMIT 20"
/// );
/// assert_eq!(query.params(), vec![RowValues::Int(18), RowValues::Int(40)]);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    table: String,
    command: String,
    scope: Option<String>,
    conditions: Vec<Condition>,
    order: Vec<(String, Direction)>,
    limit: Option<i64>,
    params: Vec<RowValues>,
    cursor: Option<Cursor>,
}

impl Query {
    /// `SELECT * FROM "table"`, no limit, no cursor.
    ///
    /// # Errors
    /// Returns `PgSteadyError::InvalidIdentifier` for an invalid table name.
    pub fn new(table: &str) -> Result<Self, PgSteadyError> {
        let command = format!("SELECT * FROM {}", quote_table(table)?);
        Ok(Self::unchecked(table, command, Vec::new()))
    }

    /// Start from a caller-supplied command such as an `INSERT`/`UPDATE`/`DELETE`
    /// skeleton, with `params` bound to its `$1..$n` placeholders.
    ///
    /// # Errors
    /// Returns `PgSteadyError::InvalidIdentifier` for an invalid table name.
    pub fn with_command(
        table: &str,
        command: impl Into<String>,
        params: Vec<RowValues>,
    ) -> Result<Self, PgSteadyError> {
        quote_table(table)?;
        Ok(Self::unchecked(table, command.into(), params))
    }

    fn unchecked(table: &str, command: String, params: Vec<RowValues>) -> Self {
        Self {
            table: table.to_string(),
            command,
            scope: None,
            conditions: Vec::new(),
            order: Vec::new(),
            limit: None,
            params,
            cursor: None,
        }
    }

    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Replace the select list; no columns means `*`.
    ///
    /// # Errors
    /// Returns `PgSteadyError::InvalidIdentifier` for an invalid column.
    pub fn select<I, S>(mut self, columns: I) -> Result<Self, PgSteadyError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let columns = sanitize_columns(columns, Some(&self.table))?;
        let list = if columns.is_empty() {
            "*".to_string()
        } else {
            columns.join(", ")
        };
        self.command = format!("SELECT {list} FROM {}", quote_table(&self.table)?);
        Ok(self)
    }

    /// Standing condition ANDed in front of every `where_clause` condition.
    ///
    /// # Errors
    /// Returns `PgSteadyError::UnsafeWhereClause` for inlined comparisons and
    /// `PgSteadyError::ParameterError` if the fragment has placeholders.
    pub fn scope(mut self, fragment: &str) -> Result<Self, PgSteadyError> {
        if fragment.trim().is_empty() {
            self.scope = None;
            return Ok(self);
        }
        check_placeholders_only(fragment)?;
        if renumber_placeholders(fragment, 0)?.placeholders > 0 {
            return Err(PgSteadyError::ParameterError(
                "scope fragments cannot take parameters".to_string(),
            ));
        }
        self.scope = Some(fragment.to_string());
        Ok(self)
    }

    /// Add a condition. Successive calls are ANDed; an empty clause is a no-op.
    ///
    /// Map entries render as `"table"."column" = $N` in key order. In raw fragments
    /// `?` and `$N` are numbered after the parameters already bound.
    ///
    /// # Errors
    /// Returns `PgSteadyError::InvalidIdentifier` for an invalid map key,
    /// `PgSteadyError::UnsafeWhereClause` for a raw fragment comparing against an inlined
    /// value, and `PgSteadyError::ParameterError` when a raw fragment's placeholders do not
    /// match its parameters.
    pub fn where_clause(mut self, clause: impl Into<WhereClause>) -> Result<Self, PgSteadyError> {
        let clause = clause.into();
        if clause.is_empty() {
            return Ok(self);
        }
        match clause {
            WhereClause::Empty => {}
            WhereClause::Map(entries) => {
                let bound = Parameters::bind_with(
                    entries,
                    Some(&self.table),
                    self.params.len() + 1,
                    &HashMap::new(),
                )?;
                let sql = bound
                    .iter()
                    .map(|p| format!("{} = {}", p.column, p.index))
                    .collect::<Vec<_>>()
                    .join(" AND ");
                self.params.extend(bound.values());
                self.conditions.push(Condition {
                    sql,
                    grouped: false,
                });
            }
            WhereClause::Raw { sql, params } => {
                check_placeholders_only(&sql)?;
                let renumbered = renumber_placeholders(&sql, self.params.len())?;
                if renumbered.placeholders != params.len() {
                    return Err(PgSteadyError::ParameterError(format!(
                        "WHERE clause uses {} placeholders but {} parameters were given",
                        renumbered.placeholders,
                        params.len()
                    )));
                }
                self.params.extend(params);
                self.conditions.push(Condition {
                    sql: renumbered.sql,
                    grouped: true,
                });
            }
        }
        Ok(self)
    }

    /// Shorthand for a single `column = value` condition.
    ///
    /// # Errors
    /// See [`Query::where_clause`].
    pub fn where_eq(
        self,
        column: &str,
        value: impl Into<RowValues>,
    ) -> Result<Self, PgSteadyError> {
        self.where_clause(vec![(column.to_string(), value.into())])
    }

    /// Shorthand for a raw fragment with its parameters.
    ///
    /// # Errors
    /// See [`Query::where_clause`].
    pub fn where_raw(self, sql: &str, params: Vec<RowValues>) -> Result<Self, PgSteadyError> {
        self.where_clause(WhereClause::raw(sql, params))
    }

    /// Append an `ORDER BY` entry. Ordering again by the same column changes its
    /// direction in place.
    ///
    /// # Errors
    /// Returns `PgSteadyError::InvalidIdentifier` or `PgSteadyError::InvalidDirection`.
    pub fn order<D>(mut self, column: &str, direction: D) -> Result<Self, PgSteadyError>
    where
        D: TryInto<Direction>,
        PgSteadyError: From<D::Error>,
    {
        let direction = direction.try_into()?;
        let column = sanitize_column(column, Some(&self.table))?;
        match self.order.iter_mut().find(|(existing, _)| *existing == column) {
            Some(entry) => entry.1 = direction,
            None => self.order.push((column, direction)),
        }
        Ok(self)
    }

    /// Cap the number of rows; `None` removes the cap.
    ///
    /// # Errors
    /// Returns `PgSteadyError::InvalidLimit` for a negative count.
    pub fn limit(mut self, limit: Option<i64>) -> Result<Self, PgSteadyError> {
        if let Some(n) = limit
            && n < 0
        {
            return Err(PgSteadyError::InvalidLimit(n));
        }
        self.limit = limit;
        Ok(self)
    }

    /// Enable keyset pagination on `column`, continuing after `offset`; `None` disables it.
    ///
    /// The cursor condition is ANDed ahead of the other conditions and its `ORDER BY`
    /// entry always comes first. The offset is bound as the last parameter.
    ///
    /// The comparison follows the direction: `Asc` renders `column > offset`, `Desc`
    /// renders `column < offset`, so a descending walk starts from a high offset and
    /// moves down.
    ///
    /// # Errors
    /// Returns `PgSteadyError::MissingOffset` when a column is given without an offset,
    /// otherwise `InvalidIdentifier` / `InvalidDirection`.
    pub fn cursor<D>(
        mut self,
        column: Option<&str>,
        offset: Option<RowValues>,
        direction: D,
    ) -> Result<Self, PgSteadyError>
    where
        D: TryInto<Direction>,
        PgSteadyError: From<D::Error>,
    {
        let Some(column) = column else {
            self.cursor = None;
            return Ok(self);
        };
        let offset = match offset {
            None | Some(RowValues::Null) => return Err(PgSteadyError::MissingOffset),
            Some(value) => value,
        };
        let column = sanitize_column(column, Some(&self.table))?;
        let direction = direction.try_into()?;
        self.cursor = Some(Cursor {
            column,
            offset,
            direction,
        });
        Ok(self)
    }

    fn render_conditions(&self) -> Option<String> {
        match self.conditions.as_slice() {
            [] => None,
            [only] => Some(only.sql.clone()),
            many => Some(
                many.iter()
                    .map(|c| {
                        if c.grouped {
                            format!("({})", c.sql)
                        } else {
                            c.sql.clone()
                        }
                    })
                    .collect::<Vec<_>>()
                    .join(" AND "),
            ),
        }
    }

    fn render_where(&self) -> Option<String> {
        let clause = match (&self.cursor, self.render_conditions()) {
            (Some(cursor), existing) => {
                let keyset = format!(
                    "{} {} ${}",
                    cursor.column,
                    cursor.direction.cursor_operator(),
                    self.params.len() + 1
                );
                Some(match existing {
                    Some(existing) => format!("{keyset} AND ({existing})"),
                    None => keyset,
                })
            }
            (None, existing) => existing,
        };
        match (&self.scope, clause) {
            (Some(scope), Some(clause)) => Some(format!("({scope}) AND {clause}")),
            (Some(scope), None) => Some(scope.clone()),
            (None, clause) => clause,
        }
    }

    fn render_order(&self) -> Vec<String> {
        let mut entries = Vec::with_capacity(self.order.len() + 1);
        if let Some(cursor) = &self.cursor {
            entries.push(format!("{} {}", cursor.column, cursor.direction));
        }
        for (column, direction) in &self.order {
            if self.cursor.as_ref().is_some_and(|c| c.column == *column) {
                continue;
            }
            entries.push(format!("{column} {direction}"));
        }
        entries
    }

    fn returns_rows(&self) -> bool {
        let head = self.command.trim_start();
        let verb = head.split_whitespace().next().unwrap_or_default();
        ["INSERT", "UPDATE", "DELETE"]
            .iter()
            .any(|dml| verb.eq_ignore_ascii_case(dml))
            && !head.to_ascii_uppercase().contains(" RETURNING ")
    }

    /// Render the statement text.
    #[must_use]
    pub fn sql(&self) -> String {
        let mut sql = self.command.trim_end().to_string();
        if let Some(clause) = self.render_where() {
            sql.push_str(" WHERE ");
            sql.push_str(&clause);
        }
        let order = self.render_order();
        if !order.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&order.join(", "));
        }
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        if self.returns_rows() {
            sql.push_str(" RETURNING *");
        }
        sql
    }

    /// Bound values in placeholder order, the cursor offset last.
    #[must_use]
    pub fn params(&self) -> Vec<RowValues> {
        let mut params = self.params.clone();
        if let Some(cursor) = &self.cursor {
            params.push(cursor.offset.clone());
        }
        params
    }

    #[must_use]
    pub fn statement_name(&self) -> String {
        statement_name(&self.table, &self.sql())
    }

    /// Execute and return the whole result set.
    ///
    /// # Errors
    /// Propagates execution errors from `runner`.
    pub async fn run<R>(&self, runner: &R) -> Result<ResultSet, PgSteadyError>
    where
        R: StatementRunner + ?Sized,
    {
        let sql = self.sql();
        let params = self.params();
        runner
            .exec_stmt(&statement_name(&self.table, &sql), &sql, &params)
            .await
    }

    /// # Errors
    /// Propagates execution errors from `runner`.
    pub async fn to_vec<R>(&self, runner: &R) -> Result<Vec<CustomDbRow>, PgSteadyError>
    where
        R: StatementRunner + ?Sized,
    {
        Ok(self.run(runner).await?.into_rows())
    }

    /// Execute and convert every row with `mapper`.
    ///
    /// # Errors
    /// Propagates execution errors and the first mapper error.
    pub async fn to_vec_with<R, T, F>(&self, runner: &R, mapper: F) -> Result<Vec<T>, PgSteadyError>
    where
        R: StatementRunner + ?Sized,
        F: FnMut(CustomDbRow) -> Result<T, PgSteadyError>,
    {
        self.to_vec(runner).await?.into_iter().map(mapper).collect()
    }

    /// Run `visit` for each row in order, stopping at its first error.
    ///
    /// # Errors
    /// Propagates execution errors and errors returned by `visit`.
    pub async fn each<R, F>(&self, runner: &R, mut visit: F) -> Result<(), PgSteadyError>
    where
        R: StatementRunner + ?Sized,
        F: FnMut(CustomDbRow) -> Result<(), PgSteadyError>,
    {
        for row in self.to_vec(runner).await? {
            visit(row)?;
        }
        Ok(())
    }

    /// The first row, with `LIMIT 1` and the cursor disabled.
    ///
    /// # Errors
    /// Propagates execution errors from `runner`.
    pub async fn first<R>(&self, runner: &R) -> Result<Option<CustomDbRow>, PgSteadyError>
    where
        R: StatementRunner + ?Sized,
    {
        let mut single = self.clone();
        single.limit = Some(1);
        single.cursor = None;
        Ok(single.to_vec(runner).await?.into_iter().next())
    }

    /// # Errors
    /// Propagates execution errors and the mapper error.
    pub async fn first_with<R, T, F>(&self, runner: &R, mapper: F) -> Result<Option<T>, PgSteadyError>
    where
        R: StatementRunner + ?Sized,
        F: FnOnce(CustomDbRow) -> Result<T, PgSteadyError>,
    {
        self.first(runner).await?.map(mapper).transpose()
    }

    /// Count matching rows; ordering, cursor and limit are ignored.
    ///
    /// # Errors
    /// Propagates execution errors from `runner`.
    pub async fn count<R>(&self, runner: &R) -> Result<i64, PgSteadyError>
    where
        R: StatementRunner + ?Sized,
    {
        let mut counting = self.clone();
        counting.command = format!("SELECT COUNT(*) FROM {}", quote_table(&self.table)?);
        counting.order.clear();
        counting.cursor = None;
        counting.limit = None;
        let row = counting.run(runner).await?.into_rows().into_iter().next();
        Ok(row
            .and_then(|r| r.get("count").and_then(RowValues::as_int).copied())
            .unwrap_or(0))
    }

    /// `EXPLAIN` text with placeholders replaced by literal values.
    ///
    /// For reading only. String values are quoted but not escaped, and a value that
    /// itself contains `$N` text can be substituted again. Never execute the result as a
    /// substitute for the parameterized statement.
    #[must_use]
    pub fn explain_sql(&self) -> String {
        let mut sql = format!("EXPLAIN {}", self.sql());
        // highest first so `$1` never eats the prefix of `$10`
        for (i, value) in self.params().iter().enumerate().rev() {
            sql = sql.replace(&format!("${}", i + 1), &value.to_sql_literal());
        }
        sql
    }

    /// Ask the server for the query plan of [`Query::explain_sql`], one line per plan row.
    ///
    /// # Errors
    /// Propagates execution errors from `runner`.
    pub async fn explain<R>(&self, runner: &R) -> Result<String, PgSteadyError>
    where
        R: StatementRunner + ?Sized,
    {
        let plan = runner.execute(&self.explain_sql(), &[]).await?;
        Ok(plan
            .results
            .iter()
            .filter_map(|row| row.get_by_index(0).and_then(RowValues::as_text))
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<String> = self.params().iter().map(ToString::to_string).collect();
        write!(f, "Query {{ sql: {}, params: [{}] }}", self.sql(), params.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn users() -> Query {
        Query::new("users").unwrap()
    }

    #[test]
    fn default_select() {
        assert_eq!(users().sql(), "SELECT * FROM \"users\"");
        assert!(users().params().is_empty());
    }

    #[test]
    fn empty_where_is_noop() {
        let q = users()
            .where_clause(WhereClause::Empty)
            .unwrap()
            .where_clause(None::<&str>)
            .unwrap()
            .where_clause(Vec::<(String, RowValues)>::new())
            .unwrap();
        assert_eq!(q.sql(), "SELECT * FROM \"users\"");
    }

    #[test]
    fn map_renders_one_predicate_per_entry() {
        for n in 1..=6usize {
            let entries: BTreeMap<String, RowValues> = (0..n)
                .map(|i| (format!("c{i}"), RowValues::Int(i as i64)))
                .collect();
            let q = users().where_clause(entries).unwrap();
            let sql = q.sql();
            let clause = sql.split(" WHERE ").nth(1).unwrap();
            let predicates: Vec<&str> = clause.split(" AND ").collect();
            assert_eq!(predicates.len(), n);
            for (i, predicate) in predicates.iter().enumerate() {
                assert_eq!(*predicate, format!("\"users\".\"c{i}\" = ${}", i + 1));
            }
            assert_eq!(q.params().len(), n);
        }
    }

    #[test]
    fn map_ordering_is_independent_of_input_order() {
        let a = users()
            .where_clause(vec![("name", RowValues::from("bob")), ("age", RowValues::Int(3))])
            .unwrap();
        let b = users()
            .where_clause(vec![("age", RowValues::Int(3)), ("name", RowValues::from("bob"))])
            .unwrap();
        assert_eq!(a.sql(), b.sql());
        assert_eq!(
            a.sql(),
            "SELECT * FROM \"users\" WHERE \"users\".\"age\" = $1 AND \"users\".\"name\" = $2"
        );
        assert_eq!(a.params(), vec![RowValues::Int(3), RowValues::from("bob")]);
    }

    #[test]
    fn raw_clause_numbering_continues() {
        let q = users()
            .where_eq("team", 4)
            .unwrap()
            .where_raw("age > ? OR age < ?", vec![10.into(), 2.into()])
            .unwrap();
        assert_eq!(
            q.sql(),
            "SELECT * FROM \"users\" WHERE \"users\".\"team\" = $1 AND (age > $2 OR age < $3)"
        );
        assert_eq!(q.params().len(), 3);
    }

    #[test]
    fn raw_clause_rejects_inlined_values_and_mismatched_params() {
        assert!(matches!(
            users().where_clause("name = 'bob'"),
            Err(PgSteadyError::UnsafeWhereClause(_))
        ));
        assert!(matches!(
            users().where_raw("a = ? AND b = ?", vec![1.into()]),
            Err(PgSteadyError::ParameterError(_))
        ));
    }

    #[test]
    fn cursor_prepends_order_and_binds_offset_last() {
        let q = users()
            .order("name", Direction::Desc)
            .unwrap()
            .order("id", "desc")
            .unwrap()
            .where_raw("age > ?", vec![18.into()])
            .unwrap()
            .cursor(Some("id"), Some(10.into()), "asc")
            .unwrap()
            .limit(Some(5))
            .unwrap();
        assert_eq!(
            q.sql(),
            "SELECT * FROM \"users\" WHERE \"users\".\"id\" > $2 AND (age > $1) \
             ORDER BY \"users\".\"id\" ASC, \"users\".\"name\" DESC LIMIT 5"
        );
        assert_eq!(q.params(), vec![RowValues::Int(18), RowValues::Int(10)]);
    }

    #[test]
    fn descending_cursor_walks_backwards() {
        let q = users()
            .cursor(Some("created_at"), Some("2024-01-01".into()), Direction::Desc)
            .unwrap();
        assert_eq!(
            q.sql(),
            "SELECT * FROM \"users\" WHERE \"users\".\"created_at\" < $1 \
             ORDER BY \"users\".\"created_at\" DESC"
        );
    }

    #[test]
    fn cursor_validation() {
        assert!(matches!(
            users().cursor(Some("id"), None, Direction::Asc),
            Err(PgSteadyError::MissingOffset)
        ));
        assert!(matches!(
            users().cursor(Some("id"), Some(1.into()), "up"),
            Err(PgSteadyError::InvalidDirection(_))
        ));
        assert!(matches!(
            users().cursor(Some("id;"), Some(1.into()), "asc"),
            Err(PgSteadyError::InvalidIdentifier(_))
        ));
        let q = users()
            .cursor(Some("id"), Some(1.into()), "asc")
            .unwrap()
            .cursor(None, None, Direction::Asc)
            .unwrap();
        assert_eq!(q.sql(), "SELECT * FROM \"users\"");
    }

    #[test]
    fn order_and_limit_validation() {
        assert!(matches!(
            users().order("name", "sideways"),
            Err(PgSteadyError::InvalidDirection(_))
        ));
        assert!(matches!(users().limit(Some(-1)), Err(PgSteadyError::InvalidLimit(-1))));
        let q = users().limit(Some(3)).unwrap().limit(None).unwrap();
        assert_eq!(q.sql(), "SELECT * FROM \"users\"");
    }

    #[test]
    fn order_accumulates_in_call_order() {
        let q = users()
            .order("b", "asc")
            .unwrap()
            .order("a", "desc")
            .unwrap();
        assert!(q.sql().ends_with("ORDER BY \"users\".\"b\" ASC, \"users\".\"a\" DESC"));
    }

    #[test]
    fn scope_is_anded_first() {
        let q = users()
            .scope("deleted_at IS NULL")
            .unwrap()
            .where_eq("id", 1)
            .unwrap();
        assert_eq!(
            q.sql(),
            "SELECT * FROM \"users\" WHERE (deleted_at IS NULL) AND \"users\".\"id\" = $1"
        );
        assert!(users().scope("id = ?").is_err());
        assert!(users().scope("id = 4").is_err());
    }

    #[test]
    fn dml_commands_return_rows() {
        let q = Query::with_command("users", "DELETE FROM \"users\"", Vec::new())
            .unwrap()
            .where_eq("id", 7)
            .unwrap();
        assert_eq!(
            q.sql(),
            "DELETE FROM \"users\" WHERE \"users\".\"id\" = $1 RETURNING *"
        );
        let select = users().select(["id", "email"]).unwrap();
        assert_eq!(
            select.sql(),
            "SELECT \"users\".\"id\", \"users\".\"email\" FROM \"users\""
        );
    }

    #[test]
    fn statement_name_depends_on_text_only() {
        let a = users().where_eq("id", 1).unwrap();
        let b = users().where_eq("id", 999).unwrap();
        let c = users().where_eq("email", 1).unwrap();
        assert_eq!(a.statement_name(), b.statement_name());
        assert_ne!(a.statement_name(), c.statement_name());
        assert!(a.statement_name().starts_with("users_"));
        assert_eq!(a.statement_name().len(), "users_".len() + 32);
    }

    #[test]
    fn explain_substitutes_highest_index_first() {
        let params: Vec<RowValues> = (1..=10).map(RowValues::Int).collect();
        let placeholders: Vec<String> = (1..=10).map(|i| format!("c{i} = ?")).collect();
        let q = users().where_raw(&placeholders.join(" AND "), params).unwrap();
        let explained = q.explain_sql();
        assert!(explained.starts_with("EXPLAIN SELECT"));
        assert!(explained.contains("c10 = 10"));
        assert!(explained.contains("c1 = 1 "));
        assert!(!explained.contains('$'));

        let named = users().where_eq("name", "bob").unwrap();
        assert!(named.explain_sql().ends_with("\"users\".\"name\" = 'bob'"));
    }

    #[test]
    fn display_shows_sql_and_params() {
        let q = users().where_eq("name", "bob").unwrap();
        assert_eq!(
            q.to_string(),
            "Query { sql: SELECT * FROM \"users\" WHERE \"users\".\"name\" = $1, params: [\"bob\"] }"
        );
    }
}
