//! Parameterized single-table SQL: identifier sanitizing, parameter binding and the
//! `Query` builder with keyset pagination.

mod clause;
mod parameters;
mod query;
mod sanitize;

pub use clause::WhereClause;
pub use parameters::{Parameter, Parameters};
pub use query::{Query, statement_name};
pub use sanitize::{is_valid_identifier, quote_table, sanitize_column, sanitize_columns};
