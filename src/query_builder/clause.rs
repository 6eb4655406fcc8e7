use std::collections::{BTreeMap, HashMap};

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::PgSteadyError;
use crate::types::RowValues;

lazy_static! {
    // `=` not followed by a `?` or `$` placeholder
    static ref UNSAFE_EQUALS: Regex =
        Regex::new(r"=\s*(?:[^\s?$]|$)").expect("unsafe equals pattern is valid");
}

/// Argument accepted by [`super::Query::where_clause`].
///
/// Maps become ANDed equality predicates; raw strings must bind every value through
/// `?` or `$N` placeholders.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum WhereClause {
    /// Adds nothing.
    #[default]
    Empty,
    Map(Vec<(String, RowValues)>),
    Raw {
        sql: String,
        params: Vec<RowValues>,
    },
}

impl WhereClause {
    /// A raw fragment and the values for its placeholders.
    pub fn raw(sql: impl Into<String>, params: Vec<RowValues>) -> Self {
        WhereClause::Raw {
            sql: sql.into(),
            params,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            WhereClause::Empty => true,
            WhereClause::Map(entries) => entries.is_empty(),
            WhereClause::Raw { sql, .. } => sql.trim().is_empty(),
        }
    }
}

/// Reject fragments that compare against an inlined value instead of a placeholder.
///
/// # Errors
/// Returns `PgSteadyError::UnsafeWhereClause` carrying the fragment.
pub(crate) fn check_placeholders_only(fragment: &str) -> Result<(), PgSteadyError> {
    if UNSAFE_EQUALS.is_match(fragment) {
        return Err(PgSteadyError::UnsafeWhereClause(fragment.to_string()));
    }
    Ok(())
}

impl From<&str> for WhereClause {
    fn from(sql: &str) -> Self {
        WhereClause::raw(sql, Vec::new())
    }
}

impl From<String> for WhereClause {
    fn from(sql: String) -> Self {
        WhereClause::raw(sql, Vec::new())
    }
}

impl<S: Into<String>> From<(S, Vec<RowValues>)> for WhereClause {
    fn from((sql, params): (S, Vec<RowValues>)) -> Self {
        WhereClause::raw(sql, params)
    }
}

impl<K: Into<String>, V: Into<RowValues>> From<Vec<(K, V)>> for WhereClause {
    fn from(entries: Vec<(K, V)>) -> Self {
        WhereClause::Map(entries.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl<K: Into<String>, V: Into<RowValues>> From<HashMap<K, V>> for WhereClause {
    fn from(entries: HashMap<K, V>) -> Self {
        WhereClause::Map(entries.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl<K: Into<String>, V: Into<RowValues>> From<BTreeMap<K, V>> for WhereClause {
    fn from(entries: BTreeMap<K, V>) -> Self {
        WhereClause::Map(entries.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl<T: Into<WhereClause>> From<Option<T>> for WhereClause {
    fn from(clause: Option<T>) -> Self {
        clause.map_or(WhereClause::Empty, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_pass() {
        for fragment in [
            "age > ?",
            "name = ?",
            "name = $1",
            "a >= $2 AND b <= ?",
            "deleted_at IS NULL",
            "name=?",
        ] {
            assert!(check_placeholders_only(fragment).is_ok(), "{fragment}");
        }
    }

    #[test]
    fn inlined_values_rejected() {
        for fragment in ["name = 'bob'", "id=1", "a = b", "trailing =", "x != 'y'"] {
            assert!(
                matches!(
                    check_placeholders_only(fragment),
                    Err(PgSteadyError::UnsafeWhereClause(_))
                ),
                "{fragment}"
            );
        }
    }

    #[test]
    fn conversions() {
        assert!(WhereClause::from(None::<&str>).is_empty());
        assert!(WhereClause::from(Vec::<(String, i64)>::new()).is_empty());
        assert!(WhereClause::from("  ").is_empty());
        assert_eq!(
            WhereClause::from(("a = ?", vec![RowValues::Int(1)])),
            WhereClause::raw("a = ?", vec![RowValues::Int(1)])
        );
    }
}
