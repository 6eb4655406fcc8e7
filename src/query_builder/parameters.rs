use std::collections::{BTreeMap, HashMap};

use lazy_static::lazy_static;
use regex::Regex;

use super::sanitize::sanitize_column;
use crate::error::PgSteadyError;
use crate::types::RowValues;

lazy_static! {
    static ref SQL_TYPE: Regex =
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_ ]*(?:\(\d+(?:,\s*\d+)?\))?(?:\[\])?$")
            .expect("sql type pattern is valid");
}

/// One bound parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub key: String,
    /// Sanitized, quoted column reference.
    pub column: String,
    /// Placeholder text, `$N`.
    pub index: String,
    /// 1-based position matching `index`.
    pub position: usize,
    pub value: RowValues,
    pub sql_type: Option<String>,
}

impl Parameter {
    /// `column::type` when a type annotation exists, the bare column otherwise.
    #[must_use]
    pub fn typed_column(&self) -> String {
        match &self.sql_type {
            Some(ty) => format!("{}::{ty}", self.column),
            None => self.column.clone(),
        }
    }

    /// `$N::type` when a type annotation exists, the bare placeholder otherwise.
    #[must_use]
    pub fn typed_index(&self) -> String {
        match &self.sql_type {
            Some(ty) => format!("{}::{ty}", self.index),
            None => self.index.clone(),
        }
    }
}

/// Attribute map turned into positional parameters, ordered by key.
///
/// The ordering only depends on the key set, so the same attributes always render the
/// same SQL text and therefore the same statement name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parameters {
    params: Vec<Parameter>,
}

impl Parameters {
    /// Bind `attributes` starting at `$1` with no type annotations.
    ///
    /// # Errors
    /// Returns `PgSteadyError::InvalidIdentifier` for an invalid key or table.
    pub fn bind<I, K, V>(attributes: I, table: Option<&str>) -> Result<Self, PgSteadyError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<RowValues>,
    {
        Self::bind_with(attributes, table, 1, &HashMap::new())
    }

    /// Bind `attributes` with the first placeholder at `$start`, annotating keys found in `types`.
    ///
    /// Duplicate keys collapse to the last value supplied.
    ///
    /// # Errors
    /// Returns `PgSteadyError::InvalidIdentifier` for an invalid key, table or type name.
    pub fn bind_with<I, K, V>(
        attributes: I,
        table: Option<&str>,
        start: usize,
        types: &HashMap<String, String>,
    ) -> Result<Self, PgSteadyError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<RowValues>,
    {
        let sorted: BTreeMap<String, RowValues> = attributes
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();

        let params = sorted
            .into_iter()
            .enumerate()
            .map(|(i, (key, value))| {
                let column = sanitize_column(&key, table)?;
                let sql_type = match types.get(&key) {
                    Some(ty) if SQL_TYPE.is_match(ty) => Some(ty.clone()),
                    Some(ty) => return Err(PgSteadyError::InvalidIdentifier(ty.clone())),
                    None => None,
                };
                let position = start + i;
                Ok(Parameter {
                    key,
                    column,
                    index: format!("${position}"),
                    position,
                    value,
                    sql_type,
                })
            })
            .collect::<Result<Vec<_>, PgSteadyError>>()?;

        Ok(Self { params })
    }

    #[must_use]
    pub fn by_key(&self, key: &str) -> Option<&Parameter> {
        self.params.iter().find(|p| p.key == key)
    }

    #[must_use]
    pub fn by_column(&self, column: &str) -> Option<&Parameter> {
        self.params.iter().find(|p| p.column == column)
    }

    /// Lookup by placeholder text (`"$2"`).
    #[must_use]
    pub fn by_index(&self, index: &str) -> Option<&Parameter> {
        self.params.iter().find(|p| p.index == index)
    }

    #[must_use]
    pub fn keys(&self) -> Vec<&str> {
        self.params.iter().map(|p| p.key.as_str()).collect()
    }

    #[must_use]
    pub fn columns(&self) -> Vec<&str> {
        self.params.iter().map(|p| p.column.as_str()).collect()
    }

    #[must_use]
    pub fn indices(&self) -> Vec<&str> {
        self.params.iter().map(|p| p.index.as_str()).collect()
    }

    /// Placeholders with their type casts, in binding order.
    #[must_use]
    pub fn typed_indices(&self) -> Vec<String> {
        self.params.iter().map(Parameter::typed_index).collect()
    }

    #[must_use]
    pub fn values(&self) -> Vec<RowValues> {
        self.params.iter().map(|p| p.value.clone()).collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Parameter> {
        self.params.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.params.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

impl<'a> IntoIterator for &'a Parameters {
    type Item = &'a Parameter;
    type IntoIter = std::slice::Iter<'a, Parameter>;

    fn into_iter(self) -> Self::IntoIter {
        self.params.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_ignores_input_order() {
        let forward = Parameters::bind(
            vec![("name", RowValues::from("bob")), ("age", 3.into()), ("zip", 9.into())],
            None,
        )
        .unwrap();
        let backward = Parameters::bind(
            vec![("zip", RowValues::from(9)), ("age", 3.into()), ("name", "bob".into())],
            None,
        )
        .unwrap();

        assert_eq!(forward, backward);
        assert_eq!(forward.keys(), vec!["age", "name", "zip"]);
        assert_eq!(forward.indices(), vec!["$1", "$2", "$3"]);
        assert_eq!(forward.columns(), vec!["\"age\"", "\"name\"", "\"zip\""]);
    }

    #[test]
    fn lookups_by_every_field() {
        let params = Parameters::bind(vec![("b", 2), ("a", 1)], Some("t")).unwrap();
        assert_eq!(params.by_key("b").unwrap().index, "$2");
        assert_eq!(params.by_column("\"t\".\"a\"").unwrap().key, "a");
        assert_eq!(params.by_index("$1").unwrap().value, RowValues::Int(1));
        assert!(params.by_key("c").is_none());
        assert_eq!(params.values(), vec![RowValues::Int(1), RowValues::Int(2)]);
    }

    #[test]
    fn typed_variants_and_start_offset() {
        let types = HashMap::from([("payload".to_string(), "jsonb".to_string())]);
        let params =
            Parameters::bind_with(vec![("payload", "{}"), ("label", "x")], None, 4, &types).unwrap();
        let payload = params.by_key("payload").unwrap();
        assert_eq!(payload.index, "$5");
        assert_eq!(payload.typed_index(), "$5::jsonb");
        assert_eq!(payload.typed_column(), "\"payload\"::jsonb");
        assert_eq!(params.by_key("label").unwrap().typed_index(), "$4");
    }

    #[test]
    fn rejects_bad_keys_and_types() {
        assert!(Parameters::bind(vec![("bad key", 1)], None).is_err());
        let types = HashMap::from([("a".to_string(), "int; DROP".to_string())]);
        assert!(Parameters::bind_with(vec![("a", 1)], None, 1, &types).is_err());
    }

    #[test]
    fn duplicate_keys_collapse() {
        let params = Parameters::bind(vec![("a", 1), ("a", 2)], None).unwrap();
        assert_eq!(params.len(), 1);
        assert_eq!(params.by_key("a").unwrap().value, RowValues::Int(2));
    }
}
