// Copyright (c) 2025 - Cowboy AI, Inc.
//! Ordered variable map handed to boot configuration compilers

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;

use crate::errors::{CompileError, CompileResult};

/// Separator of list-valued variables (addresses, peers, endpoints)
pub const LIST_SEPARATOR: char = ',';

/// Per-node variables, ordered by key
///
/// Ordering makes serialization byte-identical across re-renders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Variables(BTreeMap<String, String>);

impl Variables {
    /// Empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a variable, replacing any previous value
    pub fn insert(&mut self, key: impl Into<String>, value: impl Display) {
        self.0.insert(key.into(), value.to_string());
    }

    /// Set a list-valued variable
    pub fn insert_list<I, T>(&mut self, key: impl Into<String>, values: I)
    where
        I: IntoIterator<Item = T>,
        T: Display,
    {
        let joined = values
            .into_iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(&LIST_SEPARATOR.to_string());
        self.0.insert(key.into(), joined);
    }

    /// Value of a variable
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Value of a variable the caller cannot do without
    pub fn require(&self, key: &str) -> CompileResult<&str> {
        self.get(key)
            .ok_or_else(|| CompileError::MissingVariable(key.to_string()))
    }

    /// Items of a list-valued variable (empty when unset or blank)
    pub fn list(&self, key: &str) -> Vec<&str> {
        match self.get(key) {
            Some(value) if !value.is_empty() => value.split(LIST_SEPARATOR).collect(),
            _ => Vec::new(),
        }
    }

    /// Parse a required variable
    pub fn parse<T>(&self, key: &str) -> CompileResult<T>
    where
        T: std::str::FromStr,
        T::Err: Display,
    {
        self.require(key)?
            .parse()
            .map_err(|e: T::Err| CompileError::InvalidVariable {
                key: key.to_string(),
                reason: e.to_string(),
            })
    }

    /// Whether a variable is set
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Number of variables
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no variable is set
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Underlying map
    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.0
    }
}

impl FromIterator<(String, String)> for Variables {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_round_trip() {
        let mut variables = Variables::new();
        variables.insert_list("peers", ["a", "b"]);
        variables.insert_list("none", Vec::<String>::new());
        assert_eq!(variables.get("peers"), Some("a,b"));
        assert_eq!(variables.list("peers"), vec!["a", "b"]);
        assert!(variables.list("none").is_empty());
        assert!(variables.list("absent").is_empty());
    }

    #[test]
    fn test_require_and_parse() {
        let mut variables = Variables::new();
        variables.insert("port", 2379);
        variables.insert("bad", "x");
        assert_eq!(variables.parse::<u16>("port"), Ok(2379));
        assert_eq!(
            variables.require("missing"),
            Err(CompileError::MissingVariable("missing".to_string()))
        );
        assert!(matches!(
            variables.parse::<u16>("bad"),
            Err(CompileError::InvalidVariable { .. })
        ));
    }

    #[test]
    fn test_serializes_in_key_order() {
        let mut variables = Variables::new();
        variables.insert("zeta", 1);
        variables.insert("alpha", 2);
        assert_eq!(
            serde_json::to_string(&variables).unwrap(),
            r#"{"alpha":"2","zeta":"1"}"#
        );
    }
}
