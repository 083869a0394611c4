//! `key=value` overrides that parameterize a launched job relative to the
//! baseline configuration.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::SlResult;
use crate::validation_error;

/// Key prefixes that belong to the launcher rather than the user's program.
/// They are still launched but hidden from progress output.
pub const INTERNAL_KEY_PREFIXES: &[&str] = &["hydra.", "sweepline."];

/// A single deviation from the baseline.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Override {
    pub key: String,
    pub value: String,
}

impl Override {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Parse a `key=value` string. The value may itself contain `=`.
    pub fn parse(raw: &str) -> SlResult<Self> {
        match raw.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                Ok(Self::new(key.trim(), value.trim()))
            }
            _ => Err(validation_error!(
                "override must have the form key=value, got {raw:?}"
            )),
        }
    }

    pub fn is_internal(&self) -> bool {
        INTERNAL_KEY_PREFIXES
            .iter()
            .any(|prefix| self.key.starts_with(prefix))
    }
}

impl fmt::Display for Override {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

/// Ordered overrides for one job. Order is insertion order and nothing else.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OverrideSet(Vec<Override>);

impl OverrideSet {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, item: Override) {
        self.0.push(item);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Override> {
        self.0.iter()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|o| o.key == key)
            .map(|o| o.value.as_str())
    }

    /// Overrides rendered as command-line arguments.
    pub fn to_args(&self) -> Vec<String> {
        self.0.iter().map(Override::to_string).collect()
    }

    /// Space-joined rendering with launcher-internal keys removed.
    pub fn display_filtered(&self) -> String {
        self.0
            .iter()
            .filter(|o| !o.is_internal())
            .map(Override::to_string)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for OverrideSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_args().join(" "))
    }
}

impl Extend<Override> for OverrideSet {
    fn extend<T: IntoIterator<Item = Override>>(&mut self, iter: T) {
        self.0.extend(iter);
    }
}

impl FromIterator<Override> for OverrideSet {
    fn from_iter<T: IntoIterator<Item = Override>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a OverrideSet {
    type Item = &'a Override;
    type IntoIter = std::slice::Iter<'a, Override>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_keeps_equals_in_value() {
        let o = Override::parse("db.url=postgres://u@h/db?sslmode=require").unwrap();
        assert_eq!(o.key, "db.url");
        assert_eq!(o.value, "postgres://u@h/db?sslmode=require");
    }

    #[test]
    fn parse_rejects_missing_key() {
        assert!(Override::parse("=3").is_err());
        assert!(Override::parse("no_equals").is_err());
    }

    #[test]
    fn display_filtered_hides_internal_keys() {
        let set: OverrideSet = vec![
            Override::new("x", "1"),
            Override::new("hydra.sweep.dir", "/tmp/run"),
            Override::new("epochs", "5"),
        ]
        .into_iter()
        .collect();

        assert_eq!(set.display_filtered(), "x=1 epochs=5");
        assert_eq!(set.to_string(), "x=1 hydra.sweep.dir=/tmp/run epochs=5");
        assert_eq!(set.get("epochs"), Some("5"));
    }

    #[test]
    fn serializes_as_plain_list() {
        let set: OverrideSet = vec![Override::new("x", "1")].into_iter().collect();
        let json = serde_json::to_value(&set).unwrap();
        assert_eq!(json, serde_json::json!([{"key": "x", "value": "1"}]));
    }
}
