//! Minimal override computation between a trial configuration and the
//! baseline.

use serde_json::{Map, Value};
use std::sync::Arc;

use sl_types::{value_kind, Configuration, DiffError, Override, OverrideSet, SlResult, Trial};

/// Flattened configuration: dotted key to leaf value, in insertion order.
pub type FlatConfig = Map<String, Value>;

/// Flatten nested mappings into dotted keys.
///
/// With `expand_sequences`, sequence elements also become index-suffixed
/// keys (`a.b.0`); otherwise sequences are kept as leaf values. Empty
/// mappings and empty sequences are leaves.
pub fn flatten(config: &Map<String, Value>, expand_sequences: bool) -> FlatConfig {
    let mut out = FlatConfig::new();
    for (key, value) in config {
        flatten_into(key.clone(), value, expand_sequences, &mut out);
    }
    out
}

fn flatten_into(key: String, value: &Value, expand_sequences: bool, out: &mut FlatConfig) {
    match value {
        Value::Object(inner) if !inner.is_empty() => {
            for (k, v) in inner {
                flatten_into(format!("{key}.{k}"), v, expand_sequences, out);
            }
        }
        Value::Array(items) if expand_sequences && !items.is_empty() => {
            for (i, v) in items.iter().enumerate() {
                flatten_into(format!("{key}.{i}"), v, expand_sequences, out);
            }
        }
        leaf => {
            out.insert(key, leaf.clone());
        }
    }
}

/// Equality with integer/float unification, so `1` and `1.0` compare equal.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| values_equal(x, y)))
        }
        _ => a == b,
    }
}

/// Render a value for the right-hand side of `key=value`.
pub fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        composite => composite.to_string(),
    }
}

/// Integral budgets render without a fractional part (`epochs=5`).
pub fn format_budget(budget: f64) -> String {
    if budget.is_finite() && budget.fract() == 0.0 && budget.abs() < 1e15 {
        format!("{}", budget as i64)
    } else {
        format!("{budget}")
    }
}

/// Computes the override set that turns the baseline into a trial's
/// configuration.
///
/// The baseline is flattened once at construction and shared read-only;
/// cloning a differ is cheap.
#[derive(Debug, Clone)]
pub struct ConfigDiffer {
    baseline: Arc<FlatConfig>,
    budget_variable: Option<String>,
}

impl ConfigDiffer {
    /// `baseline` must be a mapping.
    pub fn new(baseline: &Value, budget_variable: Option<String>) -> SlResult<Self> {
        let Value::Object(map) = baseline else {
            return Err(DiffError::NotAMapping {
                kind: value_kind(baseline).to_string(),
            }
            .into());
        };
        Ok(Self {
            baseline: Arc::new(flatten(map, false)),
            budget_variable,
        })
    }

    pub fn baseline(&self) -> &FlatConfig {
        &self.baseline
    }

    pub fn budget_variable(&self) -> Option<&str> {
        self.budget_variable.as_deref()
    }

    /// Overrides for a trial: the configuration diff, then the budget entry
    /// when a budget variable is configured and the trial carries a budget.
    pub fn diff(&self, trial: &Trial) -> Result<OverrideSet, DiffError> {
        let mut overrides = self.diff_configuration(&trial.configuration)?;
        if let (Some(name), Some(budget)) = (&self.budget_variable, trial.budget) {
            overrides.push(Override::new(name.clone(), format_budget(budget)));
        }
        Ok(overrides)
    }

    /// Keys whose resolved baseline value differs from the configuration's,
    /// in the configuration's insertion order.
    pub fn diff_configuration(
        &self,
        configuration: &Configuration,
    ) -> Result<OverrideSet, DiffError> {
        let flat = flatten(configuration, true);
        let mut overrides = OverrideSet::new();
        for (key, value) in &flat {
            let base = self.resolve(key)?;
            if !values_equal(value, base) {
                overrides.push(Override::new(key.clone(), format_value(value)));
            }
        }
        Ok(overrides)
    }

    /// Look up a flattened key in the baseline.
    ///
    /// Keys absent verbatim are resolved from their longest baseline prefix:
    /// the remaining segments index into sequences (numeric segments) and
    /// into mappings nested inside them.
    pub fn resolve(&self, key: &str) -> Result<&Value, DiffError> {
        if let Some(value) = self.baseline.get(key) {
            return Ok(value);
        }

        let unknown = || DiffError::UnknownKey {
            key: key.to_string(),
        };
        let (mut current, mut parent_len) = key
            .rmatch_indices('.')
            .find_map(|(at, _)| self.baseline.get(&key[..at]).map(|v| (v, at)))
            .ok_or_else(unknown)?;

        for segment in key[parent_len + 1..].split('.') {
            let parent = &key[..parent_len];
            current = match (current, segment.parse::<usize>()) {
                (Value::Array(items), Ok(index)) => {
                    items.get(index).ok_or_else(|| DiffError::IndexOutOfRange {
                        key: key.to_string(),
                        parent: parent.to_string(),
                        index,
                        len: items.len(),
                    })?
                }
                (Value::Object(map), _) => map.get(segment).ok_or_else(unknown)?,
                (Value::Array(_), Err(_)) => return Err(unknown()),
                (_, Ok(_)) => {
                    return Err(DiffError::NotASequence {
                        key: key.to_string(),
                        parent: parent.to_string(),
                    })
                }
                (_, Err(_)) => return Err(unknown()),
            };
            parent_len += 1 + segment.len();
        }
        Ok(current)
    }
}
