//! Trials requested by an optimizer and the results reported back to it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::errors::{DiffError, SlResult};

/// Parameter name to value. Names may be dotted (`model.lr`) or index into a
/// baseline sequence (`model.layers.0`), and values may themselves be nested.
pub type Configuration = Map<String, Value>;

/// Key under which a crashed result stores the error message.
pub const INFO_ERROR: &str = "error";
/// Key under which a crashed result stores the captured traceback.
pub const INFO_TRACEBACK: &str = "traceback";

/// A request to evaluate one configuration.
///
/// Immutable once submitted to a dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    pub id: Uuid,
    pub configuration: Configuration,
    /// Problem instance identifier, empty when the optimizer has none.
    #[serde(default)]
    pub instance: String,
    #[serde(default)]
    pub seed: i64,
    /// Fidelity level for multi-fidelity optimizers.
    #[serde(default)]
    pub budget: Option<f64>,
}

impl Trial {
    pub fn new(configuration: Configuration) -> Self {
        Self {
            id: Uuid::new_v4(),
            configuration,
            instance: String::new(),
            seed: 0,
            budget: None,
        }
    }

    /// Build a trial from a JSON object.
    pub fn from_value(value: Value) -> SlResult<Self> {
        match value {
            Value::Object(configuration) => Ok(Self::new(configuration)),
            other => Err(DiffError::NotAMapping {
                kind: value_kind(&other).to_string(),
            }
            .into()),
        }
    }

    pub fn with_instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = instance.into();
        self
    }

    pub fn with_seed(mut self, seed: i64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_budget(mut self, budget: f64) -> Self {
        self.budget = Some(budget);
        self
    }
}

/// Outcome category of a finished trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrialStatus {
    Success,
    Crashed,
}

/// Result of a single trial, produced exactly once per submitted [`Trial`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    pub trial_id: Uuid,
    /// Objective value. Crashed trials carry the configured crash cost.
    pub cost: f64,
    pub status: TrialStatus,
    /// Start of execution as reported by the backend.
    pub start_time: DateTime<Utc>,
    /// End of execution as reported by the backend.
    pub end_time: DateTime<Utc>,
    pub additional_info: BTreeMap<String, String>,
}

impl TrialResult {
    pub fn is_success(&self) -> bool {
        self.status == TrialStatus::Success
    }

    /// Wall-clock runtime in seconds, never negative.
    pub fn duration_seconds(&self) -> f64 {
        let millis = (self.end_time - self.start_time).num_milliseconds().max(0);
        millis as f64 / 1000.0
    }

    pub fn error(&self) -> Option<&str> {
        self.additional_info.get(INFO_ERROR).map(String::as_str)
    }
}

/// Name of a JSON value's kind, as used in error messages.
pub fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "mapping",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    #[test]
    fn trial_builder_chain() {
        let trial = Trial::from_value(json!({"x": 1}))
            .unwrap()
            .with_instance("branin")
            .with_seed(7)
            .with_budget(5.0);

        assert_eq!(trial.configuration.get("x"), Some(&json!(1)));
        assert_eq!(trial.instance, "branin");
        assert_eq!(trial.seed, 7);
        assert_eq!(trial.budget, Some(5.0));
    }

    #[test]
    fn trial_from_non_mapping_is_rejected() {
        let err = Trial::from_value(json!([1, 2])).unwrap_err();
        assert!(err.to_string().contains("sequence"));
    }

    #[test]
    fn duration_is_clamped_at_zero() {
        let now = Utc::now();
        let result = TrialResult {
            trial_id: Uuid::new_v4(),
            cost: 1.0,
            status: TrialStatus::Success,
            start_time: now,
            end_time: now - Duration::seconds(3),
            additional_info: BTreeMap::new(),
        };
        assert_eq!(result.duration_seconds(), 0.0);
    }

    #[test]
    fn crashed_result_exposes_error() {
        let now = Utc::now();
        let mut info = BTreeMap::new();
        info.insert(INFO_ERROR.to_string(), "boom".to_string());
        let result = TrialResult {
            trial_id: Uuid::new_v4(),
            cost: f64::MAX,
            status: TrialStatus::Crashed,
            start_time: now,
            end_time: now + Duration::milliseconds(1500),
            additional_info: info,
        };
        assert!(!result.is_success());
        assert_eq!(result.error(), Some("boom"));
        assert_eq!(result.duration_seconds(), 1.5);
    }
}
