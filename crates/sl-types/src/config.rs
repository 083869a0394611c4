//! Dispatcher configuration surface.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::SlResult;
use crate::overrides::Override;
use crate::validation_error;

/// Remote status queries more frequent than this risk scheduler throttling.
pub const REFRESH_INTERVAL_FLOOR: Duration = Duration::from_secs(15);

/// How outstanding jobs are reported while the dispatcher waits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressMode {
    /// Plain polling, no progress output.
    None,
    /// One log line per launched job plus state transitions.
    Basic,
    /// Live per-job rows in the terminal.
    #[default]
    Rich,
}

/// Construction-time settings for the trial dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Maximum number of concurrently running jobs.
    pub n_jobs: usize,

    /// Name of the fidelity parameter, e.g. `epochs`. When set, every trial
    /// carrying a budget gets an extra `budget_variable=<budget>` override.
    pub budget_variable: Option<String>,

    /// Local `done()` polling period.
    #[serde(with = "duration_secs")]
    pub poll_interval: Duration,

    /// Minimum period between remote scheduler status queries.
    #[serde(with = "duration_secs")]
    pub refresh_interval: Duration,

    /// Cost reported for crashed trials.
    pub crash_cost: f64,

    pub progress: ProgressMode,

    /// `key=value` overrides appended to every launched job.
    pub global_overrides: Vec<String>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            n_jobs: 1,
            budget_variable: None,
            poll_interval: Duration::from_secs(1),
            refresh_interval: REFRESH_INTERVAL_FLOOR,
            crash_cost: f64::MAX,
            progress: ProgressMode::default(),
            global_overrides: Vec::new(),
        }
    }
}

impl DispatcherConfig {
    pub fn new(n_jobs: usize) -> Self {
        Self {
            n_jobs,
            ..Default::default()
        }
    }

    pub fn with_budget_variable(mut self, name: impl Into<String>) -> Self {
        self.budget_variable = Some(name.into());
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    pub fn with_crash_cost(mut self, cost: f64) -> Self {
        self.crash_cost = cost;
        self
    }

    pub fn with_progress(mut self, mode: ProgressMode) -> Self {
        self.progress = mode;
        self
    }

    pub fn with_global_override(mut self, raw: impl Into<String>) -> Self {
        self.global_overrides.push(raw.into());
        self
    }

    /// Whether remote status refreshes would be issued more often than the
    /// scheduler-friendly floor. This is a warning condition, not an error.
    pub fn refresh_below_floor(&self) -> bool {
        self.refresh_interval < REFRESH_INTERVAL_FLOOR
    }

    /// Parsed form of [`Self::global_overrides`].
    pub fn parsed_global_overrides(&self) -> SlResult<Vec<Override>> {
        self.global_overrides
            .iter()
            .map(|raw| Override::parse(raw))
            .collect()
    }

    pub fn validate(&self) -> SlResult<()> {
        if self.n_jobs == 0 {
            return Err(validation_error!("n_jobs must be at least 1"));
        }
        if self.poll_interval.is_zero() {
            return Err(validation_error!("poll_interval must be positive"));
        }
        if self.refresh_interval.is_zero() {
            return Err(validation_error!("refresh_interval must be positive"));
        }
        if self.crash_cost.is_nan() {
            return Err(validation_error!("crash_cost must not be NaN"));
        }
        if let Some(name) = &self.budget_variable {
            if name.trim().is_empty() {
                return Err(validation_error!("budget_variable must not be empty"));
            }
        }
        self.parsed_global_overrides()?;
        Ok(())
    }
}

/// Serialize a [`Duration`] as fractional seconds.
pub mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = DispatcherConfig::default();
        assert_eq!(config.n_jobs, 1);
        assert_eq!(config.progress, ProgressMode::Rich);
        assert!(!config.refresh_below_floor());
        config.validate().unwrap();
    }

    #[test]
    fn zero_jobs_rejected() {
        let err = DispatcherConfig::new(0).validate().unwrap_err();
        assert!(err.to_string().contains("n_jobs"));
    }

    #[test]
    fn short_refresh_is_only_a_warning() {
        let config = DispatcherConfig::new(2).with_refresh_interval(Duration::from_secs(1));
        assert!(config.refresh_below_floor());
        config.validate().unwrap();
    }

    #[test]
    fn malformed_global_override_rejected() {
        let config = DispatcherConfig::new(2).with_global_override("hydra.verbose");
        assert!(config.validate().is_err());

        let config = DispatcherConfig::new(2).with_global_override("hydra.verbose=true");
        assert_eq!(config.parsed_global_overrides().unwrap()[0].value, "true");
    }

    #[test]
    fn durations_deserialize_from_seconds() {
        let config: DispatcherConfig = serde_json::from_value(serde_json::json!({
            "n_jobs": 4,
            "poll_interval": 0.5,
            "refresh_interval": 30,
            "progress": "basic",
            "budget_variable": "epochs"
        }))
        .unwrap();

        assert_eq!(config.n_jobs, 4);
        assert_eq!(config.poll_interval, Duration::from_millis(500));
        assert_eq!(config.refresh_interval, Duration::from_secs(30));
        assert_eq!(config.progress, ProgressMode::Basic);
        assert_eq!(config.budget_variable.as_deref(), Some("epochs"));
        assert_eq!(config.crash_cost, f64::MAX);
    }
}
