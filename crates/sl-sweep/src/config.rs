//! Sweep configuration and its layered loading.

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Json, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

use sl_types::{config_error, validation_error, DispatcherConfig, SlResult};

use crate::optimizer::Optimizer;
use crate::search::{GridSearch, RandomSearch, SearchSpace};

/// Environment prefix for configuration overrides, e.g.
/// `SWEEPLINE_DISPATCHER__N_JOBS=8`.
pub const ENV_PREFIX: &str = "SWEEPLINE_";

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];

/// Which reference optimizer produces trials.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    #[default]
    Random,
    Grid,
}

/// Execution backend selection, resolved through the backend registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Registry tag, e.g. `command`.
    pub kind: String,
    /// Backend-specific parameters.
    #[serde(default)]
    pub params: Value,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: "command".to_string(),
            params: Value::Object(Default::default()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Log levels for the sweep and, separately, for optimizer chatter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub optimizer_level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            optimizer_level: "warn".to_string(),
            format: LogFormat::default(),
        }
    }
}

/// Everything the `sweepline` binary needs to run a sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub n_trials: usize,
    pub seed: u64,
    pub strategy: Strategy,
    /// Points per continuous dimension for grid search.
    pub grid_steps: usize,
    pub search_space: SearchSpace,
    /// Configuration every trial is diffed against.
    pub baseline: Value,
    pub dispatcher: DispatcherConfig,
    pub backend: BackendConfig,
    pub logging: LoggingConfig,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            n_trials: 10,
            seed: 0,
            strategy: Strategy::default(),
            grid_steps: 5,
            search_space: SearchSpace::default(),
            baseline: Value::Object(Default::default()),
            dispatcher: DispatcherConfig::default(),
            backend: BackendConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl SweepConfig {
    /// Defaults, then the file at `path` (YAML, or JSON by extension), then
    /// `SWEEPLINE_*` environment variables.
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::new().merge(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            let is_json = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("json"));
            figment = if is_json {
                figment.merge(Json::file(path))
            } else {
                figment.merge(Yaml::file(path))
            };
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Load and validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            if !path.exists() {
                anyhow::bail!("config file {} does not exist", path.display());
            }
        }
        Self::from_figment(Self::figment(path))
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Self = figment
            .extract()
            .context("Failed to extract sweep configuration")?;
        config.validate().context("Invalid sweep configuration")?;
        Ok(config)
    }

    pub fn validate(&self) -> SlResult<()> {
        if self.n_trials == 0 {
            return Err(validation_error!("n_trials must be at least 1"));
        }
        if !self.baseline.is_object() {
            return Err(config_error!("baseline must be a mapping"));
        }
        self.search_space.validate()?;
        self.dispatcher.validate()?;

        if self.search_space.is_multi_fidelity() && self.dispatcher.budget_variable.is_none() {
            return Err(validation_error!(
                "search_space.budget is set but dispatcher.budget_variable is not; \
                 a multi-fidelity sweep needs the name of the budget parameter"
            ));
        }
        if self.strategy == Strategy::Grid && self.grid_steps < 2 {
            return Err(validation_error!("grid_steps must be at least 2"));
        }
        if self.backend.kind.trim().is_empty() {
            return Err(config_error!("backend.kind must name a registered backend"));
        }
        for (field, level) in [
            ("logging.level", &self.logging.level),
            ("logging.optimizer_level", &self.logging.optimizer_level),
        ] {
            if !LOG_LEVELS.contains(&level.to_ascii_lowercase().as_str()) {
                return Err(config_error!(
                    "invalid {field}: {level}. Must be one of: {}",
                    LOG_LEVELS.join(", ")
                ));
            }
        }
        Ok(())
    }

    /// Build the configured reference optimizer.
    pub fn optimizer(&self) -> Box<dyn Optimizer> {
        match self.strategy {
            Strategy::Random => Box::new(RandomSearch::new(self.search_space.clone(), self.seed)),
            Strategy::Grid => Box::new(
                GridSearch::new(&self.search_space, self.grid_steps).with_seed(self.seed as i64),
            ),
        }
    }
}
