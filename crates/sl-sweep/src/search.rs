//! Search space definitions and two reference trial producers.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use sl_types::{validation_error, Configuration, SlResult, Trial, TrialResult};

use crate::optimizer::Optimizer;

/// A single parameter dimension in the search space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDef {
    /// Flattened parameter name, e.g. `model.lr` or `model.layers.0`.
    pub name: String,
    #[serde(flatten)]
    pub kind: ParameterKind,
}

/// Describes how a parameter is sampled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParameterKind {
    /// Continuous uniform range [low, high].
    FloatRange { low: f64, high: f64 },
    /// Integer range [low, high] inclusive.
    IntRange { low: i64, high: i64 },
    /// Log-uniform range (sampled in log-space then exponentiated).
    LogUniform { low: f64, high: f64 },
    /// Categorical choices.
    Choice { values: Vec<Value> },
}

/// Fidelity range of a multi-fidelity sweep.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BudgetRange {
    pub min_budget: f64,
    pub max_budget: f64,
    /// Ratio between consecutive budget levels.
    #[serde(default = "default_eta")]
    pub eta: f64,
}

fn default_eta() -> f64 {
    3.0
}

impl BudgetRange {
    /// Budget levels from `max_budget` downwards by factors of `eta`,
    /// returned in increasing order.
    pub fn levels(&self) -> Vec<f64> {
        let mut levels = vec![self.max_budget];
        let mut next = self.max_budget / self.eta;
        while next >= self.min_budget && levels.len() < 32 {
            levels.push(next);
            next /= self.eta;
        }
        levels.reverse();
        levels
    }
}

/// The full search space: an ordered list of parameter definitions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchSpace {
    #[serde(default)]
    pub parameters: Vec<ParameterDef>,
    /// Present only for multi-fidelity sweeps.
    #[serde(default)]
    pub budget: Option<BudgetRange>,
}

impl SearchSpace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_float(mut self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.parameters.push(ParameterDef {
            name: name.into(),
            kind: ParameterKind::FloatRange { low, high },
        });
        self
    }

    pub fn add_int(mut self, name: impl Into<String>, low: i64, high: i64) -> Self {
        self.parameters.push(ParameterDef {
            name: name.into(),
            kind: ParameterKind::IntRange { low, high },
        });
        self
    }

    pub fn add_log_uniform(mut self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.parameters.push(ParameterDef {
            name: name.into(),
            kind: ParameterKind::LogUniform { low, high },
        });
        self
    }

    pub fn add_choice(mut self, name: impl Into<String>, values: Vec<Value>) -> Self {
        self.parameters.push(ParameterDef {
            name: name.into(),
            kind: ParameterKind::Choice { values },
        });
        self
    }

    pub fn with_budget(mut self, min_budget: f64, max_budget: f64) -> Self {
        self.budget = Some(BudgetRange {
            min_budget,
            max_budget,
            eta: default_eta(),
        });
        self
    }

    pub fn is_multi_fidelity(&self) -> bool {
        self.budget.is_some()
    }

    /// Total number of grid points (returns `None` if any parameter is
    /// continuous without a natural grid).
    pub fn grid_size(&self) -> Option<usize> {
        let mut total: usize = 1;
        for param in &self.parameters {
            let dim_size = match &param.kind {
                ParameterKind::IntRange { low, high } => usize::try_from(high - low + 1).ok()?,
                ParameterKind::Choice { values } => values.len(),
                _ => return None,
            };
            total = total.checked_mul(dim_size)?;
        }
        Some(total)
    }

    pub fn validate(&self) -> SlResult<()> {
        for param in &self.parameters {
            if param.name.trim().is_empty() {
                return Err(validation_error!("search space parameter without a name"));
            }
            let ok = match &param.kind {
                ParameterKind::FloatRange { low, high } => low.is_finite() && high.is_finite() && low <= high,
                ParameterKind::IntRange { low, high } => low <= high,
                ParameterKind::LogUniform { low, high } => *low > 0.0 && low <= high,
                ParameterKind::Choice { values } => !values.is_empty(),
            };
            if !ok {
                return Err(validation_error!(
                    "invalid range for parameter {}: {:?}",
                    param.name,
                    param.kind
                ));
            }
        }
        if let Some(budget) = &self.budget {
            if !(budget.min_budget > 0.0 && budget.min_budget <= budget.max_budget && budget.eta > 1.0)
            {
                return Err(validation_error!(
                    "budget range needs 0 < min_budget <= max_budget and eta > 1, got {budget:?}"
                ));
            }
        }
        Ok(())
    }
}

fn float_value(v: f64) -> Value {
    serde_json::Number::from_f64(v)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

// ---- Grid search ----

/// Exhaustive grid search over the search space. Continuous dimensions are
/// split into `float_steps` evenly spaced points. Multi-fidelity spaces run
/// every point at the maximum budget.
#[derive(Debug, Clone)]
pub struct GridSearch {
    combos: Vec<Configuration>,
    cursor: usize,
    budget: Option<f64>,
    seed: i64,
}

impl GridSearch {
    pub fn new(space: &SearchSpace, float_steps: usize) -> Self {
        Self {
            combos: Self::build_grid(space, float_steps),
            cursor: 0,
            budget: space.budget.map(|b| b.max_budget),
            seed: 0,
        }
    }

    pub fn with_seed(mut self, seed: i64) -> Self {
        self.seed = seed;
        self
    }

    pub fn len(&self) -> usize {
        self.combos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.combos.is_empty()
    }

    fn build_grid(space: &SearchSpace, float_steps: usize) -> Vec<Configuration> {
        let mut axes: Vec<(&str, Vec<Value>)> = Vec::new();

        for param in &space.parameters {
            let values: Vec<Value> = match &param.kind {
                ParameterKind::FloatRange { low, high } => {
                    let steps = float_steps.max(2);
                    (0..steps)
                        .map(|i| {
                            let t = i as f64 / (steps - 1) as f64;
                            float_value(low + t * (high - low))
                        })
                        .collect()
                }
                ParameterKind::IntRange { low, high } => {
                    (*low..=*high).map(Value::from).collect()
                }
                ParameterKind::LogUniform { low, high } => {
                    let steps = float_steps.max(2);
                    let log_low = low.ln();
                    let log_high = high.ln();
                    (0..steps)
                        .map(|i| {
                            let t = i as f64 / (steps - 1) as f64;
                            float_value((log_low + t * (log_high - log_low)).exp())
                        })
                        .collect()
                }
                ParameterKind::Choice { values } => values.clone(),
            };
            axes.push((param.name.as_str(), values));
        }

        // Cartesian product
        let mut result: Vec<Configuration> = vec![Configuration::new()];
        for (name, values) in &axes {
            let mut next = Vec::with_capacity(result.len() * values.len());
            for existing in &result {
                for value in values {
                    let mut combo = existing.clone();
                    combo.insert(name.to_string(), value.clone());
                    next.push(combo);
                }
            }
            result = next;
        }

        result
    }
}

impl Optimizer for GridSearch {
    fn name(&self) -> &str {
        "grid"
    }

    fn ask(&mut self) -> Option<Trial> {
        let configuration = self.combos.get(self.cursor)?.clone();
        self.cursor += 1;
        let trial = Trial::new(configuration).with_seed(self.seed);
        Some(match self.budget {
            Some(b) => trial.with_budget(b),
            None => trial,
        })
    }

    fn tell(&mut self, _trial: &Trial, _result: &TrialResult) {}
}

// ---- Random search ----

/// Independent random sampling across the search space. Multi-fidelity
/// spaces cycle through the budget levels, lowest first.
#[derive(Debug, Clone)]
pub struct RandomSearch {
    space: SearchSpace,
    rng: StdRng,
    budgets: Vec<f64>,
    issued: usize,
    seed: i64,
}

impl RandomSearch {
    pub fn new(space: SearchSpace, seed: u64) -> Self {
        let budgets = space.budget.map(|b| b.levels()).unwrap_or_default();
        Self {
            space,
            rng: StdRng::seed_from_u64(seed),
            budgets,
            issued: 0,
            seed: seed as i64,
        }
    }

    fn sample_one(&mut self) -> Configuration {
        let mut params = Configuration::new();

        for param in &self.space.parameters {
            let value = match &param.kind {
                ParameterKind::FloatRange { low, high } => {
                    float_value(self.rng.random_range(*low..=*high))
                }
                ParameterKind::IntRange { low, high } => {
                    Value::from(self.rng.random_range(*low..=*high))
                }
                ParameterKind::LogUniform { low, high } => {
                    let log_val: f64 = self.rng.random_range(low.ln()..=high.ln());
                    float_value(log_val.exp())
                }
                ParameterKind::Choice { values } => {
                    let idx = self.rng.random_range(0..values.len());
                    values[idx].clone()
                }
            };
            params.insert(param.name.clone(), value);
        }

        params
    }
}

impl Optimizer for RandomSearch {
    fn name(&self) -> &str {
        "random"
    }

    fn ask(&mut self) -> Option<Trial> {
        let trial = Trial::new(self.sample_one()).with_seed(self.seed);
        let budget = (!self.budgets.is_empty()).then(|| self.budgets[self.issued % self.budgets.len()]);
        self.issued += 1;
        Some(match budget {
            Some(b) => trial.with_budget(b),
            None => trial,
        })
    }

    fn tell(&mut self, _trial: &Trial, _result: &TrialResult) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_space() -> SearchSpace {
        SearchSpace::new()
            .add_int("model.depth", 2, 6)
            .add_float("optimizer.momentum", 0.5, 1.0)
    }

    #[test]
    fn grid_search_produces_correct_count() {
        let space = SearchSpace::new()
            .add_int("a", 1, 3) // 3 values
            .add_int("b", 10, 11); // 2 values
        assert_eq!(space.grid_size(), Some(6));

        let mut gs = GridSearch::new(&space, 5);
        let mut n = 0;
        while gs.ask().is_some() {
            n += 1;
        }
        assert_eq!(n, 6);
    }

    #[test]
    fn grid_search_uses_max_budget() {
        let space = SearchSpace::new().add_int("x", 1, 2).with_budget(1.0, 27.0);
        let mut gs = GridSearch::new(&space, 5);
        assert_eq!(gs.ask().unwrap().budget, Some(27.0));
    }

    #[test]
    fn grid_float_axis_includes_endpoints() {
        let space = SearchSpace::new().add_float("lr", 0.0, 1.0);
        let mut gs = GridSearch::new(&space, 3);
        let values: Vec<Value> = std::iter::from_fn(|| gs.ask())
            .map(|t| t.configuration["lr"].clone())
            .collect();
        assert_eq!(values, vec![json!(0.0), json!(0.5), json!(1.0)]);
    }

    #[test]
    fn random_search_respects_bounds() {
        let mut rs = RandomSearch::new(sample_space(), 7);
        for _ in 0..50 {
            let trial = rs.ask().unwrap();
            let depth = trial.configuration["model.depth"].as_i64().unwrap();
            assert!((2..=6).contains(&depth));
            let momentum = trial.configuration["optimizer.momentum"].as_f64().unwrap();
            assert!((0.5..=1.0).contains(&momentum));
            assert_eq!(trial.budget, None);
        }
    }

    #[test]
    fn random_search_is_reproducible() {
        let a: Vec<_> = {
            let mut rs = RandomSearch::new(sample_space(), 42);
            (0..5).map(|_| rs.ask().unwrap().configuration).collect()
        };
        let b: Vec<_> = {
            let mut rs = RandomSearch::new(sample_space(), 42);
            (0..5).map(|_| rs.ask().unwrap().configuration).collect()
        };
        assert_eq!(a, b);
    }

    #[test]
    fn random_search_cycles_budget_levels() {
        let space = sample_space().with_budget(1.0, 9.0);
        let mut rs = RandomSearch::new(space, 0);
        let budgets: Vec<f64> = (0..4).filter_map(|_| rs.ask().unwrap().budget).collect();
        assert_eq!(budgets, vec![1.0, 3.0, 9.0, 1.0]);
    }

    #[test]
    fn choice_and_log_uniform_stay_in_bounds() {
        let space = SearchSpace::new()
            .add_choice("optimizer.name", vec![json!("sgd"), json!("adam")])
            .add_log_uniform("optimizer.lr", 1e-5, 1e-1);
        let mut rs = RandomSearch::new(space, 3);
        for _ in 0..100 {
            let trial = rs.ask().unwrap();
            let name = trial.configuration["optimizer.name"].as_str().unwrap();
            assert!(["sgd", "adam"].contains(&name));
            let lr = trial.configuration["optimizer.lr"].as_f64().unwrap();
            assert!((1e-5..=1e-1).contains(&lr), "lr out of bounds: {lr}");
        }
    }

    #[test]
    fn search_space_from_yaml_shape() {
        let space: SearchSpace = serde_json::from_value(json!({
            "parameters": [
                {"name": "x", "type": "float_range", "low": -5.0, "high": 10.0},
                {"name": "opt", "type": "choice", "values": ["a", "b"]}
            ],
            "budget": {"min_budget": 1.0, "max_budget": 10.0}
        }))
        .unwrap();
        assert_eq!(space.parameters.len(), 2);
        assert_eq!(space.budget.unwrap().eta, 3.0);
        assert!(space.validate().is_ok());
    }

    #[test]
    fn invalid_ranges_are_rejected() {
        assert!(SearchSpace::new().add_int("a", 3, 1).validate().is_err());
        assert!(SearchSpace::new().add_log_uniform("lr", 0.0, 1.0).validate().is_err());
        assert!(SearchSpace::new().add_choice("c", vec![]).validate().is_err());
        assert!(SearchSpace::new().with_budget(0.0, 1.0).validate().is_err());
    }

    #[test]
    fn grid_size_none_for_float_only() {
        let space = SearchSpace::new().add_float("x", 0.0, 1.0);
        assert_eq!(space.grid_size(), None);
    }
}
