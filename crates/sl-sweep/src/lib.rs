//! # sl-sweep
//!
//! Sweep driver for Sweepline: the ask/tell [`Optimizer`] interface, grid and
//! random reference optimizers, incumbent tracking, layered configuration
//! loading, and logging setup for the `sweepline` binary.

pub mod config;
pub mod logging;
pub mod optimizer;
pub mod search;
pub mod status;
pub mod sweep;

pub use config::{BackendConfig, LogFormat, LoggingConfig, Strategy, SweepConfig};
pub use logging::init_logging;
pub use optimizer::{Optimizer, OPTIMIZER_LOG_TARGET};
pub use search::{BudgetRange, GridSearch, ParameterDef, ParameterKind, RandomSearch, SearchSpace};
pub use status::{Incumbent, SweepState, SweepStatus};
pub use sweep::{Sweep, SweepReport};
