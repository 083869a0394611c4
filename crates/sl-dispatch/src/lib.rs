//! Trial dispatch for Sweepline.
//!
//! Provides:
//! - [`ConfigDiffer`], which turns a trial configuration into the minimal
//!   `key=value` overrides against the baseline
//! - [`TrialDispatcher`], which launches trials on an [`ExecutionBackend`]
//!   with at most `n_jobs` running and returns each result exactly once
//! - Two backends: [`LocalBackend`] (worker threads) and [`CommandBackend`]
//!   (one subprocess per job), selectable by tag through [`BackendRegistry`]

pub mod backend;
pub mod differ;
pub mod dispatcher;
pub mod handle;
pub mod local;
pub mod process;
pub mod record;
pub mod slots;
pub mod translate;

pub use backend::{BackendRegistry, BoxedBackend, ErasedBackend, ExecutionBackend};
pub use differ::{flatten, format_budget, format_value, values_equal, ConfigDiffer, FlatConfig};
pub use dispatcher::{DispatchStats, TrialDispatcher};
pub use handle::{CellHandle, JobCell};
pub use local::{JobContext, LocalBackend, TargetFn};
pub use process::{parse_cost, CommandBackend, CommandSpec, JOB_INDEX_ENV};
pub use record::{JobRecord, RecordPhase};
pub use slots::SlotPool;
pub use translate::{ResultTranslator, INFO_JOB_ID};
