//! Progress monitoring for outstanding Sweepline jobs.
//!
//! Provides:
//! - The [`ProgressMonitor`] trait implemented by progress renderers
//! - [`ProgressLoop`], the wait loop that polls `done()` locally and refreshes
//!   the remote scheduler status no more often than the refresh interval
//! - [`LogProgress`] (`basic` mode) and [`BarProgress`] (`rich` mode)

pub mod bars;
pub mod basic;
pub mod monitor;
pub mod throttle;

pub use bars::BarProgress;
pub use basic::LogProgress;
pub use monitor::{monitor_for, ProgressLoop, ProgressMonitor, WatchOptions};
pub use throttle::StatusThrottle;
