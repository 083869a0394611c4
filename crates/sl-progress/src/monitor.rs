//! Progress monitor trait and the rate-limited watch loop.

use std::time::Duration;
use tracing::{debug, trace, warn};

use sl_types::{DispatcherConfig, JobView, OverrideSet, ProgressMode};

use crate::bars::BarProgress;
use crate::basic::LogProgress;
use crate::throttle::StatusThrottle;

/// Renders the state of outstanding jobs.
///
/// Implementations only observe; they never decide when a job is finished.
pub trait ProgressMonitor: Send {
    /// Human-readable monitor name.
    fn name(&self) -> &str;

    /// Called once per job right after the backend accepted it.
    fn on_launch(&mut self, _index: usize, _overrides: &OverrideSet) {}

    /// Update the per-job display from the current handle states.
    fn refresh(&mut self, jobs: &[JobView<'_>]);

    /// Begin rendering. Called every time a watch loop starts; must be
    /// idempotent.
    fn start(&mut self) {}

    /// Stop rendering and release the terminal.
    fn stop(&mut self) {}
}

/// Build the monitor for a configured progress mode.
pub fn monitor_for(mode: ProgressMode) -> Option<Box<dyn ProgressMonitor>> {
    match mode {
        ProgressMode::None => None,
        ProgressMode::Basic => Some(Box::new(LogProgress::new())),
        ProgressMode::Rich => Some(Box::new(BarProgress::new())),
    }
}

/// Timing of one watch loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WatchOptions {
    /// Local `done()` polling period.
    pub poll_interval: Duration,
    /// Exit as soon as any job is done instead of waiting for all of them.
    pub stop_on_first_done: bool,
}

impl WatchOptions {
    pub fn first_done(poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            stop_on_first_done: true,
        }
    }

    pub fn all_done(poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            stop_on_first_done: false,
        }
    }
}

/// A monitor plus the throttle that bounds its remote status queries.
///
/// The throttle outlives individual watch loops so that back-to-back waits
/// cannot add up to more than one remote query per refresh interval.
pub struct ProgressLoop {
    monitor: Box<dyn ProgressMonitor>,
    throttle: StatusThrottle,
    started: bool,
}

impl ProgressLoop {
    pub fn new(monitor: Box<dyn ProgressMonitor>, refresh_interval: Duration) -> Self {
        Self {
            monitor,
            throttle: StatusThrottle::new(refresh_interval),
            started: false,
        }
    }

    /// Build the loop a dispatcher configuration asks for, if any.
    pub fn from_config(config: &DispatcherConfig) -> Option<Self> {
        monitor_for(config.progress).map(|m| Self::new(m, config.refresh_interval))
    }

    pub fn monitor_name(&self) -> &str {
        self.monitor.name()
    }

    pub fn on_launch(&mut self, index: usize, overrides: &OverrideSet) {
        self.monitor.on_launch(index, overrides);
    }

    /// Number of remote status refreshes issued so far.
    pub fn remote_refreshes(&self) -> u64 {
        self.throttle.permitted()
    }

    /// Poll `jobs` until the first (or every) job is done, refreshing the
    /// display on each poll and the remote status only when the throttle
    /// allows. Returns immediately for an empty job list.
    pub async fn watch(&mut self, jobs: &[JobView<'_>], options: WatchOptions) {
        let Some(first) = jobs.first() else {
            return;
        };

        if !self.started {
            self.monitor.start();
            self.started = true;
        }

        loop {
            if self.throttle.ready() {
                debug!(job_id = first.handle.job_id(), "refreshing remote job status");
                if let Err(e) = first.handle.refresh_status().await {
                    warn!(job_id = first.handle.job_id(), error = %e, "remote status refresh failed");
                }
            }

            self.monitor.refresh(jobs);

            let num_done = jobs.iter().filter(|j| j.handle.done()).count();
            trace!(num_done, total = jobs.len(), "polled outstanding jobs");

            if options.stop_on_first_done && num_done > 0 {
                break;
            }
            if num_done == jobs.len() {
                break;
            }

            tokio::time::sleep(options.poll_interval).await;
        }
    }

    /// Stop rendering. A later `watch` restarts it.
    pub fn finish(&mut self) {
        if self.started {
            self.monitor.stop();
            self.started = false;
        }
    }
}

impl Drop for ProgressLoop {
    fn drop(&mut self) {
        self.finish();
    }
}
