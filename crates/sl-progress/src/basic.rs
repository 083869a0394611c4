//! Log-line progress reporting (`progress: basic`).

use std::collections::HashMap;
use tracing::{debug, info, warn};

use sl_types::{JobState, JobView, OverrideSet};

use crate::monitor::ProgressMonitor;

/// Logs each launch as `#idx : overrides` and each observed state change.
#[derive(Debug, Default)]
pub struct LogProgress {
    last_state: HashMap<usize, JobState>,
    transitions: usize,
}

impl LogProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Jobs still being tracked, i.e. not yet seen in a terminal state.
    pub fn tracked(&self) -> usize {
        self.last_state.values().filter(|s| !s.is_terminal()).count()
    }

    /// State changes logged so far.
    pub fn transitions(&self) -> usize {
        self.transitions
    }
}

impl ProgressMonitor for LogProgress {
    fn name(&self) -> &str {
        "basic"
    }

    fn on_launch(&mut self, index: usize, overrides: &OverrideSet) {
        info!("\t#{index} : {}", overrides.display_filtered());
        self.last_state.insert(index, JobState::Pending);
    }

    fn refresh(&mut self, jobs: &[JobView<'_>]) {
        for job in jobs {
            let state = job.handle.state();
            let previous = self.last_state.insert(job.index, state);
            if previous == Some(state) {
                continue;
            }
            self.transitions += 1;
            match state {
                JobState::Failed => warn!(index = job.index, job_id = job.handle.job_id(), "job {state}"),
                JobState::Completed => info!(index = job.index, job_id = job.handle.job_id(), "job {state}"),
                _ => debug!(index = job.index, job_id = job.handle.job_id(), "job {state}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use sl_types::{JobFailure, JobHandle, JobReturn, Override};
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Debug, Default)]
    struct Toggle {
        done: AtomicBool,
    }

    impl JobHandle for Toggle {
        fn job_id(&self) -> &str {
            "toggle"
        }

        fn done(&self) -> bool {
            self.done.load(Ordering::SeqCst)
        }

        fn result(&self) -> Result<JobReturn, JobFailure> {
            Ok(JobReturn::completed(1.0, Utc::now()))
        }

        fn start_time(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }

    #[test]
    fn terminal_jobs_stop_being_tracked() {
        let mut progress = LogProgress::new();
        let overrides: OverrideSet = vec![Override::new("x", "1")].into_iter().collect();
        progress.on_launch(0, &overrides);
        assert_eq!(progress.tracked(), 1);

        let handle = Toggle::default();
        let jobs = [JobView {
            index: 0,
            handle: &handle,
            overrides: &overrides,
        }];

        progress.refresh(&jobs);
        assert_eq!(progress.tracked(), 1);

        handle.done.store(true, Ordering::SeqCst);
        progress.refresh(&jobs);
        assert_eq!(progress.tracked(), 0);
    }

    #[test]
    fn completion_is_logged_once() {
        let mut progress = LogProgress::new();
        let overrides: OverrideSet = vec![Override::new("x", "1")].into_iter().collect();
        progress.on_launch(0, &overrides);

        let handle = Toggle::default();
        handle.done.store(true, Ordering::SeqCst);
        let jobs = [JobView {
            index: 0,
            handle: &handle,
            overrides: &overrides,
        }];

        progress.refresh(&jobs);
        let after_first = progress.transitions();
        assert_eq!(after_first, 1);

        progress.refresh(&jobs);
        progress.refresh(&jobs);
        assert_eq!(progress.transitions(), after_first);
        assert_eq!(progress.tracked(), 0);
    }
}
