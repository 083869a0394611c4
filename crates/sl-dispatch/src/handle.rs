//! Shared completion cell written by a backend worker and read through a
//! [`CellHandle`].

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;

use sl_types::{JobFailure, JobHandle, JobReturn, JobState, JobStatus};

#[derive(Debug)]
struct CellState {
    state: JobState,
    submitted_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    outcome: Option<Result<JobReturn, JobFailure>>,
}

/// Lifecycle of one job as seen by the worker executing it.
#[derive(Debug)]
pub struct JobCell {
    inner: Mutex<CellState>,
}

impl JobCell {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(CellState {
                state: JobState::Pending,
                submitted_at: Utc::now(),
                started_at: None,
                outcome: None,
            }),
        })
    }

    pub fn mark_running(&self) {
        let mut inner = self.inner.lock();
        if inner.outcome.is_none() {
            inner.state = JobState::Running;
            inner.started_at = Some(Utc::now());
        }
    }

    /// Store the final outcome. Later calls are ignored.
    pub fn complete(&self, outcome: Result<JobReturn, JobFailure>) {
        let mut inner = self.inner.lock();
        if inner.outcome.is_some() {
            return;
        }
        inner.state = match &outcome {
            Ok(ret) if ret.status == JobStatus::Completed => JobState::Completed,
            _ => JobState::Failed,
        };
        inner.outcome = Some(outcome);
    }

    pub fn is_done(&self) -> bool {
        self.inner.lock().outcome.is_some()
    }
}

/// [`JobHandle`] over a [`JobCell`].
#[derive(Debug, Clone)]
pub struct CellHandle {
    job_id: String,
    cell: Arc<JobCell>,
}

impl CellHandle {
    pub fn new(job_id: impl Into<String>, cell: Arc<JobCell>) -> Self {
        Self {
            job_id: job_id.into(),
            cell,
        }
    }
}

impl JobHandle for CellHandle {
    fn job_id(&self) -> &str {
        &self.job_id
    }

    fn done(&self) -> bool {
        self.cell.is_done()
    }

    fn result(&self) -> Result<JobReturn, JobFailure> {
        match &self.cell.inner.lock().outcome {
            Some(outcome) => outcome.clone(),
            None => Err(JobFailure::new(format!(
                "job {} has not finished",
                self.job_id
            ))),
        }
    }

    /// Queued jobs report their submission time.
    fn start_time(&self) -> DateTime<Utc> {
        let inner = self.cell.inner.lock();
        inner.started_at.unwrap_or(inner.submitted_at)
    }

    fn state(&self) -> JobState {
        self.cell.inner.lock().state
    }
}
