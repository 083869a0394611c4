//! Handle abstraction over jobs running in an external execution backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::overrides::OverrideSet;

/// Execution status reported by the backend for a finished job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Completed,
    Failed,
}

/// What a finished job handed back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobReturn {
    /// Objective value, if the job produced one.
    pub return_value: Option<f64>,
    pub status: JobStatus,
    pub finished_at: DateTime<Utc>,
    /// Backend-provided description of a failed status.
    pub message: Option<String>,
}

impl JobReturn {
    pub fn completed(return_value: f64, finished_at: DateTime<Utc>) -> Self {
        Self {
            return_value: Some(return_value),
            status: JobStatus::Completed,
            finished_at,
            message: None,
        }
    }

    pub fn failed(message: impl Into<String>, finished_at: DateTime<Utc>) -> Self {
        Self {
            return_value: None,
            status: JobStatus::Failed,
            finished_at,
            message: Some(message.into()),
        }
    }
}

/// The job raised instead of returning, or its result could not be fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobFailure {
    pub message: String,
    pub traceback: String,
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            traceback: String::new(),
            finished_at: None,
        }
    }

    pub fn with_traceback(mut self, traceback: impl Into<String>) -> Self {
        self.traceback = traceback.into();
        self
    }

    pub fn finished_at(mut self, at: DateTime<Utc>) -> Self {
        self.finished_at = Some(at);
        self
    }
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Scheduler-side lifecycle of a job, used for progress display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Failed,
    Unknown,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Completed => "SUCCESS",
            Self::Failed => "FAILED",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// Opaque reference to one job launched by an execution backend.
///
/// `done()` may be polled any number of times without side effects.
/// `result()` is only meaningful once `done()` has returned `true`; before
/// that implementations return a [`JobFailure`].
#[async_trait]
pub trait JobHandle: Send + Sync + fmt::Debug {
    /// Backend-assigned identifier.
    fn job_id(&self) -> &str;

    fn done(&self) -> bool;

    fn result(&self) -> Result<JobReturn, JobFailure>;

    /// When the backend started executing the job.
    fn start_time(&self) -> DateTime<Utc>;

    fn state(&self) -> JobState {
        if !self.done() {
            return JobState::Running;
        }
        match self.result() {
            Ok(ret) if ret.status == JobStatus::Completed => JobState::Completed,
            _ => JobState::Failed,
        }
    }

    /// Force a fresh status query against the remote scheduler. One query
    /// refreshes the shared view for every handle of the same backend.
    async fn refresh_status(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Type-erased handle, used when the backend is chosen at runtime.
pub type BoxedHandle = Box<dyn JobHandle>;

#[async_trait]
impl<H: JobHandle + ?Sized> JobHandle for Box<H> {
    fn job_id(&self) -> &str {
        (**self).job_id()
    }

    fn done(&self) -> bool {
        (**self).done()
    }

    fn result(&self) -> Result<JobReturn, JobFailure> {
        (**self).result()
    }

    fn start_time(&self) -> DateTime<Utc> {
        (**self).start_time()
    }

    fn state(&self) -> JobState {
        (**self).state()
    }

    async fn refresh_status(&self) -> Result<(), String> {
        (**self).refresh_status().await
    }
}

/// Read-only snapshot of one running job for observers.
#[derive(Debug, Clone, Copy)]
pub struct JobView<'a> {
    pub index: usize,
    pub handle: &'a dyn JobHandle,
    pub overrides: &'a OverrideSet,
}
