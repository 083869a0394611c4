//! Conversion of finished job outcomes into optimizer-facing results.

use std::collections::BTreeMap;
use tracing::warn;

use sl_types::{
    JobHandle, JobStatus, Trial, TrialResult, TrialStatus, INFO_ERROR, INFO_TRACEBACK,
};

/// Info key carrying the backend job id of a crashed trial.
pub const INFO_JOB_ID: &str = "job_id";

/// Maps a done handle to exactly one [`TrialResult`].
#[derive(Debug, Clone, Copy)]
pub struct ResultTranslator {
    crash_cost: f64,
}

impl ResultTranslator {
    pub fn new(crash_cost: f64) -> Self {
        Self { crash_cost }
    }

    pub fn crash_cost(&self) -> f64 {
        self.crash_cost
    }

    /// Translate the outcome of `handle`, which must be done.
    ///
    /// A completed job with a finite return value is a success. Everything else,
    /// including a job that raised or whose result could not be read, is a
    /// crash carrying the crash cost and a non-empty error message.
    pub fn translate<H: JobHandle + ?Sized>(&self, trial: &Trial, handle: &H) -> TrialResult {
        let start_time = handle.start_time();

        let (cost, status, end_time, error, traceback) = match handle.result() {
            Ok(ret) => match (ret.status, ret.return_value) {
                (JobStatus::Completed, Some(cost)) if cost.is_finite() => {
                    (cost, TrialStatus::Success, ret.finished_at, None, None)
                }
                (JobStatus::Completed, Some(cost)) => (
                    self.crash_cost,
                    TrialStatus::Crashed,
                    ret.finished_at,
                    Some(format!("job returned a non-finite cost ({cost})")),
                    None,
                ),
                (JobStatus::Completed, None) => (
                    self.crash_cost,
                    TrialStatus::Crashed,
                    ret.finished_at,
                    Some("job completed without a return value".to_string()),
                    None,
                ),
                (JobStatus::Failed, _) => (
                    self.crash_cost,
                    TrialStatus::Crashed,
                    ret.finished_at,
                    Some(non_empty(ret.message, "job failed")),
                    None,
                ),
            },
            Err(failure) => (
                self.crash_cost,
                TrialStatus::Crashed,
                failure.finished_at.unwrap_or(start_time),
                Some(non_empty(Some(failure.message), "job raised")),
                Some(failure.traceback),
            ),
        };

        let mut additional_info = BTreeMap::new();
        if let Some(error) = error {
            warn!(
                trial_id = %trial.id,
                job_id = handle.job_id(),
                error = %error,
                "trial crashed"
            );
            additional_info.insert(INFO_ERROR.to_string(), error);
            additional_info.insert(INFO_TRACEBACK.to_string(), traceback.unwrap_or_default());
            additional_info.insert(INFO_JOB_ID.to_string(), handle.job_id().to_string());
        }

        TrialResult {
            trial_id: trial.id,
            cost,
            status,
            start_time,
            end_time,
            additional_info,
        }
    }
}

fn non_empty(message: Option<String>, fallback: &str) -> String {
    match message {
        Some(m) if !m.trim().is_empty() => m,
        _ => fallback.to_string(),
    }
}
