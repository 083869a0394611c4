//! Sweep progress and incumbent tracking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sl_types::{Trial, TrialResult};

/// Lifecycle state for a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SweepState {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Best successful trial so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incumbent {
    pub trial: Trial,
    pub result: TrialResult,
}

impl Incumbent {
    pub fn cost(&self) -> f64 {
        self.result.cost
    }
}

/// Aggregate status of a sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepStatus {
    pub state: SweepState,
    pub trials_submitted: usize,
    pub trials_completed: usize,
    pub trials_crashed: usize,
    /// Trials the dispatcher refused because their configuration did not
    /// resolve against the baseline.
    pub trials_rejected: usize,
    pub incumbent: Option<Incumbent>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl SweepStatus {
    pub fn new() -> Self {
        Self {
            state: SweepState::Pending,
            trials_submitted: 0,
            trials_completed: 0,
            trials_crashed: 0,
            trials_rejected: 0,
            incumbent: None,
            started_at: None,
            finished_at: None,
            error: None,
        }
    }

    pub fn mark_running(&mut self) {
        self.state = SweepState::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn mark_completed(&mut self) {
        self.state = SweepState::Completed;
        self.finished_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self, error: String) {
        self.state = SweepState::Failed;
        self.finished_at = Some(Utc::now());
        self.error = Some(error);
    }

    /// Count a finished trial and update the incumbent if it improves on it.
    /// Lower cost is better; crashed trials and non-finite costs never become
    /// the incumbent.
    pub fn record(&mut self, trial: &Trial, result: &TrialResult) {
        self.trials_completed += 1;
        if !result.is_success() {
            self.trials_crashed += 1;
            return;
        }

        let improves = match &self.incumbent {
            _ if !result.cost.is_finite() => false,
            None => true,
            Some(current) => result.cost < current.cost(),
        };
        if improves {
            self.incumbent = Some(Incumbent {
                trial: trial.clone(),
                result: result.clone(),
            });
        }
    }
}

impl Default for SweepStatus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sl_types::TrialStatus;
    use std::collections::BTreeMap;

    fn finished(trial: &Trial, cost: f64, status: TrialStatus) -> TrialResult {
        let now = Utc::now();
        TrialResult {
            trial_id: trial.id,
            cost,
            status,
            start_time: now,
            end_time: now,
            additional_info: BTreeMap::new(),
        }
    }

    fn trial(x: i64) -> Trial {
        Trial::from_value(json!({ "x": x })).unwrap()
    }

    #[test]
    fn sweep_status_lifecycle() {
        let mut status = SweepStatus::new();
        assert_eq!(status.state, SweepState::Pending);
        assert!(status.started_at.is_none());

        status.mark_running();
        assert_eq!(status.state, SweepState::Running);
        assert!(status.started_at.is_some());

        status.mark_completed();
        assert_eq!(status.state, SweepState::Completed);
        assert!(status.finished_at.is_some());
    }

    #[test]
    fn incumbent_tracks_lowest_cost() {
        let mut status = SweepStatus::new();
        let (a, b, c) = (trial(1), trial(2), trial(3));

        status.record(&a, &finished(&a, 1.5, TrialStatus::Success));
        assert_eq!(status.incumbent.as_ref().unwrap().cost(), 1.5);

        status.record(&b, &finished(&b, 0.5, TrialStatus::Success));
        assert_eq!(status.incumbent.as_ref().unwrap().trial.id, b.id);

        // Worse result should not replace
        status.record(&c, &finished(&c, 0.9, TrialStatus::Success));
        assert_eq!(status.incumbent.as_ref().unwrap().cost(), 0.5);
        assert_eq!(status.trials_completed, 3);
    }

    #[test]
    fn crashed_trials_never_become_incumbent() {
        let mut status = SweepStatus::new();
        let a = trial(1);
        status.record(&a, &finished(&a, -1e9, TrialStatus::Crashed));
        assert!(status.incumbent.is_none());
        assert_eq!(status.trials_crashed, 1);
    }

    #[test]
    fn non_finite_cost_never_becomes_incumbent() {
        let mut status = SweepStatus::new();
        let (a, b) = (trial(1), trial(2));

        status.record(&a, &finished(&a, f64::NAN, TrialStatus::Success));
        assert!(status.incumbent.is_none());

        status.record(&b, &finished(&b, 0.5, TrialStatus::Success));
        assert_eq!(status.incumbent.as_ref().unwrap().cost(), 0.5);
        assert_eq!(status.trials_completed, 2);
    }

    #[test]
    fn failure_records_error() {
        let mut status = SweepStatus::new();
        status.mark_running();
        status.mark_failed("backend closed".into());
        assert_eq!(status.state, SweepState::Failed);
        assert_eq!(status.error.as_deref(), Some("backend closed"));
    }
}
