//! The sweep loop: ask the optimizer, dispatch, tell results back.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use sl_dispatch::{ConfigDiffer, DispatchStats, ExecutionBackend, TrialDispatcher};
use sl_types::{DispatcherConfig, OverrideSet, SlError, SlResult};

use crate::optimizer::{Optimizer, OPTIMIZER_LOG_TARGET};
use crate::status::{Incumbent, SweepStatus};

/// Outcome of a finished sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepReport {
    pub optimizer: String,
    pub incumbent: Option<Incumbent>,
    pub trials_completed: usize,
    pub trials_crashed: usize,
    pub trials_rejected: usize,
    pub dispatch: DispatchStats,
}

/// Runs up to `n_trials` trials from an optimizer through a dispatcher.
#[derive(Debug, Clone)]
pub struct Sweep {
    n_trials: usize,
    status: SweepStatus,
}

impl Sweep {
    pub fn new(n_trials: usize) -> Self {
        Self {
            n_trials,
            status: SweepStatus::new(),
        }
    }

    pub fn status(&self) -> &SweepStatus {
        &self.status
    }

    /// Drive the sweep to completion.
    ///
    /// Trials are submitted while slots are free, finished results are told
    /// back as soon as they are seen, and the call returns once the optimizer
    /// is exhausted or `n_trials` were asked and every launched trial has
    /// reported. A trial the dispatcher cannot diff is counted as rejected
    /// and skipped. Launch errors end the sweep.
    pub async fn run<O, B>(
        &mut self,
        optimizer: &mut O,
        dispatcher: &mut TrialDispatcher<B>,
    ) -> SlResult<SweepReport>
    where
        O: Optimizer + ?Sized,
        B: ExecutionBackend,
    {
        self.status.mark_running();
        info!(
            optimizer = optimizer.name(),
            n_trials = self.n_trials,
            n_jobs = dispatcher.n_jobs(),
            "sweep started"
        );

        let mut asked = 0;
        let mut exhausted = false;

        loop {
            while asked < self.n_trials && !exhausted && dispatcher.available() {
                let Some(trial) = optimizer.ask() else {
                    debug!(target: OPTIMIZER_LOG_TARGET, asked, "optimizer exhausted");
                    exhausted = true;
                    break;
                };
                asked += 1;
                debug!(target: OPTIMIZER_LOG_TARGET, trial_id = %trial.id, "asked trial");

                let trial_id = trial.id;
                match dispatcher.submit(trial).await {
                    Ok(_) => self.status.trials_submitted += 1,
                    Err(SlError::Diff(e)) => {
                        warn!(trial_id = %trial_id, error = %e, "trial rejected");
                        self.status.trials_rejected += 1;
                    }
                    Err(e) => {
                        self.status.mark_failed(e.to_string());
                        return Err(e);
                    }
                }
            }

            for (trial, result) in dispatcher.get_finished() {
                debug!(
                    target: OPTIMIZER_LOG_TARGET,
                    trial_id = %trial.id,
                    cost = result.cost,
                    status = ?result.status,
                    "told result"
                );
                optimizer.tell(&trial, &result);
                self.status.record(&trial, &result);
            }

            let nothing_left = asked >= self.n_trials || exhausted;
            if nothing_left && !dispatcher.pending() {
                break;
            }
            dispatcher.wait().await;
        }

        self.status.mark_completed();
        match &self.status.incumbent {
            Some(best) => info!(
                configuration = %serde_json::Value::Object(best.trial.configuration.clone()),
                cost = best.cost(),
                "final incumbent"
            ),
            None => warn!("sweep finished without a successful trial"),
        }

        Ok(SweepReport {
            optimizer: optimizer.name().to_string(),
            incumbent: self.status.incumbent.clone(),
            trials_completed: self.status.trials_completed,
            trials_crashed: self.status.trials_crashed,
            trials_rejected: self.status.trials_rejected,
            dispatch: dispatcher.stats().clone(),
        })
    }

    /// Override sets the first `n_trials` trials would launch with, without
    /// launching anything.
    pub fn preview<O: Optimizer + ?Sized>(
        &self,
        optimizer: &mut O,
        baseline: &serde_json::Value,
        config: &DispatcherConfig,
    ) -> SlResult<Vec<OverrideSet>> {
        let differ = ConfigDiffer::new(baseline, config.budget_variable.clone())?;
        let global = config.parsed_global_overrides()?;

        let mut sets = Vec::new();
        for _ in 0..self.n_trials {
            let Some(trial) = optimizer.ask() else {
                break;
            };
            let mut overrides = differ.diff(&trial)?;
            overrides.extend(global.iter().cloned());
            sets.push(overrides);
        }
        Ok(sets)
    }
}
