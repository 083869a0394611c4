//! Bounded-concurrency dispatch of trials onto an execution backend.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use tracing::{debug, info};

use sl_progress::{ProgressLoop, ProgressMonitor, WatchOptions};
use sl_types::{
    DispatcherConfig, JobHandle, JobView, LaunchError, Override, SlResult, Trial, TrialResult,
};

use crate::backend::ExecutionBackend;
use crate::differ::ConfigDiffer;
use crate::record::JobRecord;
use crate::slots::SlotPool;
use crate::translate::ResultTranslator;

/// Running counters of one dispatcher.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchStats {
    pub submitted: usize,
    pub completed: usize,
    pub crashed: usize,
    /// Highest number of simultaneously running jobs. Never exceeds `n_jobs`.
    pub peak_running: usize,
}

/// Submits trials to a backend without ever exceeding `n_jobs` running jobs,
/// and hands every result back exactly once.
///
/// The dispatcher is driven from a single task. Records move from the
/// running set to the finished queue at most once and leave the queue when
/// their result is handed out by [`get_finished`](Self::get_finished).
pub struct TrialDispatcher<B: ExecutionBackend> {
    backend: B,
    config: DispatcherConfig,
    differ: ConfigDiffer,
    translator: ResultTranslator,
    slots: SlotPool,
    global_overrides: Vec<Override>,
    progress: Option<ProgressLoop>,
    running: Vec<JobRecord<B::Handle>>,
    finished: VecDeque<JobRecord<B::Handle>>,
    next_index: usize,
    stats: DispatchStats,
}

impl<B: ExecutionBackend> TrialDispatcher<B> {
    /// Create a dispatcher over `backend`, diffing every trial against
    /// `baseline`.
    pub fn new(backend: B, baseline: &Value, config: DispatcherConfig) -> SlResult<Self> {
        config.validate()?;
        let differ = ConfigDiffer::new(baseline, config.budget_variable.clone())?;
        let global_overrides = config.parsed_global_overrides()?;
        let progress = ProgressLoop::from_config(&config);

        info!(
            backend = backend.name(),
            n_jobs = config.n_jobs,
            budget_variable = config.budget_variable.as_deref().unwrap_or("-"),
            progress = progress.as_ref().map(|p| p.monitor_name()).unwrap_or("none"),
            "trial dispatcher ready"
        );

        Ok(Self {
            backend,
            translator: ResultTranslator::new(config.crash_cost),
            slots: SlotPool::new(config.n_jobs),
            differ,
            global_overrides,
            progress,
            running: Vec::new(),
            finished: VecDeque::new(),
            next_index: 0,
            stats: DispatchStats::default(),
            config,
        })
    }

    /// Replace the configured progress monitor.
    pub fn with_monitor(mut self, monitor: Box<dyn ProgressMonitor>) -> Self {
        self.progress = Some(ProgressLoop::new(monitor, self.config.refresh_interval));
        self
    }

    /// Launch `trial`, first waiting for a free slot if all are taken.
    ///
    /// Returns the submission index. A trial whose configuration cannot be
    /// resolved against the baseline, or that the backend refuses, is not
    /// recorded and its error is returned.
    pub async fn submit(&mut self, trial: Trial) -> SlResult<usize> {
        while !self.available() {
            self.wait().await;
            self.reconcile();
        }

        let mut overrides = self.differ.diff(&trial)?;
        overrides.extend(self.global_overrides.iter().cloned());

        let index = self.next_index;
        let mut handles = self
            .backend
            .launch(std::slice::from_ref(&overrides), index)
            .await?;
        let handle = match handles.pop() {
            Some(handle) if handles.is_empty() => handle,
            popped => {
                return Err(LaunchError::HandleCountMismatch {
                    expected: 1,
                    got: handles.len() + usize::from(popped.is_some()),
                }
                .into())
            }
        };
        self.next_index += 1;

        if let Some(progress) = &mut self.progress {
            progress.on_launch(index, &overrides);
        }
        info!(
            index,
            job_id = handle.job_id(),
            overrides = %overrides.display_filtered(),
            "trial launched"
        );

        self.running
            .push(JobRecord::new(index, handle, overrides, trial));
        self.slots.admit(self.running.len());
        self.stats.submitted += 1;
        self.stats.peak_running = self.slots.peak();
        Ok(index)
    }

    /// Move every done job from the running set to the finished queue.
    /// Returns how many moved. Calling it again without new completions
    /// moves nothing.
    pub fn reconcile(&mut self) -> usize {
        let (done, still_running): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.running)
                .into_iter()
                .partition(|record| record.done());
        self.running = still_running;

        let moved = done.len();
        for mut record in done {
            record.mark_finished();
            debug!(index = record.index, job_id = record.handle.job_id(), "job done");
            self.finished.push_back(record);
        }
        moved
    }

    /// Block until at least one running job is done. Returns immediately
    /// when nothing is running.
    pub async fn wait(&mut self) {
        if self.running.is_empty() {
            return;
        }
        let poll_interval = self.config.poll_interval;
        let views: Vec<JobView<'_>> = self.running.iter().map(JobRecord::view).collect();

        match &mut self.progress {
            Some(progress) => {
                progress
                    .watch(&views, WatchOptions::first_done(poll_interval))
                    .await
            }
            None => {
                while !views.iter().any(|v| v.handle.done()) {
                    tokio::time::sleep(poll_interval).await;
                }
            }
        }
    }

    /// Reconcile, then drain and translate every finished job.
    ///
    /// Each submitted trial appears in exactly one call's output. Order is
    /// completion-detection order, not submission order.
    pub fn get_finished(&mut self) -> Vec<(Trial, TrialResult)> {
        self.iter_finished().collect()
    }

    /// Lazy form of [`get_finished`](Self::get_finished). Records are only
    /// removed as the iterator yields them; anything left unconsumed is
    /// returned by the next call.
    pub fn iter_finished(&mut self) -> impl Iterator<Item = (Trial, TrialResult)> + '_ {
        self.reconcile();
        std::iter::from_fn(move || {
            let record = self.finished.pop_front()?;
            let result = self.translator.translate(&record.trial, &record.handle);
            self.stats.completed += 1;
            if !result.is_success() {
                self.stats.crashed += 1;
            }
            Some((record.trial, result))
        })
    }

    /// Whether any job is still running.
    pub fn pending(&self) -> bool {
        !self.running.is_empty()
    }

    pub fn available(&self) -> bool {
        self.slots.available(self.running.len())
    }

    pub fn available_worker_count(&self) -> usize {
        self.slots.free(self.running.len())
    }

    pub fn n_jobs(&self) -> usize {
        self.slots.capacity()
    }

    pub fn running_jobs(&self) -> Vec<JobView<'_>> {
        self.running.iter().map(JobRecord::view).collect()
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub fn differ(&self) -> &ConfigDiffer {
        &self.differ
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Stop rendering progress and close the backend. Running jobs are not
    /// killed; their results can no longer be collected through this
    /// dispatcher once it is dropped.
    pub async fn close(&mut self) -> SlResult<()> {
        if let Some(progress) = &mut self.progress {
            progress.finish();
        }
        info!(
            backend = self.backend.name(),
            submitted = self.stats.submitted,
            completed = self.stats.completed,
            still_running = self.running.len(),
            "closing trial dispatcher"
        );
        self.backend.close().await?;
        Ok(())
    }
}
