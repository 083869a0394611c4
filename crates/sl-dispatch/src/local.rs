//! In-process backend backed by a fixed pool of worker threads.

use async_trait::async_trait;
use chrono::Utc;
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::{Arc, Once};
use std::thread;
use tracing::{debug, info, warn};

use sl_types::{JobFailure, JobReturn, LaunchError, OverrideSet};

use crate::backend::ExecutionBackend;
use crate::handle::{CellHandle, JobCell};

/// What a target function sees of the job it evaluates.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub index: usize,
    pub overrides: OverrideSet,
}

impl JobContext {
    pub fn value(&self, key: &str) -> Option<&str> {
        self.overrides.get(key)
    }

    /// Parse an override value, `None` when absent or malformed.
    pub fn parse<T: FromStr>(&self, key: &str) -> Option<T> {
        self.value(key).and_then(|v| v.parse().ok())
    }
}

/// Objective evaluated by worker threads. An `Err` is a crashed trial.
pub type TargetFn = Arc<dyn Fn(&JobContext) -> Result<f64, String> + Send + Sync>;

struct Task {
    context: JobContext,
    cell: Arc<JobCell>,
}

thread_local! {
    static IN_WORKER: Cell<bool> = const { Cell::new(false) };
    static LAST_BACKTRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

static PANIC_HOOK: Once = Once::new();

/// Worker threads record the backtrace of a panic instead of printing it;
/// every other thread keeps the previous hook.
fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if IN_WORKER.with(Cell::get) {
                let trace = Backtrace::force_capture().to_string();
                LAST_BACKTRACE.with(|slot| *slot.borrow_mut() = Some(trace));
            } else {
                previous(info);
            }
        }));
    });
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "job panicked".to_string()
    }
}

fn run_task(target: &TargetFn, task: Task) {
    task.cell.mark_running();
    debug!(index = task.context.index, "local job started");

    let outcome = match panic::catch_unwind(AssertUnwindSafe(|| target(&task.context))) {
        Ok(Ok(cost)) => Ok(JobReturn::completed(cost, Utc::now())),
        Ok(Err(message)) => Err(JobFailure::new(message).finished_at(Utc::now())),
        Err(payload) => {
            let traceback = LAST_BACKTRACE
                .with(|slot| slot.borrow_mut().take())
                .unwrap_or_default();
            Err(JobFailure::new(format!("panicked: {}", panic_message(&*payload)))
                .with_traceback(traceback)
                .finished_at(Utc::now()))
        }
    };
    task.cell.complete(outcome);
}

fn worker_loop(target: TargetFn, tasks: Receiver<Task>) {
    IN_WORKER.with(|flag| flag.set(true));
    // Drains queued tasks after the sender is dropped, then exits.
    while let Ok(task) = tasks.recv() {
        run_task(&target, task);
    }
}

/// Runs a target function over override sets on local threads.
///
/// Jobs beyond the worker count queue up and report `Pending` until a worker
/// picks them up.
pub struct LocalBackend {
    sender: Option<Sender<Task>>,
    workers: usize,
    spawn_error: Option<String>,
}

impl LocalBackend {
    pub fn new<F>(workers: usize, target: F) -> Self
    where
        F: Fn(&JobContext) -> Result<f64, String> + Send + Sync + 'static,
    {
        Self::with_target(workers, Arc::new(target))
    }

    pub fn with_target(workers: usize, target: TargetFn) -> Self {
        install_panic_hook();
        let workers = workers.max(1);
        let (tx, rx) = unbounded::<Task>();

        let mut spawn_error = None;
        for i in 0..workers {
            let target = Arc::clone(&target);
            let rx = rx.clone();
            let spawned = thread::Builder::new()
                .name(format!("sl-local-{i}"))
                .spawn(move || worker_loop(target, rx));
            if let Err(e) = spawned {
                warn!(worker = i, error = %e, "failed to spawn local worker");
                spawn_error = Some(e.to_string());
                break;
            }
        }

        Self {
            sender: Some(tx),
            workers,
            spawn_error,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }
}

#[async_trait]
impl ExecutionBackend for LocalBackend {
    type Handle = CellHandle;

    fn name(&self) -> &str {
        "local"
    }

    async fn launch(
        &mut self,
        overrides: &[OverrideSet],
        start_index: usize,
    ) -> Result<Vec<CellHandle>, LaunchError> {
        if let Some(reason) = &self.spawn_error {
            return Err(LaunchError::Rejected {
                backend: self.name().to_string(),
                reason: format!("worker pool incomplete: {reason}"),
            });
        }
        let sender = self.sender.as_ref().ok_or_else(|| LaunchError::Closed {
            backend: "local".to_string(),
        })?;

        let mut handles = Vec::with_capacity(overrides.len());
        for (offset, set) in overrides.iter().enumerate() {
            let index = start_index + offset;
            let cell = JobCell::new();
            let task = Task {
                context: JobContext {
                    index,
                    overrides: set.clone(),
                },
                cell: Arc::clone(&cell),
            };
            sender.send(task).map_err(|_| LaunchError::Closed {
                backend: "local".to_string(),
            })?;
            handles.push(CellHandle::new(format!("local-{index}"), cell));
        }
        Ok(handles)
    }

    async fn close(&mut self) -> Result<(), LaunchError> {
        if self.sender.take().is_some() {
            info!(workers = self.workers, "local backend closed; queued jobs still run");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sl_types::{JobHandle, JobState, Override};
    use std::time::Duration;

    fn set(key: &str, value: &str) -> OverrideSet {
        vec![Override::new(key, value)].into_iter().collect()
    }

    async fn until_done(handles: &[CellHandle]) {
        while !handles.iter().all(|h| h.done()) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn evaluates_override_sets() {
        let mut backend = LocalBackend::new(2, |ctx| {
            ctx.parse::<f64>("x").ok_or_else(|| "x missing".to_string())
        });
        let handles = backend
            .launch(&[set("x", "1.5"), set("y", "2")], 10)
            .await
            .unwrap();
        assert_eq!(handles[0].job_id(), "local-10");
        assert_eq!(handles[1].job_id(), "local-11");

        until_done(&handles).await;
        assert_eq!(handles[0].result().unwrap().return_value, Some(1.5));
        assert_eq!(handles[1].state(), JobState::Failed);
        assert_eq!(handles[1].result().unwrap_err().message, "x missing");
    }

    #[tokio::test]
    async fn panics_become_failures() {
        let mut backend = LocalBackend::new(1, |_| -> Result<f64, String> { panic!("exploded") });
        let handles = backend.launch(&[OverrideSet::new()], 0).await.unwrap();
        until_done(&handles).await;

        let failure = handles[0].result().unwrap_err();
        assert!(failure.message.contains("exploded"));
        assert!(!failure.traceback.is_empty());
        assert!(failure.finished_at.is_some());
    }

    #[tokio::test]
    async fn close_keeps_queued_jobs_running() {
        let mut backend = LocalBackend::new(1, |ctx| {
            thread::sleep(Duration::from_millis(20));
            Ok(ctx.index as f64)
        });
        let handles = backend
            .launch(&[OverrideSet::new(), OverrideSet::new()], 0)
            .await
            .unwrap();
        backend.close().await.unwrap();

        assert!(matches!(
            backend.launch(&[OverrideSet::new()], 2).await,
            Err(LaunchError::Closed { .. })
        ));

        until_done(&handles).await;
        assert_eq!(handles[1].result().unwrap().return_value, Some(1.0));
    }
}
