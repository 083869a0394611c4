//! Subprocess backend: one child process per job, overrides as arguments.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, info};

use sl_types::{config_error, JobFailure, JobReturn, LaunchError, OverrideSet, SlResult};

use crate::backend::ExecutionBackend;
use crate::handle::{CellHandle, JobCell};

/// Environment variable carrying the submission index of a job.
pub const JOB_INDEX_ENV: &str = "SWEEPLINE_JOB_INDEX";

const STDERR_TAIL_LINES: usize = 20;

/// How to start a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            env: BTreeMap::new(),
        }
    }

    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// Runs `program args… key=value…` per job.
///
/// The last non-empty stdout line is the job's cost. A non-zero exit status
/// is a failed job.
#[derive(Debug)]
pub struct CommandBackend {
    spec: CommandSpec,
    closed: bool,
}

impl CommandBackend {
    pub fn new(spec: CommandSpec) -> Self {
        Self { spec, closed: false }
    }

    /// Build from the `backend.params` section of a sweep config.
    pub fn from_params(params: &Value) -> SlResult<Self> {
        let spec: CommandSpec = serde_json::from_value(params.clone())?;
        if spec.program.trim().is_empty() {
            return Err(config_error!("command backend needs a program"));
        }
        Ok(Self::new(spec))
    }

    pub fn spec(&self) -> &CommandSpec {
        &self.spec
    }

    fn command(&self, overrides: &OverrideSet, index: usize) -> Command {
        let mut cmd = Command::new(&self.spec.program);
        cmd.args(&self.spec.args)
            .args(overrides.to_args())
            .envs(&self.spec.env)
            .env(JOB_INDEX_ENV, index.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(false);
        if let Some(dir) = &self.spec.working_dir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

/// Cost from the last non-empty line of `stdout`.
pub fn parse_cost(stdout: &str) -> Result<f64, String> {
    let line = stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .ok_or_else(|| "job printed no cost".to_string())?;
    let cost = line
        .parse::<f64>()
        .map_err(|_| format!("could not parse cost from last stdout line {line:?}"))?;
    if !cost.is_finite() {
        return Err(format!("job printed a non-finite cost {line:?}"));
    }
    Ok(cost)
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().collect();
    let start = all.len().saturating_sub(lines);
    all[start..].join("\n")
}

#[async_trait]
impl ExecutionBackend for CommandBackend {
    type Handle = CellHandle;

    fn name(&self) -> &str {
        "command"
    }

    async fn launch(
        &mut self,
        overrides: &[OverrideSet],
        start_index: usize,
    ) -> Result<Vec<CellHandle>, LaunchError> {
        if self.closed {
            return Err(LaunchError::Closed {
                backend: self.name().to_string(),
            });
        }

        let mut handles = Vec::with_capacity(overrides.len());
        for (offset, set) in overrides.iter().enumerate() {
            let index = start_index + offset;
            let child = self
                .command(set, index)
                .spawn()
                .map_err(|e| LaunchError::Spawn {
                    index,
                    message: format!("{}: {e}", self.spec.program),
                })?;
            let job_id = child
                .id()
                .map(|pid| format!("pid-{pid}"))
                .unwrap_or_else(|| format!("cmd-{index}"));
            debug!(index, job_id = %job_id, "spawned job process");

            let cell = JobCell::new();
            cell.mark_running();
            let watcher = Arc::clone(&cell);
            tokio::spawn(async move {
                let outcome = match child.wait_with_output().await {
                    Ok(output) if output.status.success() => {
                        let stdout = String::from_utf8_lossy(&output.stdout);
                        parse_cost(&stdout)
                            .map(|cost| JobReturn::completed(cost, Utc::now()))
                            .map_err(|e| {
                                JobFailure::new(e)
                                    .with_traceback(tail(
                                        &String::from_utf8_lossy(&output.stderr),
                                        STDERR_TAIL_LINES,
                                    ))
                                    .finished_at(Utc::now())
                            })
                    }
                    Ok(output) => {
                        let stderr = String::from_utf8_lossy(&output.stderr);
                        let stderr = tail(&stderr, STDERR_TAIL_LINES);
                        let message = if stderr.is_empty() {
                            format!("{}", output.status)
                        } else {
                            format!("{}: {stderr}", output.status)
                        };
                        Ok(JobReturn::failed(message, Utc::now()))
                    }
                    Err(e) => Err(JobFailure::new(format!("waiting on job failed: {e}"))
                        .finished_at(Utc::now())),
                };
                watcher.complete(outcome);
            });

            handles.push(CellHandle::new(job_id, cell));
        }
        Ok(handles)
    }

    async fn close(&mut self) -> Result<(), LaunchError> {
        if !self.closed {
            self.closed = true;
            info!(program = %self.spec.program, "command backend closed; running jobs are left alone");
        }
        Ok(())
    }
}
