//! Live terminal rows, one spinner per job (`progress: rich`).

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

use sl_types::{JobState, JobView};

use crate::monitor::ProgressMonitor;

const ROW_TEMPLATE: &str = "{prefix:>5} {msg}";
const SPINNER_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ";

fn status_icon(state: JobState) -> &'static str {
    match state {
        JobState::Pending | JobState::Unknown => "🕛",
        JobState::Running => "🏃",
        JobState::Completed => "🏁",
        JobState::Failed => "💥",
    }
}

/// Renders `#idx icon state [elapsed] overrides` per job.
pub struct BarProgress {
    multi: MultiProgress,
    rows: HashMap<usize, ProgressBar>,
    finished: HashSet<usize>,
}

impl BarProgress {
    pub fn new() -> Self {
        Self::with_draw_target(ProgressDrawTarget::stderr())
    }

    pub fn with_draw_target(target: ProgressDrawTarget) -> Self {
        Self {
            multi: MultiProgress::with_draw_target(target),
            rows: HashMap::new(),
            finished: HashSet::new(),
        }
    }

    pub fn active_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn finished_rows(&self) -> usize {
        self.finished.len()
    }

    fn row(&mut self, index: usize) -> &ProgressBar {
        let multi = &self.multi;
        self.rows.entry(index).or_insert_with(|| {
            let bar = multi.add(ProgressBar::new_spinner());
            // Template is a compile-time constant; fall back to the default
            // spinner style rather than failing a refresh.
            let style = ProgressStyle::with_template(ROW_TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_chars(SPINNER_CHARS);
            bar.set_style(style);
            bar.set_prefix(format!("#{index}"));
            bar
        })
    }

    fn finish_row(&mut self, index: usize, message: String) {
        if let Some(bar) = self.rows.remove(&index) {
            bar.finish_with_message(message);
        }
        self.finished.insert(index);
    }
}

impl Default for BarProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressMonitor for BarProgress {
    fn name(&self) -> &str {
        "rich"
    }

    fn refresh(&mut self, jobs: &[JobView<'_>]) {
        // Rows whose job vanished between polls were reconciled elsewhere.
        let present: HashSet<usize> = jobs.iter().map(|j| j.index).collect();
        let vanished: Vec<usize> = self
            .rows
            .keys()
            .copied()
            .filter(|idx| !present.contains(idx))
            .collect();
        for idx in vanished {
            self.finish_row(idx, format!("{} done", status_icon(JobState::Completed)));
        }

        for job in jobs {
            if self.finished.contains(&job.index) {
                continue;
            }
            let state = job.handle.state();
            let elapsed = chrono::Utc::now() - job.handle.start_time();
            let elapsed = Duration::from_secs(elapsed.num_seconds().max(0) as u64);
            let message = format!(
                "{} {:<8} [{}] {}",
                status_icon(state),
                state.to_string(),
                indicatif::HumanDuration(elapsed),
                job.overrides.display_filtered()
            );

            if state.is_terminal() {
                self.finish_row(job.index, message);
            } else {
                let bar = self.row(job.index);
                bar.set_message(message);
                bar.tick();
            }
        }
    }

    fn stop(&mut self) {
        for (_, bar) in self.rows.drain() {
            bar.abandon();
        }
        // Drawing errors only mean the terminal went away.
        let _ = self.multi.clear();
    }
}
