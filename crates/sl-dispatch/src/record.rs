use sl_types::{JobHandle, JobView, OverrideSet, Trial};

/// Where a record sits in the dispatcher. Records only ever move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordPhase {
    Running,
    Finished,
}

/// A submitted trial together with the job evaluating it.
#[derive(Debug)]
pub struct JobRecord<H> {
    /// Submission index, unique within one dispatcher.
    pub index: usize,
    pub handle: H,
    pub overrides: OverrideSet,
    pub trial: Trial,
    phase: RecordPhase,
}

impl<H: JobHandle> JobRecord<H> {
    pub fn new(index: usize, handle: H, overrides: OverrideSet, trial: Trial) -> Self {
        Self {
            index,
            handle,
            overrides,
            trial,
            phase: RecordPhase::Running,
        }
    }

    pub fn phase(&self) -> RecordPhase {
        self.phase
    }

    pub fn done(&self) -> bool {
        self.handle.done()
    }

    pub fn mark_finished(&mut self) {
        assert_eq!(self.phase, RecordPhase::Running, "record finished twice");
        self.phase = RecordPhase::Finished;
    }

    pub fn view(&self) -> JobView<'_> {
        JobView {
            index: self.index,
            handle: &self.handle,
            overrides: &self.overrides,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::{CellHandle, JobCell};
    use sl_types::Configuration;

    fn record() -> JobRecord<CellHandle> {
        JobRecord::new(
            0,
            CellHandle::new("job-0", JobCell::new()),
            OverrideSet::new(),
            Trial::new(Configuration::new()),
        )
    }

    #[test]
    fn finishing_moves_phase_forward() {
        let mut record = record();
        assert_eq!(record.phase(), RecordPhase::Running);
        record.mark_finished();
        assert_eq!(record.phase(), RecordPhase::Finished);
    }

    #[test]
    #[should_panic(expected = "record finished twice")]
    fn finishing_twice_panics() {
        let mut record = record();
        record.mark_finished();
        record.mark_finished();
    }
}
