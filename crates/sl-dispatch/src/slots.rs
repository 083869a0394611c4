/// Concurrency limit for in-flight jobs.
///
/// The pool never owns the jobs; callers pass the current occupancy and the
/// pool answers against its fixed capacity.
#[derive(Debug, Clone)]
pub struct SlotPool {
    n_jobs: usize,
    peak: usize,
}

impl SlotPool {
    pub fn new(n_jobs: usize) -> Self {
        Self { n_jobs, peak: 0 }
    }

    pub fn capacity(&self) -> usize {
        self.n_jobs
    }

    pub fn available(&self, occupied: usize) -> bool {
        occupied < self.n_jobs
    }

    pub fn free(&self, occupied: usize) -> usize {
        self.n_jobs.saturating_sub(occupied)
    }

    /// Record that occupancy grew to `occupied`.
    pub fn admit(&mut self, occupied: usize) {
        assert!(occupied <= self.n_jobs, "admitted beyond capacity");
        self.peak = self.peak.max(occupied);
    }

    /// Highest occupancy ever admitted.
    pub fn peak(&self) -> usize {
        self.peak
    }
}
