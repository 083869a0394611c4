use sl_types::{Trial, TrialResult};

/// Log target for optimizer interaction, filtered separately from the rest
/// of the sweep by `logging.optimizer_level`.
pub const OPTIMIZER_LOG_TARGET: &str = "sl_sweep::optimizer";

/// Ask/tell interface of an optimizer driving a sweep.
///
/// The sweep asks for trials while it has free slots and tells every result
/// back exactly once, in completion order.
pub trait Optimizer: Send {
    /// Human-readable optimizer name.
    fn name(&self) -> &str;

    /// Next trial to evaluate, or `None` when the optimizer is exhausted.
    fn ask(&mut self) -> Option<Trial>;

    /// Report the result of a trial previously returned by [`ask`](Self::ask).
    fn tell(&mut self, trial: &Trial, result: &TrialResult);
}

impl<O: Optimizer + ?Sized> Optimizer for Box<O> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn ask(&mut self) -> Option<Trial> {
        (**self).ask()
    }

    fn tell(&mut self, trial: &Trial, result: &TrialResult) {
        (**self).tell(trial, result)
    }
}
