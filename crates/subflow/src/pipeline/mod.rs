pub mod artifacts;
pub mod cancel;
pub mod command;
pub mod graph;
pub mod progress;
pub mod runner;
pub mod scheduler;
pub mod step;

pub use artifacts::{ArtifactDelta, ArtifactStore, ArtifactView};
pub use cancel::{CancellationFlag, StopProbe};
pub use command::{Command, CommandChannel, Outcome, OutcomeNotification};
pub use graph::StepGraph;
pub use progress::{ProgressEvent, ProgressReporter};
pub use runner::{StepAction, StepContext, StepRunner};
pub use scheduler::{
    DependencyScheduler, ExecutionObserver, ExecutionOutcome, ExecutionReport, MilestoneBand,
    NoopObserver,
};
pub use step::{StepDefinition, StepState};

use crate::config::schema::default_worker_count;

/// How a step graph is executed within one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConcurrencyMode {
    /// Topological order, one step at a time, on the calling thread.
    Sequential,
    /// Up to `n` steps at once on a dedicated pool. `0` behaves as `1`.
    BoundedParallel(usize),
}

impl ConcurrencyMode {
    pub fn worker_count(&self) -> usize {
        match self {
            ConcurrencyMode::Sequential => 1,
            ConcurrencyMode::BoundedParallel(n) => (*n).max(1),
        }
    }
}

impl Default for ConcurrencyMode {
    fn default() -> Self {
        ConcurrencyMode::BoundedParallel(default_worker_count())
    }
}

impl std::fmt::Display for ConcurrencyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConcurrencyMode::Sequential => write!(f, "sequential"),
            ConcurrencyMode::BoundedParallel(n) => write!(f, "parallel({})", n),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::MAX_WORKERS;

    #[test]
    fn test_worker_count_bounds() {
        assert_eq!(ConcurrencyMode::Sequential.worker_count(), 1);
        assert_eq!(ConcurrencyMode::BoundedParallel(0).worker_count(), 1);
        assert_eq!(ConcurrencyMode::BoundedParallel(3).worker_count(), 3);
    }

    #[test]
    fn test_default_is_parallel() {
        assert!(matches!(
            ConcurrencyMode::default(),
            ConcurrencyMode::BoundedParallel(n) if (1..=MAX_WORKERS).contains(&n)
        ));
    }
}
