use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// One-way stop signal shared by every clone.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag {
    flag: Arc<AtomicBool>,
}

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the flag. Returns `true` only for the call that flipped it.
    pub fn cancel(&self) -> bool {
        !self.flag.swap(true, Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// What a running step polls at its checkpoints: the job's cancellation
/// flag plus the halt signal of the current scheduler run.
#[derive(Debug, Clone, Default)]
pub struct StopProbe {
    cancel: CancellationFlag,
    halt: CancellationFlag,
}

impl StopProbe {
    pub fn new(cancel: CancellationFlag, halt: CancellationFlag) -> Self {
        Self { cancel, halt }
    }

    pub fn should_stop(&self) -> bool {
        self.cancel.is_cancelled() || self.halt.is_cancelled()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn is_halted(&self) -> bool {
        self.halt.is_cancelled()
    }
}
