//! Percent bands and job phases for the standard step graph.

use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::broadcast::job_progress::{JobPhase, JobProgressTracker};
use crate::pipeline::{ExecutionObserver, MilestoneBand, StepState};

use super::steps;

pub const PREPARING: u8 = 5;
pub const SOURCE_LOOKUP: u8 = 10;
pub const SOURCE_RESOLVED: u8 = 20;
pub const FOLDER_READY: u8 = 25;
pub const FINALIZING: u8 = 95;
pub const DONE: u8 = 100;

pub fn step_band(step: &str) -> Option<MilestoneBand> {
    let band = match step {
        steps::EXTRACT_AUDIO => MilestoneBand::new(25, 35),
        steps::SEPARATE_STEMS => MilestoneBand::new(35, 50),
        steps::TRANSCRIBE_MAIN => MilestoneBand::new(50, 65),
        steps::TRANSCRIBE_VOCAL => MilestoneBand::new(65, 75),
        steps::TRANSLATE_MAIN => MilestoneBand::new(75, 85),
        steps::TRANSLATE_VOCAL => MilestoneBand::new(85, 95),
        _ => return None,
    };
    Some(band)
}

pub fn step_phase(step: &str) -> Option<JobPhase> {
    match step {
        steps::EXTRACT_AUDIO => Some(JobPhase::ExtractingAudio),
        steps::SEPARATE_STEMS => Some(JobPhase::SeparatingStems),
        steps::TRANSCRIBE_MAIN | steps::TRANSCRIBE_VOCAL => Some(JobPhase::Transcribing),
        steps::TRANSLATE_MAIN | steps::TRANSLATE_VOCAL => Some(JobPhase::Translating),
        _ => None,
    }
}

/// Forward-only phase state of one job. Parallel branches that start an
/// earlier phase after a later one was reached are ignored.
pub struct PhaseMachine {
    phase: Mutex<JobPhase>,
    tracker: Option<Arc<JobProgressTracker>>,
}

impl PhaseMachine {
    pub fn new(tracker: Option<Arc<JobProgressTracker>>) -> Self {
        Self {
            phase: Mutex::new(JobPhase::Queued),
            tracker,
        }
    }

    pub fn current(&self) -> JobPhase {
        *self.phase.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Moves to `next` if that is forward. Terminal phases are left to the
    /// tracker's own `completed`/`cancelled`/`failed` calls.
    pub fn advance(&self, next: JobPhase, message: &str) -> bool {
        let mut phase = self.phase.lock().unwrap_or_else(|e| e.into_inner());
        if !phase.can_advance_to(next) {
            debug!(from = %*phase, to = %next, "ignoring backward phase change");
            return false;
        }
        *phase = next;
        drop(phase);

        if !next.is_terminal() {
            if let Some(tracker) = &self.tracker {
                tracker.announce(next, message);
            }
        }
        true
    }
}

impl ExecutionObserver for PhaseMachine {
    fn band(&self, step: &str) -> Option<MilestoneBand> {
        step_band(step)
    }

    fn step_started(&self, step: &str) {
        if let Some(phase) = step_phase(step) {
            self.advance(phase, &phase.to_string());
        }
    }

    fn step_finished(&self, step: &str, state: StepState) {
        debug!(step, state = %state, "step finished");
    }
}
