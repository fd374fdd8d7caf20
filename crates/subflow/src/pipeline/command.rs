//! Cancellation requests in, terminal outcomes out.
//!
//! One channel is shared by a coordinator and every job it runs. Commands
//! are addressed by job id; a job thread drains only its own commands at
//! each checkpoint. Outcomes are recorded once per job and fanned out to a
//! single consumer queue.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, error, info};
use serde::Serialize;

use crate::error::SchedulerError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Cancel { job_id: String },
}

impl Command {
    pub fn job_id(&self) -> &str {
        match self {
            Command::Cancel { job_id } => job_id,
        }
    }
}

/// Terminal record of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum Outcome {
    /// Folder holding the final subtitle files.
    Succeeded(PathBuf),
    Cancelled,
    Failed(String),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Succeeded(_))
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Succeeded(folder) => write!(f, "done ({})", folder.display()),
            Outcome::Cancelled => write!(f, "cancelled"),
            Outcome::Failed(message) => write!(f, "error: {}", message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutcomeNotification {
    pub job_id: String,
    pub outcome: Outcome,
}

#[derive(Default)]
struct ChannelState {
    commands: VecDeque<Command>,
    cancel_requested: HashSet<String>,
    outcomes: HashMap<String, Outcome>,
}

pub struct CommandChannel {
    state: Mutex<ChannelState>,
    outcome_tx: Sender<OutcomeNotification>,
    outcome_rx: Receiver<OutcomeNotification>,
}

impl Default for CommandChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandChannel {
    pub fn new() -> Self {
        let (outcome_tx, outcome_rx) = unbounded();
        Self {
            state: Mutex::new(ChannelState::default()),
            outcome_tx,
            outcome_rx,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ChannelState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queues a cancel command. Returns `false` when one was already
    /// requested for this job or the job has finished.
    pub fn request_cancel(&self, job_id: &str) -> bool {
        let mut state = self.lock();
        if state.outcomes.contains_key(job_id) {
            debug!("Ignoring cancel for finished job {}", job_id);
            return false;
        }
        if !state.cancel_requested.insert(job_id.to_string()) {
            debug!("Cancel already requested for job {}", job_id);
            return false;
        }
        state.commands.push_back(Command::Cancel {
            job_id: job_id.to_string(),
        });
        info!("Cancellation requested for job {}", job_id);
        true
    }

    pub fn is_cancel_requested(&self, job_id: &str) -> bool {
        self.lock().cancel_requested.contains(job_id)
    }

    /// Takes the oldest pending command for any job. Never blocks.
    pub fn poll_command(&self) -> Option<Command> {
        self.lock().commands.pop_front()
    }

    /// Takes the oldest pending command addressed to `job_id`.
    pub fn poll_command_for(&self, job_id: &str) -> Option<Command> {
        let mut state = self.lock();
        let position = state.commands.iter().position(|c| c.job_id() == job_id)?;
        state.commands.remove(position)
    }

    /// Drains this job's pending commands; `true` if one of them was a cancel.
    pub fn take_cancel(&self, job_id: &str) -> bool {
        let mut cancelled = false;
        while let Some(command) = self.poll_command_for(job_id) {
            match command {
                Command::Cancel { .. } => cancelled = true,
            }
        }
        cancelled
    }

    /// Records the job's terminal outcome. A second outcome for the same job
    /// is logged and dropped; the first one stands.
    pub fn post_outcome(&self, job_id: &str, outcome: Outcome) -> bool {
        let mut state = self.lock();
        if let Some(existing) = state.outcomes.get(job_id) {
            error!(
                "{} (kept '{}', dropped '{}')",
                SchedulerError::DuplicateOutcome(job_id.to_string()),
                existing,
                outcome
            );
            return false;
        }

        state.outcomes.insert(job_id.to_string(), outcome.clone());
        state.commands.retain(|c| c.job_id() != job_id);
        drop(state);

        info!("Job {} finished: {}", job_id, outcome);
        if self
            .outcome_tx
            .send(OutcomeNotification {
                job_id: job_id.to_string(),
                outcome,
            })
            .is_err()
        {
            error!("Outcome receiver dropped for job {}", job_id);
        }
        true
    }

    pub fn outcome_of(&self, job_id: &str) -> Option<Outcome> {
        self.lock().outcomes.get(job_id).cloned()
    }

    /// Blocks until the next outcome is posted.
    pub fn recv_outcome(&self) -> Option<OutcomeNotification> {
        self.outcome_rx.recv().ok()
    }

    pub fn recv_outcome_timeout(&self, timeout: Duration) -> Option<OutcomeNotification> {
        self.outcome_rx.recv_timeout(timeout).ok()
    }

    pub fn try_recv_outcome(&self) -> Option<OutcomeNotification> {
        self.outcome_rx.try_recv().ok()
    }
}
