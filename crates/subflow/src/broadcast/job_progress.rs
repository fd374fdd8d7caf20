//! Job progress broadcaster for real-time job status streaming.
//!
//! Lossy by design of `tokio::sync::broadcast`: a slow subscriber sees
//! `Lagged` and skips ahead. Consumers that need every event use the job's
//! own `ProgressReporter` instead.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Phase of a subtitle job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    Queued,
    Preparing,
    Downloading,
    Locating,
    ExtractingAudio,
    SeparatingStems,
    Transcribing,
    Translating,
    Finalizing,
    Done,
    Cancelled,
    Failed,
}

impl JobPhase {
    /// Position in the forward-only phase sequence. `Downloading` and
    /// `Locating` are alternatives and share a rank.
    pub fn rank(&self) -> u8 {
        match self {
            JobPhase::Queued => 0,
            JobPhase::Preparing => 1,
            JobPhase::Downloading | JobPhase::Locating => 2,
            JobPhase::ExtractingAudio => 3,
            JobPhase::SeparatingStems => 4,
            JobPhase::Transcribing => 5,
            JobPhase::Translating => 6,
            JobPhase::Finalizing => 7,
            JobPhase::Done | JobPhase::Cancelled | JobPhase::Failed => 8,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobPhase::Done | JobPhase::Cancelled | JobPhase::Failed)
    }

    /// Forward-only: a later rank, or any terminal phase from a live one.
    pub fn can_advance_to(&self, next: JobPhase) -> bool {
        if self.is_terminal() {
            return false;
        }
        next.is_terminal() || next.rank() > self.rank()
    }
}

impl std::fmt::Display for JobPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobPhase::Queued => write!(f, "Queued"),
            JobPhase::Preparing => write!(f, "Preparing"),
            JobPhase::Downloading => write!(f, "Downloading video"),
            JobPhase::Locating => write!(f, "Locating video"),
            JobPhase::ExtractingAudio => write!(f, "Extracting audio"),
            JobPhase::SeparatingStems => write!(f, "Separating stems"),
            JobPhase::Transcribing => write!(f, "Transcribing"),
            JobPhase::Translating => write!(f, "Translating"),
            JobPhase::Finalizing => write!(f, "Finalizing"),
            JobPhase::Done => write!(f, "Done"),
            JobPhase::Cancelled => write!(f, "Cancelled"),
            JobPhase::Failed => write!(f, "Failed"),
        }
    }
}

/// Status of a job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Processing,
    Completed,
    Cancelled,
    Failed,
}

impl From<JobPhase> for JobStatus {
    fn from(phase: JobPhase) -> Self {
        match phase {
            JobPhase::Done => JobStatus::Completed,
            JobPhase::Cancelled => JobStatus::Cancelled,
            JobPhase::Failed => JobStatus::Failed,
            _ => JobStatus::Processing,
        }
    }
}

/// Progress event for a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProgressEvent {
    pub job_id: String,
    /// Sanitized video title, or the raw source until it is resolved.
    pub title: String,
    pub phase: JobPhase,
    pub status: JobStatus,
    pub percent: u8,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    /// Folder holding the final subtitles (set on completion).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_folder: Option<String>,
    /// Error message (set on failure).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobProgressEvent {
    pub fn new(job_id: &str, title: &str, phase: JobPhase, percent: u8, message: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            title: title.to_string(),
            phase,
            status: JobStatus::from(phase),
            percent,
            message: message.to_string(),
            timestamp: Utc::now(),
            result_folder: None,
            error: None,
        }
    }
}

/// Broadcasts job progress events for streaming.
#[derive(Clone)]
pub struct JobProgressBroadcaster {
    sender: Arc<broadcast::Sender<JobProgressEvent>>,
}

impl JobProgressBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn send(&self, event: JobProgressEvent) {
        // No active receivers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobProgressEvent> {
        self.sender.subscribe()
    }

    /// Creates a tracker for one job and announces it as queued.
    pub fn start_job(&self, job_id: &str, title: &str) -> JobProgressTracker {
        let tracker = JobProgressTracker::new(job_id, title, Arc::clone(&self.sender));
        tracker.announce(JobPhase::Queued, "Job queued for processing");
        tracker
    }
}

impl Default for JobProgressBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}

/// Tracks progress for a single job. Progress updates are stamped with the
/// last phase announced.
pub struct JobProgressTracker {
    job_id: String,
    title: Mutex<String>,
    phase: Mutex<JobPhase>,
    percent: AtomicU8,
    sender: Arc<broadcast::Sender<JobProgressEvent>>,
}

impl JobProgressTracker {
    pub fn new(
        job_id: &str,
        title: &str,
        sender: Arc<broadcast::Sender<JobProgressEvent>>,
    ) -> Self {
        Self {
            job_id: job_id.to_string(),
            title: Mutex::new(title.to_string()),
            phase: Mutex::new(JobPhase::Queued),
            percent: AtomicU8::new(0),
            sender,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn set_title(&self, title: &str) {
        *self.title.lock().unwrap_or_else(|e| e.into_inner()) = title.to_string();
    }

    pub fn phase(&self) -> JobPhase {
        *self.phase.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn event(&self, phase: JobPhase, message: &str) -> JobProgressEvent {
        let title = self.title.lock().unwrap_or_else(|e| e.into_inner()).clone();
        JobProgressEvent::new(
            &self.job_id,
            &title,
            phase,
            self.percent.load(Ordering::Relaxed),
            message,
        )
    }

    /// Records `phase` as current and broadcasts it.
    pub fn announce(&self, phase: JobPhase, message: &str) {
        *self.phase.lock().unwrap_or_else(|e| e.into_inner()) = phase;
        let _ = self.sender.send(self.event(phase, message));
    }

    pub fn update_progress(&self, percent: u8, message: &str) {
        self.percent.store(percent, Ordering::Relaxed);
        let _ = self.sender.send(self.event(self.phase(), message));
    }

    pub fn completed(&self, result_folder: &str) {
        *self.phase.lock().unwrap_or_else(|e| e.into_inner()) = JobPhase::Done;
        self.percent.store(100, Ordering::Relaxed);
        let mut event = self.event(JobPhase::Done, "Processing completed successfully");
        event.result_folder = Some(result_folder.to_string());
        let _ = self.sender.send(event);
    }

    pub fn cancelled(&self) {
        self.announce(JobPhase::Cancelled, "Processing cancelled");
    }

    pub fn failed(&self, error: &str) {
        *self.phase.lock().unwrap_or_else(|e| e.into_inner()) = JobPhase::Failed;
        let mut event = self.event(JobPhase::Failed, "Processing failed");
        event.error = Some(error.to_string());
        let _ = self.sender.send(event);
    }
}
