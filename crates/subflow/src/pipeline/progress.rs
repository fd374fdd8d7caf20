use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::Serialize;
use tracing::debug;

use crate::broadcast::job_progress::JobProgressTracker;

/// One progress update. Percent is already clamped to `0..=100`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub percent: u8,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Default)]
struct Subscribers {
    senders: Vec<Sender<ProgressEvent>>,
    /// Events published before anyone subscribed. Handed over, then `None`.
    backlog: Option<Vec<ProgressEvent>>,
}

/// Lossless progress fan-out for one job.
///
/// Each subscriber gets its own unbounded channel and sees every event
/// published after it subscribed. The first subscriber also receives
/// whatever was published before it arrived.
#[derive(Clone)]
pub struct ProgressReporter {
    subscribers: Arc<Mutex<Subscribers>>,
    tracker: Option<Arc<JobProgressTracker>>,
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Subscribers {
                senders: Vec::new(),
                backlog: Some(Vec::new()),
            })),
            tracker: None,
        }
    }

    /// Also forwards every event to a lossy job broadcaster.
    pub fn with_tracker(mut self, tracker: Arc<JobProgressTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn tracker(&self) -> Option<&Arc<JobProgressTracker>> {
        self.tracker.as_ref()
    }

    pub fn publish(&self, percent: u32, message: impl Into<String>) {
        let event = ProgressEvent {
            percent: percent.min(100) as u8,
            message: message.into(),
            timestamp: Utc::now(),
        };
        debug!(percent = event.percent, message = %event.message, "progress");

        if let Some(tracker) = &self.tracker {
            tracker.update_progress(event.percent, &event.message);
        }

        let mut subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(backlog) = subscribers.backlog.as_mut() {
            backlog.push(event);
            return;
        }
        subscribers
            .senders
            .retain(|sender| sender.send(event.clone()).is_ok());
    }

    pub fn subscribe(&self) -> Receiver<ProgressEvent> {
        let (sender, receiver) = unbounded();
        let mut subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(backlog) = subscribers.backlog.take() {
            for event in backlog {
                // The receiver is alive: we still hold it.
                let _ = sender.send(event);
            }
        }
        subscribers.senders.push(sender);
        receiver
    }
}
