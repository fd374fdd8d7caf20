//! Broadcasting modules for real-time event streaming.
//!
//! Both broadcasters are lossy fan-outs meant for UIs watching many jobs at
//! once; per-job consumers that must see every update subscribe to the job's
//! `ProgressReporter`.

pub mod job_progress;
pub mod log_broadcaster;

pub use job_progress::{
    JobPhase, JobProgressBroadcaster, JobProgressEvent, JobProgressTracker, JobStatus,
};
pub use log_broadcaster::{LogBroadcaster, LogEvent};
