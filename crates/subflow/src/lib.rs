//! Dependency-aware coordinator for a video subtitling pipeline.
//!
//! A job acquires a video, extracts its audio, splits vocals from the
//! accompaniment, transcribes both tracks and translates the transcripts.
//! The steps form a small graph run by [`pipeline::DependencyScheduler`],
//! either sequentially or on a bounded worker pool, with cooperative
//! cancellation and percent progress. The external tools sit behind the
//! traits in [`collaborators`].

pub mod broadcast;
pub mod collaborators;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod sanitize;
pub mod secrets;
pub mod subtitles;
pub mod worker;

pub use broadcast::{JobPhase, JobProgressBroadcaster, JobProgressEvent, LogBroadcaster};
pub use collaborators::Collaborators;
pub use config::{load_config, Config, TranslationService};
pub use coordinator::{JobHandle, PipelineCoordinator};
pub use error::{Result, SubflowError};
pub use pipeline::{ConcurrencyMode, Outcome, ProgressEvent};
pub use worker::{Job, JobSource, JobSpec};
