//! End-to-end subtitle jobs.
//!
//! [`PipelineCoordinator::submit`] validates a request, then runs the job
//! on its own thread: resolve the source, lay out the working folder, run
//! the standard step graph through a [`DependencyScheduler`] and copy the
//! translations to their final names. Every job ends with exactly one
//! [`Outcome`] on the shared [`CommandChannel`].

pub mod milestones;
pub mod steps;

use std::any::Any;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crossbeam_channel::Receiver;
use tracing::{error, info, info_span};

use crate::broadcast::job_progress::{JobPhase, JobProgressBroadcaster, JobProgressTracker};
use crate::collaborators::Collaborators;
use crate::config::Config;
use crate::error::{CollaboratorError, Result, StepFailure, WorkerError};
use crate::pipeline::{
    ArtifactStore, CancellationFlag, CommandChannel, DependencyScheduler, ExecutionOutcome,
    Outcome, ProgressEvent, ProgressReporter,
};
use crate::worker::{Job, JobSource, JobSpec};

use milestones::PhaseMachine;
use steps::JobPaths;

/// Pseudo-step name used for failures while resolving the source.
const RESOLVE_SOURCE: &str = "resolve_source";

pub struct PipelineCoordinator {
    config: Arc<Config>,
    collaborators: Collaborators,
    commands: Arc<CommandChannel>,
    broadcaster: Option<JobProgressBroadcaster>,
}

impl PipelineCoordinator {
    pub fn new(config: Config, collaborators: Collaborators) -> Self {
        Self {
            config: Arc::new(config),
            collaborators,
            commands: Arc::new(CommandChannel::new()),
            broadcaster: None,
        }
    }

    /// Also publish phase events for every job on `broadcaster`.
    pub fn with_broadcaster(mut self, broadcaster: JobProgressBroadcaster) -> Self {
        self.broadcaster = Some(broadcaster);
        self
    }

    /// Shares a command channel with other coordinators or consumers.
    pub fn with_commands(mut self, commands: Arc<CommandChannel>) -> Self {
        self.commands = commands;
        self
    }

    pub fn commands(&self) -> &Arc<CommandChannel> {
        &self.commands
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Validates `spec` and starts the job on a background thread.
    pub fn submit(&self, spec: JobSpec) -> Result<JobHandle> {
        let job = Job::from_spec(spec, &self.config)?;
        let job_id = job.id.clone();

        let tracker = self
            .broadcaster
            .as_ref()
            .map(|b| Arc::new(b.start_job(&job.id, &job.source.redacted())));
        let mut progress = ProgressReporter::new();
        if let Some(tracker) = &tracker {
            progress = progress.with_tracker(Arc::clone(tracker));
        }

        let run = JobRun {
            job,
            collaborators: self.collaborators.clone(),
            commands: Arc::clone(&self.commands),
            progress: progress.clone(),
            tracker,
        };

        let thread = thread::Builder::new()
            .name(format!("subflow-job-{}", job_id))
            .spawn(move || run.run())
            .map_err(|e| WorkerError::SpawnFailed(e.to_string()))?;

        Ok(JobHandle {
            job_id,
            progress,
            commands: Arc::clone(&self.commands),
            thread: Mutex::new(Some(thread)),
        })
    }

    /// Requests cancellation. `false` if already requested or finished.
    pub fn cancel(&self, handle: &JobHandle) -> bool {
        self.commands.request_cancel(handle.job_id())
    }
}

/// A submitted job.
pub struct JobHandle {
    job_id: String,
    progress: ProgressReporter,
    commands: Arc<CommandChannel>,
    thread: Mutex<Option<JoinHandle<Outcome>>>,
}

impl JobHandle {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Every progress event from now on. The first subscriber also gets
    /// the events published before it subscribed.
    pub fn progress(&self) -> Receiver<ProgressEvent> {
        self.progress.subscribe()
    }

    pub fn is_finished(&self) -> bool {
        self.thread
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_none_or(|t| t.is_finished())
    }

    /// Blocks until the job ends and returns its outcome.
    pub fn wait(&self) -> Outcome {
        let thread = self.thread.lock().unwrap_or_else(|e| e.into_inner()).take();

        match thread.map(|t| t.join()) {
            Some(Ok(outcome)) => outcome,
            Some(Err(_)) => {
                let outcome = Outcome::Failed("job thread panicked".to_string());
                self.commands.post_outcome(&self.job_id, outcome.clone());
                self.commands.outcome_of(&self.job_id).unwrap_or(outcome)
            }
            // Already joined: the channel holds the outcome.
            None => self
                .commands
                .outcome_of(&self.job_id)
                .unwrap_or_else(|| Outcome::Failed("job outcome unavailable".to_string())),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

struct JobRun {
    job: Job,
    collaborators: Collaborators,
    commands: Arc<CommandChannel>,
    progress: ProgressReporter,
    tracker: Option<Arc<JobProgressTracker>>,
}

impl JobRun {
    fn run(self) -> Outcome {
        let _span = info_span!(
            "job",
            job_id = %self.job.id,
            source = %self.job.source.redacted(),
            language = %self.job.target_language,
            service = %self.job.service
        )
        .entered();

        // A panicking collaborator outside the step runner must still end
        // the job with an outcome.
        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| self.execute())) {
            Ok(outcome) => outcome,
            Err(payload) => {
                let message = format!("job panicked: {}", panic_message(payload.as_ref()));
                error!(error = %message, "job thread panicked");
                Outcome::Failed(message)
            }
        };

        if let Some(tracker) = &self.tracker {
            match &outcome {
                Outcome::Succeeded(folder) => tracker.completed(&folder.display().to_string()),
                Outcome::Cancelled => tracker.cancelled(),
                Outcome::Failed(message) => tracker.failed(message),
            }
        }

        self.commands.post_outcome(&self.job.id, outcome.clone());
        outcome
    }

    fn cancel_checkpoint(&self, cancel: &CancellationFlag) -> bool {
        if self.commands.take_cancel(&self.job.id) {
            cancel.cancel();
        }
        cancel.is_cancelled()
    }

    fn execute(&self) -> Outcome {
        let job = &self.job;
        let phases = Arc::new(PhaseMachine::new(self.tracker.clone()));
        let cancel = CancellationFlag::new();

        phases.advance(JobPhase::Preparing, "Preparing");
        self.progress.publish(milestones::PREPARING.into(), "Preparing");
        if self.cancel_checkpoint(&cancel) {
            return Outcome::Cancelled;
        }

        let lookup = match job.source {
            JobSource::Url(_) => JobPhase::Downloading,
            JobSource::File(_) => JobPhase::Locating,
        };
        phases.advance(lookup, &lookup.to_string());
        self.progress
            .publish(milestones::SOURCE_LOOKUP.into(), lookup.to_string());

        let resolved = match self
            .collaborators
            .resolver
            .resolve(&job.source, &job.output_folder)
        {
            Ok(resolved) => resolved,
            Err(e) => {
                let failure = StepFailure::new(RESOLVE_SOURCE, e);
                error!(error = %failure, "could not resolve source");
                return Outcome::Failed(failure.to_string());
            }
        };
        if let Some(tracker) = &self.tracker {
            tracker.set_title(&resolved.title);
        }
        info!(title = %resolved.title, "source resolved");
        self.progress.publish(
            milestones::SOURCE_RESOLVED.into(),
            format!("Resolved '{}'", resolved.title),
        );

        if self.cancel_checkpoint(&cancel) {
            return Outcome::Cancelled;
        }

        let paths = JobPaths::new(job.output_folder.join(&resolved.title), &resolved.title);
        if let Err(e) = fs::create_dir_all(&paths.folder) {
            let failure = StepFailure::new(RESOLVE_SOURCE, CollaboratorError::io(&paths.folder, e));
            return Outcome::Failed(failure.to_string());
        }
        self.progress
            .publish(milestones::FOLDER_READY.into(), "Working folder ready");

        let artifacts = Arc::new(ArtifactStore::new());
        artifacts.seed(steps::VIDEO, &resolved.path);

        let runner = steps::standard_runner(job, &paths, &self.collaborators);
        let scheduler = DependencyScheduler::new(Arc::new(runner), Arc::clone(&artifacts))
            .with_progress(self.progress.clone())
            .with_cancellation(cancel)
            .with_commands(Arc::clone(&self.commands))
            .with_observer(phases.clone());

        let report = scheduler.execute(&steps::standard_graph(), job.concurrency);

        match report.outcome {
            ExecutionOutcome::Completed => self.finalize(&phases, &paths, &artifacts),
            ExecutionOutcome::Cancelled => Outcome::Cancelled,
            ExecutionOutcome::Failed(message) => Outcome::Failed(message),
        }
    }

    fn finalize(&self, phases: &PhaseMachine, paths: &JobPaths, artifacts: &ArtifactStore) -> Outcome {
        phases.advance(JobPhase::Finalizing, "Finalizing");
        self.progress
            .publish(milestones::FINALIZING.into(), "Finalizing subtitles");

        match steps::finalize(&self.job.target_language, paths, artifacts) {
            Ok(written) => {
                info!(files = written.len(), folder = %paths.folder.display(), "subtitles written");
                self.progress.publish(milestones::DONE.into(), "Done");
                Outcome::Succeeded(PathBuf::from(&paths.folder))
            }
            Err(failure) => {
                error!(error = %failure, "finalization failed");
                Outcome::Failed(failure.to_string())
            }
        }
    }
}
