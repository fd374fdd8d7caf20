use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SubflowError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid job request: {0}")]
    Input(#[from] InputError),

    #[error("Step failed: {0}")]
    Step(#[from] StepFailure),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Secret error: {0}")]
    Secret(#[from] crate::secrets::SecretError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },
}

/// Rejections raised by `submit` before any step runs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("Please provide a URL or select a video file")]
    NoSource,

    #[error("Provide either a URL or a video file, not both")]
    AmbiguousSource,

    #[error("No target language specified")]
    NoTargetLanguage,

    #[error("Invalid target language code '{0}'")]
    InvalidLanguage(String),
}

/// Errors raised by the external collaborators behind each step.
#[derive(Error, Debug)]
pub enum CollaboratorError {
    #[error("Download failed for '{url}': {reason}")]
    Download { url: String, reason: String },

    #[error("File not found: {0}")]
    NotFound(PathBuf),

    #[error("Audio extraction failed: {0}")]
    Extraction(String),

    #[error("Stem separation failed: {0}")]
    Separation(String),

    #[error("Transcription failed: {0}")]
    Transcription(String),

    #[error("Translation failed: {0}")]
    Translation(String),

    #[error("Translation service returned HTTP {status}: {body}")]
    TranslationHttp { status: u16, body: String },

    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CollaboratorError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CollaboratorError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Why a step did not produce its artifacts.
#[derive(Error, Debug)]
pub enum StepFailureCause {
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),

    #[error("missing input artifact '{0}'")]
    MissingInput(String),

    #[error("produced undeclared artifact '{0}'")]
    UndeclaredOutput(String),

    #[error("did not produce declared artifact '{0}'")]
    MissingOutput(String),

    #[error("no action registered")]
    Unregistered,

    #[error("step panicked")]
    Panicked,

    #[error("stopped at checkpoint")]
    Stopped,
}

#[derive(Error, Debug)]
#[error("{step}: {cause}")]
pub struct StepFailure {
    pub step: String,
    #[source]
    pub cause: StepFailureCause,
}

impl StepFailure {
    pub fn new(step: impl Into<String>, cause: impl Into<StepFailureCause>) -> Self {
        Self {
            step: step.into(),
            cause: cause.into(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("Dependency cycle detected among steps: {0}")]
    Cycle(String),

    #[error("Step '{step}' depends on unknown step '{dependency}'")]
    UnknownDependency { step: String, dependency: String },

    #[error("Duplicate step name: {0}")]
    DuplicateStep(String),

    #[error("Artifact '{key}' is declared as output of both '{first}' and '{second}'")]
    DuplicateOutput {
        key: String,
        first: String,
        second: String,
    },

    #[error("Outcome already posted for job {0}")]
    DuplicateOutcome(String),
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Failed to spawn worker: {0}")]
    SpawnFailed(String),

    #[error("Worker channel closed unexpectedly")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, SubflowError>;
