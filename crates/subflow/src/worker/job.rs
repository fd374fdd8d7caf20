use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::config::schema::{is_valid_language_code, language_code, Config, TranslationService};
use crate::error::InputError;
use crate::pipeline::ConcurrencyMode;
use crate::sanitize;

/// Where a job's video comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobSource {
    Url(String),
    File(PathBuf),
}

impl JobSource {
    pub fn is_url(&self) -> bool {
        matches!(self, JobSource::Url(_))
    }

    /// Log-safe form: URL without credentials or query, file name only.
    pub fn redacted(&self) -> String {
        match self {
            JobSource::Url(url) => sanitize::redact_url(url),
            JobSource::File(path) => sanitize::redact_path(path),
        }
    }
}

impl std::fmt::Display for JobSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobSource::Url(url) => write!(f, "{}", url),
            JobSource::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// A caller's request. Unset options fall back to the configuration.
#[derive(Debug, Clone, Default)]
pub struct JobSpec {
    pub url: Option<String>,
    pub file: Option<PathBuf>,
    pub target_language: Option<String>,
    pub service: Option<TranslationService>,
    pub use_gpu: Option<bool>,
    pub concurrency: Option<ConcurrencyMode>,
}

impl JobSpec {
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self {
            file: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.target_language = Some(language.into());
        self
    }

    pub fn service(mut self, service: TranslationService) -> Self {
        self.service = Some(service);
        self
    }

    pub fn gpu(mut self, use_gpu: bool) -> Self {
        self.use_gpu = Some(use_gpu);
        self
    }

    pub fn concurrency(mut self, mode: ConcurrencyMode) -> Self {
        self.concurrency = Some(mode);
        self
    }
}

/// One validated pipeline invocation. Immutable once created.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    pub source: JobSource,
    /// Language code, e.g. `FR`.
    pub target_language: String,
    pub service: TranslationService,
    pub use_gpu: bool,
    pub whisper_model: String,
    pub concurrency: ConcurrencyMode,
    pub output_folder: PathBuf,
    pub created_at: DateTime<Utc>,
}

impl Job {
    pub fn from_spec(spec: JobSpec, config: &Config) -> Result<Self, InputError> {
        let url = spec
            .url
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty());
        let file = spec.file.filter(|p| !p.as_os_str().is_empty());

        let source = match (url, file) {
            (Some(_), Some(_)) => return Err(InputError::AmbiguousSource),
            (Some(url), None) => JobSource::Url(url),
            (None, Some(path)) => JobSource::File(path),
            (None, None) => return Err(InputError::NoSource),
        };

        let target_language = match spec.target_language {
            Some(label) => language_code(&label).to_string(),
            None => config.default_language_code().to_string(),
        };
        if target_language.is_empty() {
            return Err(InputError::NoTargetLanguage);
        }
        if !is_valid_language_code(&target_language) {
            return Err(InputError::InvalidLanguage(target_language));
        }

        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            source,
            target_language,
            service: spec.service.unwrap_or(config.default_service),
            use_gpu: spec.use_gpu.unwrap_or(config.use_gpu),
            whisper_model: config.whisper_model.clone(),
            concurrency: spec.concurrency.unwrap_or_else(|| config.concurrency_mode()),
            output_folder: config.output_path(),
            created_at: Utc::now(),
        })
    }
}
