//! External collaborators behind each pipeline step.
//!
//! The core only sees these traits. The default implementations shell out
//! to command-line tools ([`process::ToolCommand`]) or call HTTP APIs;
//! tests swap in stubs through the `with_*` builders on [`Collaborators`].

pub mod audio;
pub mod dedup;
pub mod process;
pub mod source;
pub mod stems;
pub mod transcribe;
pub mod translate;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::{Config, TranslationService};
use crate::error::CollaboratorError;
use crate::worker::JobSource;

pub use audio::FfmpegExtractor;
pub use process::{ToolCommand, ToolOutput};
pub use source::{LocalFileResolver, SourceResolver, YtDlpResolver};
pub use stems::{write_silent_stems, write_silent_track, DemucsSeparator};
pub use transcribe::{format_whisper_model_name, WhisperCliTranscriber};
pub use translate::{translated_path, translate_texts_parallel, HttpTranslator};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedVideo {
    pub path: PathBuf,
    /// Sanitized title, used as the working folder name.
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stems {
    pub vocals: PathBuf,
    pub accompaniment: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translation {
    pub path: PathBuf,
    pub content: String,
}

pub trait VideoSourceResolver: Send + Sync {
    fn resolve(&self, source: &JobSource, download_dir: &Path)
        -> Result<ResolvedVideo, CollaboratorError>;
}

pub trait AudioExtractor: Send + Sync {
    fn extract(&self, video: &Path, audio_out: &Path) -> Result<PathBuf, CollaboratorError>;
}

pub trait StemSeparator: Send + Sync {
    fn separate(&self, audio: &Path, out_dir: &Path, use_gpu: bool)
        -> Result<Stems, CollaboratorError>;
}

pub trait Transcriber: Send + Sync {
    /// Writes the subtitle siblings of `base` and returns `base`.
    fn transcribe(
        &self,
        audio: &Path,
        base: &Path,
        model: &str,
        use_gpu: bool,
    ) -> Result<PathBuf, CollaboratorError>;
}

pub trait Translator: Send + Sync {
    fn translate(
        &self,
        srt: &Path,
        target_language: &str,
        service: TranslationService,
    ) -> Result<Translation, CollaboratorError>;
}

/// The full set of collaborators one coordinator hands to its jobs.
#[derive(Clone)]
pub struct Collaborators {
    pub resolver: Arc<dyn VideoSourceResolver>,
    pub extractor: Arc<dyn AudioExtractor>,
    pub separator: Arc<dyn StemSeparator>,
    pub transcriber: Arc<dyn Transcriber>,
    pub translator: Arc<dyn Translator>,
}

impl Collaborators {
    pub fn new(
        resolver: Arc<dyn VideoSourceResolver>,
        extractor: Arc<dyn AudioExtractor>,
        separator: Arc<dyn StemSeparator>,
        transcriber: Arc<dyn Transcriber>,
        translator: Arc<dyn Translator>,
    ) -> Self {
        Self {
            resolver,
            extractor,
            separator,
            transcriber,
            translator,
        }
    }

    /// Tool-backed defaults. Keys are resolved lazily, per translation.
    pub fn from_config(config: &Config) -> Result<Self, CollaboratorError> {
        Ok(Self::new(
            Arc::new(SourceResolver::default()),
            Arc::new(FfmpegExtractor::default()),
            Arc::new(DemucsSeparator::default()),
            Arc::new(WhisperCliTranscriber::default()),
            Arc::new(
                HttpTranslator::new(config.deepl.clone(), config.openai.clone())?
                    .with_segment_workers(config.translation_workers),
            ),
        ))
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn VideoSourceResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn AudioExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_separator(mut self, separator: Arc<dyn StemSeparator>) -> Self {
        self.separator = separator;
        self
    }

    pub fn with_transcriber(mut self, transcriber: Arc<dyn Transcriber>) -> Self {
        self.transcriber = transcriber;
        self
    }

    pub fn with_translator(mut self, translator: Arc<dyn Translator>) -> Self {
        self.translator = translator;
        self
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
