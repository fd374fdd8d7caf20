//! The standard subtitle graph and the actions behind each step.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::collaborators::{format_whisper_model_name, write_silent_stems, Collaborators};
use crate::config::TranslationService;
use crate::error::{CollaboratorError, StepFailure, StepFailureCause};
use crate::pipeline::{ArtifactDelta, ArtifactStore, StepContext, StepDefinition, StepGraph, StepRunner};
use crate::subtitles::with_extension;
use crate::worker::Job;

pub const EXTRACT_AUDIO: &str = "extract_audio";
pub const SEPARATE_STEMS: &str = "separate_stems";
pub const TRANSCRIBE_MAIN: &str = "transcribe_main";
pub const TRANSCRIBE_VOCAL: &str = "transcribe_vocal";
pub const TRANSLATE_MAIN: &str = "translate_main";
pub const TRANSLATE_VOCAL: &str = "translate_vocal";
pub const FINALIZE: &str = "finalize";

pub const VIDEO: &str = "video";
pub const AUDIO: &str = "audio";
pub const VOCALS: &str = "vocals";
pub const ACCOMPANIMENT: &str = "accompaniment";
pub const TRANSCRIPT_MAIN: &str = "transcript_main";
pub const TRANSCRIPT_VOCAL: &str = "transcript_vocal";
pub const TRANSLATION_MAIN: &str = "translation_main";
pub const TRANSLATION_VOCAL: &str = "translation_vocal";

pub fn standard_graph() -> StepGraph {
    StepGraph::new()
        .with_step(
            StepDefinition::new(EXTRACT_AUDIO)
                .inputs([VIDEO])
                .outputs([AUDIO])
                .idempotent(true),
        )
        .with_step(
            StepDefinition::new(SEPARATE_STEMS)
                .depends_on([EXTRACT_AUDIO])
                .inputs([AUDIO])
                .outputs([VOCALS, ACCOMPANIMENT])
                .idempotent(true),
        )
        .with_step(
            StepDefinition::new(TRANSCRIBE_MAIN)
                .depends_on([EXTRACT_AUDIO])
                .inputs([AUDIO])
                .outputs([TRANSCRIPT_MAIN])
                .idempotent(true),
        )
        .with_step(
            StepDefinition::new(TRANSCRIBE_VOCAL)
                .depends_on([SEPARATE_STEMS])
                .inputs([VOCALS])
                .outputs([TRANSCRIPT_VOCAL])
                .idempotent(true),
        )
        .with_step(
            StepDefinition::new(TRANSLATE_MAIN)
                .depends_on([TRANSCRIBE_MAIN])
                .inputs([TRANSCRIPT_MAIN])
                .outputs([TRANSLATION_MAIN]),
        )
        .with_step(
            StepDefinition::new(TRANSLATE_VOCAL)
                .depends_on([TRANSCRIBE_VOCAL])
                .inputs([TRANSCRIPT_VOCAL])
                .outputs([TRANSLATION_VOCAL]),
        )
}

/// File layout inside one job's working folder.
#[derive(Debug, Clone)]
pub struct JobPaths {
    pub folder: PathBuf,
    pub title: String,
}

impl JobPaths {
    pub fn new(folder: impl Into<PathBuf>, title: impl Into<String>) -> Self {
        Self {
            folder: folder.into(),
            title: title.into(),
        }
    }

    pub fn audio(&self) -> PathBuf {
        self.folder.join(format!("{}.mp3", self.title))
    }

    pub fn separated_dir(&self) -> PathBuf {
        self.folder.join("separated")
    }

    pub fn transcript_base(&self) -> PathBuf {
        self.folder.join(&self.title)
    }

    pub fn vocal_transcript_base(&self) -> PathBuf {
        self.folder.join(format!("{}_vocal", self.title))
    }

    /// `FR_<title>_FR.srt` or `FR_<title>_vocal_FR.srt`.
    pub fn final_translation(&self, language: &str, vocal: bool) -> PathBuf {
        let middle = if vocal {
            format!("{}_vocal", self.title)
        } else {
            self.title.clone()
        };
        self.folder
            .join(format!("{}_{}_{}.srt", language, middle, language))
    }
}

fn checkpoint(ctx: &StepContext) -> Result<(), StepFailureCause> {
    if ctx.should_stop() {
        debug!(step = ctx.step_name(), "stopping at checkpoint");
        return Err(StepFailureCause::Stopped);
    }
    Ok(())
}

/// Registers every standard step against `collaborators`.
pub fn standard_runner(job: &Job, paths: &JobPaths, collaborators: &Collaborators) -> StepRunner {
    let use_gpu = job.use_gpu;
    let model = format_whisper_model_name(&job.whisper_model);

    let mut runner = StepRunner::new(&job.id, &paths.folder);

    let extractor = Arc::clone(&collaborators.extractor);
    let audio_out = paths.audio();
    runner.register(
        EXTRACT_AUDIO,
        move |ctx: &StepContext| -> Result<ArtifactDelta, StepFailureCause> {
            let video = ctx.input(VIDEO)?;
            let audio = extractor.extract(video, &audio_out)?;
            Ok(ArtifactDelta::new().with(AUDIO, audio))
        },
    );

    let separator = Arc::clone(&collaborators.separator);
    let stems_dir = paths.separated_dir();
    runner.register(
        SEPARATE_STEMS,
        move |ctx: &StepContext| -> Result<ArtifactDelta, StepFailureCause> {
            checkpoint(ctx)?;
            let audio = ctx.input(AUDIO)?;
            fs::create_dir_all(&stems_dir).map_err(|e| CollaboratorError::io(&stems_dir, e))?;

            let stems = match separator.separate(audio, &stems_dir, use_gpu) {
                Ok(stems) => stems,
                Err(e) => {
                    warn!(error = %e, "stem separation failed, using silent placeholder tracks");
                    write_silent_stems(&stems_dir)?
                }
            };
            Ok(ArtifactDelta::new()
                .with(VOCALS, stems.vocals)
                .with(ACCOMPANIMENT, stems.accompaniment))
        },
    );

    for (step, input, output, base) in [
        (TRANSCRIBE_MAIN, AUDIO, TRANSCRIPT_MAIN, paths.transcript_base()),
        (TRANSCRIBE_VOCAL, VOCALS, TRANSCRIPT_VOCAL, paths.vocal_transcript_base()),
    ] {
        let transcriber = Arc::clone(&collaborators.transcriber);
        let model = model.clone();
        runner.register(
            step,
            move |ctx: &StepContext| -> Result<ArtifactDelta, StepFailureCause> {
                checkpoint(ctx)?;
                let audio = ctx.input(input)?;
                let base = transcriber.transcribe(audio, &base, &model, use_gpu)?;
                let srt = with_extension(&base, "srt");
                if !srt.is_file() {
                    return Err(CollaboratorError::Transcription(format!(
                        "no subtitle file at {}",
                        srt.display()
                    ))
                    .into());
                }
                Ok(ArtifactDelta::new().with(output, srt))
            },
        );
    }

    for (step, input, output) in [
        (TRANSLATE_MAIN, TRANSCRIPT_MAIN, TRANSLATION_MAIN),
        (TRANSLATE_VOCAL, TRANSCRIPT_VOCAL, TRANSLATION_VOCAL),
    ] {
        let translator = Arc::clone(&collaborators.translator);
        let language = job.target_language.clone();
        let service: TranslationService = job.service;
        runner.register(
            step,
            move |ctx: &StepContext| -> Result<ArtifactDelta, StepFailureCause> {
                checkpoint(ctx)?;
                let srt = ctx.input(input)?;
                let translation = translator.translate(srt, &language, service)?;
                if !translation.path.is_file() {
                    fs::write(&translation.path, &translation.content)
                        .map_err(|e| CollaboratorError::io(&translation.path, e))?;
                }
                Ok(ArtifactDelta::new().with(output, translation.path))
            },
        );
    }

    runner
}

/// Copies both translations to their final names. Returns the written paths.
pub fn finalize(
    language: &str,
    paths: &JobPaths,
    artifacts: &ArtifactStore,
) -> Result<Vec<PathBuf>, StepFailure> {
    let mut written = Vec::with_capacity(2);

    for (key, vocal) in [(TRANSLATION_MAIN, false), (TRANSLATION_VOCAL, true)] {
        let source = artifacts
            .get(key)
            .ok_or_else(|| StepFailure::new(FINALIZE, StepFailureCause::MissingInput(key.to_string())))?;
        let target = paths.final_translation(language, vocal);
        copy_translation(&source, &target)
            .map_err(|e| StepFailure::new(FINALIZE, e))?;
        written.push(target);
    }

    Ok(written)
}

fn copy_translation(source: &Path, target: &Path) -> Result<(), CollaboratorError> {
    if source == target {
        return Ok(());
    }
    fs::copy(source, target).map_err(|e| CollaboratorError::io(target, e))?;
    Ok(())
}
