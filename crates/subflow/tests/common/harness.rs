//! Isolated environment for running whole jobs against stub collaborators.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use subflow::collaborators::{Collaborators, LocalFileResolver};
use subflow::config::{Config, ConcurrencySetting, TranslationService};
use subflow::PipelineCoordinator;

use super::stubs::{Recorder, StubExtractor, StubSeparator, StubTranscriber, StubTranslator};

pub struct TestHarness {
    temp_dir: TempDir,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub recorder: Recorder,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let input_dir = temp_dir.path().join("input");
        let output_dir = temp_dir.path().join("output");
        std::fs::create_dir_all(&input_dir).expect("Failed to create input dir");

        Self {
            temp_dir,
            input_dir,
            output_dir,
            recorder: Recorder::default(),
        }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes a fake video into the input folder.
    pub fn write_video(&self, filename: &str) -> PathBuf {
        let path = self.input_dir.join(filename);
        std::fs::write(&path, b"not really a video").expect("Failed to write video");
        path
    }

    pub fn config(&self, concurrency: ConcurrencySetting) -> Config {
        Config {
            output_folder: self.output_dir.to_string_lossy().into_owned(),
            default_service: TranslationService::DeepL,
            concurrency,
            worker_count: 4,
            ..Config::default()
        }
    }

    /// Well-behaved stubs, all reporting to `self.recorder`.
    pub fn collaborators(&self) -> Collaborators {
        Collaborators::new(
            Arc::new(LocalFileResolver),
            Arc::new(StubExtractor::new(self.recorder.clone())),
            Arc::new(StubSeparator::new(self.recorder.clone())),
            Arc::new(StubTranscriber::new(self.recorder.clone())),
            Arc::new(StubTranslator::new(self.recorder.clone())),
        )
    }

    pub fn coordinator(
        &self,
        concurrency: ConcurrencySetting,
        collaborators: Collaborators,
    ) -> PipelineCoordinator {
        PipelineCoordinator::new(self.config(concurrency), collaborators)
    }

    /// `<output>/<title>`.
    pub fn job_folder(&self, title: &str) -> PathBuf {
        self.output_dir.join(title)
    }
}
