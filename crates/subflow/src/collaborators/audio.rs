use std::path::{Path, PathBuf};

use super::process::ToolCommand;
use super::AudioExtractor;
use crate::error::CollaboratorError;

/// `ffmpeg -i <video> -q:a 0 -map a -y <audio>`.
#[derive(Debug, Clone)]
pub struct FfmpegExtractor {
    program: String,
}

impl Default for FfmpegExtractor {
    fn default() -> Self {
        Self::with_program("ffmpeg")
    }
}

impl FfmpegExtractor {
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl AudioExtractor for FfmpegExtractor {
    fn extract(&self, video: &Path, audio_out: &Path) -> Result<PathBuf, CollaboratorError> {
        if !video.is_file() {
            return Err(CollaboratorError::NotFound(video.to_path_buf()));
        }

        ToolCommand::new(&self.program)
            .arg("-i")
            .arg(video)
            .args(["-q:a", "0", "-map", "a", "-y"])
            .arg(audio_out)
            .execute_checked(CollaboratorError::Extraction)?;

        if !audio_out.is_file() {
            return Err(CollaboratorError::Extraction(format!(
                "{} produced no output",
                self.program
            )));
        }
        Ok(audio_out.to_path_buf())
    }
}
