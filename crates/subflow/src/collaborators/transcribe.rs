use std::fs;
use std::path::{Path, PathBuf};

use super::process::ToolCommand;
use super::Transcriber;
use crate::error::CollaboratorError;
use crate::subtitles::Transcript;

const HF_WHISPER_PREFIX: &str = "openai/whisper-";

/// Hugging Face id for a bare Whisper model name (`large-v3` ->
/// `openai/whisper-large-v3`). Names already under `openai/` pass through.
pub fn format_whisper_model_name(name: &str) -> String {
    let name = name.trim();
    if name.starts_with("openai/") {
        name.to_string()
    } else {
        format!("{}{}", HF_WHISPER_PREFIX, name)
    }
}

/// Runs the `whisper` CLI for JSON output and renders the subtitle formats
/// from the parsed segments.
#[derive(Debug, Clone)]
pub struct WhisperCliTranscriber {
    program: String,
}

impl Default for WhisperCliTranscriber {
    fn default() -> Self {
        Self::with_program("whisper")
    }
}

impl WhisperCliTranscriber {
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Transcriber for WhisperCliTranscriber {
    fn transcribe(
        &self,
        audio: &Path,
        base: &Path,
        model: &str,
        use_gpu: bool,
    ) -> Result<PathBuf, CollaboratorError> {
        let scratch = tempfile::Builder::new()
            .prefix("subflow-whisper-")
            .tempdir()
            .map_err(|e| CollaboratorError::io(std::env::temp_dir(), e))?;

        // The CLI wants the short name even though backends store HF ids.
        let short_model = model.trim().trim_start_matches(HF_WHISPER_PREFIX);

        ToolCommand::new(&self.program)
            .arg(audio)
            .args(["--model", short_model])
            .args(["--output_format", "json"])
            .arg("--output_dir")
            .arg(scratch.path())
            .args(["--device", if use_gpu { "cuda" } else { "cpu" }])
            .execute_checked(CollaboratorError::Transcription)?;

        let stem = audio
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let json_path = scratch.path().join(format!("{}.json", stem));
        let content = fs::read_to_string(&json_path).map_err(|e| {
            CollaboratorError::Transcription(format!("no transcript at {}: {}", json_path.display(), e))
        })?;

        Transcript::from_json(&content)?.write_all_outputs(base)?;
        Ok(base.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_whisper_model_name() {
        assert_eq!(format_whisper_model_name("large-v3-turbo"), "openai/whisper-large-v3-turbo");
        assert_eq!(format_whisper_model_name(" base "), "openai/whisper-base");
        assert_eq!(
            format_whisper_model_name("openai/whisper-small"),
            "openai/whisper-small"
        );
    }

    #[test]
    fn test_missing_tool_is_spawn_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = WhisperCliTranscriber::with_program("nonexistent_transcriber_subflow_12345")
            .transcribe(&dir.path().join("a.mp3"), &dir.path().join("a"), "base", false)
            .unwrap_err();
        assert!(matches!(err, CollaboratorError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_renders_outputs_from_fake_tool_json() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let tool = dir.path().join("fake-whisper");
        fs::write(
            &tool,
            "#!/bin/sh\n\
             while [ $# -gt 0 ]; do if [ \"$1\" = \"--output_dir\" ]; then out=\"$2\"; fi; shift; done\n\
             echo '{\"text\":\"hi\",\"segments\":[{\"start\":0.0,\"end\":1.0,\"text\":\" hi\"}]}' > \"$out/talk.json\"\n",
        )
        .unwrap();
        fs::set_permissions(&tool, fs::Permissions::from_mode(0o755)).unwrap();

        let base = dir.path().join("talk");
        let result = WhisperCliTranscriber::with_program(tool.to_string_lossy())
            .transcribe(&dir.path().join("talk.mp3"), &base, "openai/whisper-base", false)
            .unwrap();

        assert_eq!(result, base);
        let srt = fs::read_to_string(dir.path().join("talk.srt")).unwrap();
        assert_eq!(srt, "1\n00:00:00,000 --> 00:00:01,000\nhi\n\n");
        assert!(dir.path().join("talk.vtt").exists());
    }
}
