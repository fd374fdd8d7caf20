use std::fs;
use std::path::{Path, PathBuf};

use super::process::ToolCommand;
use super::{StemSeparator, Stems};
use crate::error::CollaboratorError;

const DEMUCS_MODEL: &str = "mdx_extra_q";
const PLACEHOLDER_SAMPLE_RATE: u32 = 44_100;

pub const VOCALS_FILE: &str = "vocals.wav";
pub const ACCOMPANIMENT_FILE: &str = "accompaniment.wav";

/// Two-stem `demucs` split. Its `no_vocals.wav` becomes `accompaniment.wav`.
#[derive(Debug, Clone)]
pub struct DemucsSeparator {
    program: String,
}

impl Default for DemucsSeparator {
    fn default() -> Self {
        Self::with_program("demucs")
    }
}

impl DemucsSeparator {
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl StemSeparator for DemucsSeparator {
    fn separate(
        &self,
        audio: &Path,
        out_dir: &Path,
        use_gpu: bool,
    ) -> Result<Stems, CollaboratorError> {
        let raw_dir = out_dir.join(".demucs");
        fs::create_dir_all(&raw_dir).map_err(|e| CollaboratorError::io(&raw_dir, e))?;

        ToolCommand::new(&self.program)
            .args(["--two-stems=vocals", "-n", DEMUCS_MODEL])
            .args(["-d", if use_gpu { "cuda" } else { "cpu" }])
            .arg("-o")
            .arg(&raw_dir)
            .arg(audio)
            .execute_checked(CollaboratorError::Separation)?;

        let track = audio
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let produced = raw_dir.join(DEMUCS_MODEL).join(track);

        let vocals = out_dir.join(VOCALS_FILE);
        let accompaniment = out_dir.join(ACCOMPANIMENT_FILE);
        copy_stem(&produced.join("vocals.wav"), &vocals)?;
        copy_stem(&produced.join("no_vocals.wav"), &accompaniment)?;

        Ok(Stems {
            vocals,
            accompaniment,
        })
    }
}

fn copy_stem(from: &Path, to: &Path) -> Result<(), CollaboratorError> {
    if !from.is_file() {
        return Err(CollaboratorError::Separation(format!(
            "missing stem {}",
            from.display()
        )));
    }
    fs::copy(from, to).map_err(|e| CollaboratorError::io(to, e))?;
    Ok(())
}

/// Writes a mono 44.1 kHz WAV holding a single silent sample.
pub fn write_silent_track(path: &Path) -> Result<PathBuf, CollaboratorError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: PLACEHOLDER_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let to_error = |e: hound::Error| CollaboratorError::Separation(format!("placeholder: {}", e));
    let mut writer = hound::WavWriter::create(path, spec).map_err(to_error)?;
    writer.write_sample(0i16).map_err(to_error)?;
    writer.finalize().map_err(to_error)?;

    Ok(path.to_path_buf())
}

/// Silent `vocals.wav` and `accompaniment.wav` in `out_dir`.
pub fn write_silent_stems(out_dir: &Path) -> Result<Stems, CollaboratorError> {
    fs::create_dir_all(out_dir).map_err(|e| CollaboratorError::io(out_dir, e))?;
    Ok(Stems {
        vocals: write_silent_track(&out_dir.join(VOCALS_FILE))?,
        accompaniment: write_silent_track(&out_dir.join(ACCOMPANIMENT_FILE))?,
    })
}
