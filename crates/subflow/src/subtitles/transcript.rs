//! Timestamped transcripts and the sibling subtitle files written for them.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use super::srt::format_timestamp;
use crate::error::CollaboratorError;

/// Extensions written next to a transcript base path, in write order.
pub const OUTPUT_EXTENSIONS: [&str; 5] = ["json", "srt", "vtt", "csv", "tsv"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub segments: Vec<TranscriptSegment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

impl Transcript {
    pub fn from_json(content: &str) -> Result<Self, CollaboratorError> {
        serde_json::from_str(content)
            .map_err(|e| CollaboratorError::Transcription(format!("unreadable transcript: {}", e)))
    }

    pub fn to_srt(&self) -> String {
        let mut out = String::new();
        for (index, segment) in self.segments.iter().enumerate() {
            out.push_str(&format!(
                "{}\n{} --> {}\n{}\n\n",
                index + 1,
                format_timestamp(segment.start),
                format_timestamp(segment.end),
                segment.text.trim()
            ));
        }
        out
    }

    pub fn to_vtt(&self) -> String {
        let mut out = String::from("WEBVTT\n\n");
        for segment in &self.segments {
            out.push_str(&format!(
                "{} --> {}\n{}\n\n",
                format_timestamp(segment.start).replace(',', "."),
                format_timestamp(segment.end).replace(',', "."),
                segment.text.trim()
            ));
        }
        out
    }

    /// Delimited table with a `start,end,text` header; times in milliseconds.
    pub fn to_delimited(&self, delimiter: char) -> String {
        let mut out = format!("start{d}end{d}text\n", d = delimiter);
        for segment in &self.segments {
            let text = segment.text.trim();
            let text = if delimiter == ',' && (text.contains(',') || text.contains('"')) {
                format!("\"{}\"", text.replace('"', "\"\""))
            } else {
                text.replace(delimiter, " ")
            };
            out.push_str(&format!(
                "{}{d}{}{d}{}\n",
                (segment.start * 1000.0).round() as u64,
                (segment.end * 1000.0).round() as u64,
                text,
                d = delimiter
            ));
        }
        out
    }

    /// Writes `<base>.json`, `.srt`, `.vtt`, `.csv` and `.tsv`. Returns the
    /// `.srt` path.
    pub fn write_all_outputs(&self, base: &Path) -> Result<PathBuf, CollaboratorError> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| CollaboratorError::Transcription(e.to_string()))?;

        for ext in OUTPUT_EXTENSIONS {
            let content = match ext {
                "json" => json.clone(),
                "srt" => self.to_srt(),
                "vtt" => self.to_vtt(),
                "csv" => self.to_delimited(','),
                _ => self.to_delimited('\t'),
            };
            let path = with_extension(base, ext);
            fs::write(&path, content).map_err(|e| CollaboratorError::io(&path, e))?;
        }

        Ok(with_extension(base, "srt"))
    }
}

/// Appends `.ext` to `base` without touching dots already in the name.
pub fn with_extension(base: &Path, ext: &str) -> PathBuf {
    let mut name = base.as_os_str().to_os_string();
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> Transcript {
        Transcript {
            text: "Hello there. Hi, you".to_string(),
            segments: vec![
                TranscriptSegment {
                    start: 0.0,
                    end: 1.5,
                    text: " Hello there.".to_string(),
                },
                TranscriptSegment {
                    start: 1.5,
                    end: 3.25,
                    text: " Hi, you".to_string(),
                },
            ],
            language: Some("en".to_string()),
        }
    }

    #[test]
    fn test_srt_output() {
        assert_eq!(
            sample().to_srt(),
            "1\n00:00:00,000 --> 00:00:01,500\nHello there.\n\n2\n00:00:01,500 --> 00:00:03,250\nHi, you\n\n"
        );
    }

    #[test]
    fn test_vtt_output() {
        let vtt = sample().to_vtt();
        assert!(vtt.starts_with("WEBVTT\n\n"));
        assert!(vtt.contains("00:00:01.500 --> 00:00:03.250\nHi, you"));
    }

    #[test]
    fn test_delimited_outputs() {
        let csv = sample().to_delimited(',');
        assert_eq!(csv, "start,end,text\n0,1500,Hello there.\n1500,3250,\"Hi, you\"\n");

        let tsv = sample().to_delimited('\t');
        assert!(tsv.starts_with("start\tend\ttext\n"));
        assert!(tsv.contains("1500\t3250\tHi, you"));
    }

    #[test]
    fn test_parse_whisper_json_ignores_extra_fields() {
        let json = r#"{"text":"hi","segments":[{"id":0,"seek":0,"start":0.0,"end":1.0,"text":" hi","tokens":[1,2]}],"language":"en"}"#;
        let transcript = Transcript::from_json(json).unwrap();
        assert_eq!(transcript.segments.len(), 1);
        assert_eq!(transcript.segments[0].text, " hi");
    }

    #[test]
    fn test_parse_garbage_is_transcription_error() {
        let err = Transcript::from_json("not json").unwrap_err();
        assert!(matches!(err, CollaboratorError::Transcription(_)));
    }

    #[test]
    fn test_write_all_outputs() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("my.video");

        let srt = sample().write_all_outputs(&base).unwrap();
        assert_eq!(srt, dir.path().join("my.video.srt"));

        for ext in OUTPUT_EXTENSIONS {
            assert!(dir.path().join(format!("my.video.{}", ext)).exists(), "{}", ext);
        }
    }
}
