//! SRT parsing and reconstruction around translation.
//!
//! Input is split into blank-line separated blocks. A block that starts
//! with an index line and a timecode line is a cue; anything else is kept as
//! an orphan block and translated as plain text, so malformed transcripts
//! survive the round trip.

use regex::Regex;
use std::sync::LazyLock;

static RE_BLOCK_SEPARATOR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n[ \t]*\n").unwrap());
static RE_TIMECODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{2}:\d{2}:\d{2},\d{3} --> \d{2}:\d{2}:\d{2},\d{3}$").unwrap()
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrtSegment {
    /// Cue index as written; `None` for an orphan block.
    pub number: Option<String>,
    pub timecode: Option<String>,
    pub text: String,
}

impl SrtSegment {
    pub fn is_orphan(&self) -> bool {
        self.number.is_none()
    }
}

pub fn parse_srt_segments(content: &str) -> Vec<SrtSegment> {
    let normalized = content.replace("\r\n", "\n");

    RE_BLOCK_SEPARATOR
        .split(&normalized)
        .map(str::trim)
        .filter(|block| !block.is_empty())
        .map(parse_block)
        .collect()
}

fn parse_block(block: &str) -> SrtSegment {
    let mut lines = block.splitn(3, '\n');
    let first = lines.next().unwrap_or("").trim();
    let second = lines.next().map(str::trim);

    match second {
        Some(timecode)
            if !first.is_empty()
                && first.chars().all(|c| c.is_ascii_digit())
                && RE_TIMECODE.is_match(timecode) =>
        {
            SrtSegment {
                number: Some(first.to_string()),
                timecode: Some(timecode.to_string()),
                text: lines.next().unwrap_or("").trim().to_string(),
            }
        }
        _ => SrtSegment {
            number: None,
            timecode: None,
            text: block.to_string(),
        },
    }
}

/// Rebuilds SRT text from parsed segments and one translation per segment.
/// Cues whose original text was empty stay empty.
pub fn reconstruct_srt(segments: &[SrtSegment], translated: &[String]) -> String {
    let mut out: Vec<&str> = Vec::with_capacity(segments.len() * 4);

    for (segment, translation) in segments.iter().zip(translated) {
        match (&segment.number, &segment.timecode) {
            (Some(number), Some(timecode)) => {
                out.push(number);
                out.push(timecode);
                out.push(if segment.text.is_empty() {
                    ""
                } else {
                    translation
                });
            }
            _ => out.push(translation),
        }
        out.push("");
    }

    out.join("\n").trim().to_string()
}

/// `3725.5` → `01:02:05,500`.
pub fn format_timestamp(seconds: f64) -> String {
    let seconds = seconds.max(0.0);
    let whole = seconds.trunc() as u64;
    let millis = ((seconds - seconds.trunc()) * 1000.0) as u64;
    format!(
        "{:02}:{:02}:{:02},{:03}",
        whole / 3600,
        (whole / 60) % 60,
        whole % 60,
        millis
    )
}
