//! Filename and log-field sanitizing.
//!
//! Video titles come from arbitrary web pages, so anything that ends up as a
//! folder or file name goes through [`sanitize_filename`] first. The
//! `redact_*` helpers keep span fields free of home directories and
//! credentials embedded in URLs.

use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static RE_FORBIDDEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"[<>:"/\\|?*]"#).unwrap());
static RE_WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static RE_NON_PORTABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_\-.]").unwrap());

const MAX_FILENAME_CHARS: usize = 50;

pub const UNKNOWN_VIDEO: &str = "unknown_video";

/// Turns a video title into a portable file or folder name.
pub fn sanitize_filename(name: &str) -> String {
    let cleaned = RE_FORBIDDEN.replace_all(name, "_");
    let cleaned = RE_WHITESPACE.replace_all(&cleaned, "_");
    let cleaned = RE_NON_PORTABLE.replace_all(&cleaned, "_");
    let cleaned = cleaned.trim_end_matches('.');

    let truncated: String = cleaned.chars().take(MAX_FILENAME_CHARS).collect();

    if truncated.is_empty() {
        UNKNOWN_VIDEO.to_string()
    } else {
        truncated
    }
}

/// Returns `path` if it is free, otherwise the first free `stem (n).ext`.
pub fn ensure_unique_path(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }

    let parent = path.parent().unwrap_or_else(|| Path::new(""));
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = path.extension().map(|e| e.to_string_lossy().into_owned());

    let mut counter = 1;
    loop {
        let candidate_name = match &extension {
            Some(ext) => format!("{} ({}).{}", stem, counter, ext),
            None => format!("{} ({})", stem, counter),
        };
        let candidate = parent.join(candidate_name);
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

/// Returns only the filename component of a path.
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Strips userinfo and the query string from a source URL.
///
/// - `https://user:pw@host/watch?v=x&token=y` → `https://****@host/watch`
/// - `https://host/watch?v=x` → `https://host/watch`
pub fn redact_url(url: &str) -> String {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);

    if let Some(scheme_end) = without_query.find("://") {
        let after_scheme = &without_query[scheme_end + 3..];
        let authority_end = after_scheme.find('/').unwrap_or(after_scheme.len());
        if let Some(at_pos) = after_scheme[..authority_end].find('@') {
            let scheme = &without_query[..scheme_end + 3];
            return format!("{}****@{}", scheme, &after_scheme[at_pos + 1..]);
        }
    }

    without_query.to_string()
}
