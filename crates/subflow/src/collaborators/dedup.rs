//! Duplicate download detection.
//!
//! A fresh download is compared against the video files already in its
//! title folder: equal size first, then a hash over sampled chunks (start,
//! middle for large files, end).

use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, info};

pub const VIDEO_EXTENSIONS: [&str; 3] = ["mp4", "mkv", "webm"];

const CHUNK_SIZE: u64 = 8192;
/// Files larger than this also get their middle chunk sampled.
const MIDDLE_SAMPLE_THRESHOLD: u64 = 10 * 1024 * 1024;

/// Hex SHA-256 over sampled chunks. `None` for empty files.
pub fn sampled_hash(path: &Path) -> io::Result<Option<String>> {
    let mut file = File::open(path)?;
    let size = file.metadata()?.len();
    if size == 0 {
        return Ok(None);
    }

    let mut positions = vec![0];
    if size > MIDDLE_SAMPLE_THRESHOLD {
        positions.push(size / 2);
    }
    if size > CHUNK_SIZE {
        positions.push(size - CHUNK_SIZE);
    }

    let mut hasher = Sha256::new();
    let mut chunk = Vec::with_capacity(CHUNK_SIZE as usize);
    for position in positions {
        file.seek(SeekFrom::Start(position))?;
        chunk.clear();
        (&mut file).take(CHUNK_SIZE).read_to_end(&mut chunk)?;
        hasher.update(&chunk);
    }

    Ok(Some(format!("{:x}", hasher.finalize())))
}

fn is_video(path: &Path) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .is_some_and(|e| VIDEO_EXTENSIONS.contains(&e.as_str()))
}

/// An existing video in `folder` with the same content as `candidate`.
pub fn find_duplicate(folder: &Path, candidate: &Path) -> io::Result<Option<PathBuf>> {
    let size = fs::metadata(candidate)?.len();
    if size == 0 || !folder.is_dir() {
        return Ok(None);
    }

    let same_size: Vec<PathBuf> = fs::read_dir(folder)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.as_path() != candidate && path.is_file() && is_video(path))
        .filter(|path| fs::metadata(path).is_ok_and(|m| m.len() == size))
        .collect();
    if same_size.is_empty() {
        return Ok(None);
    }
    debug!(candidates = same_size.len(), size, "same-size videos found");

    let Some(wanted) = sampled_hash(candidate)? else {
        return Ok(None);
    };
    for existing in same_size {
        if sampled_hash(&existing)?.as_deref() == Some(wanted.as_str()) {
            info!(path = %existing.display(), "reusing identical download");
            return Ok(Some(existing));
        }
    }
    Ok(None)
}
