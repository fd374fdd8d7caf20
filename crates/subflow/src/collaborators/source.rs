use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::dedup::find_duplicate;
use super::process::ToolCommand;
use super::{ResolvedVideo, VideoSourceResolver};
use crate::error::CollaboratorError;
use crate::sanitize::{ensure_unique_path, redact_url, sanitize_filename};
use crate::worker::JobSource;

/// Accepts local files only; the title is the sanitized file stem.
#[derive(Debug, Clone, Default)]
pub struct LocalFileResolver;

impl LocalFileResolver {
    fn resolve_path(&self, path: &Path) -> Result<ResolvedVideo, CollaboratorError> {
        if !path.is_file() {
            return Err(CollaboratorError::NotFound(path.to_path_buf()));
        }

        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(ResolvedVideo {
            path: path.to_path_buf(),
            title: sanitize_filename(&stem),
        })
    }
}

impl VideoSourceResolver for LocalFileResolver {
    fn resolve(
        &self,
        source: &JobSource,
        _download_dir: &Path,
    ) -> Result<ResolvedVideo, CollaboratorError> {
        match source {
            JobSource::File(path) => self.resolve_path(path),
            JobSource::Url(url) => Err(CollaboratorError::Download {
                url: redact_url(url),
                reason: "local resolver cannot download".to_string(),
            }),
        }
    }
}

/// Downloads with `yt-dlp` into `<download_dir>/<title>/<title>.<ext>`.
/// A download identical to a video already in the title folder is discarded
/// and the existing file reused.
#[derive(Debug, Clone)]
pub struct YtDlpResolver {
    program: String,
}

impl Default for YtDlpResolver {
    fn default() -> Self {
        Self::with_program("yt-dlp")
    }
}

impl YtDlpResolver {
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn fetch_title(&self, url: &str) -> Result<String, CollaboratorError> {
        let output = ToolCommand::new(&self.program)
            .args(["--skip-download", "--print", "title", "--no-playlist"])
            .arg(url)
            .execute_checked(|reason| CollaboratorError::Download {
                url: redact_url(url),
                reason,
            })?;

        let title = output
            .stdout
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .unwrap_or_default();
        Ok(sanitize_filename(title))
    }

    fn download(&self, url: &str, download_dir: &Path) -> Result<ResolvedVideo, CollaboratorError> {
        let title = self.fetch_title(url)?;
        let folder = download_dir.join(&title);
        let staging = folder.join(format!(".download-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&staging).map_err(|e| CollaboratorError::io(&staging, e))?;

        info!(url = %redact_url(url), title = %title, "downloading video");

        let template = staging.join("video.%(ext)s");
        let result = ToolCommand::new(&self.program)
            .args(["-f", "bestvideo+bestaudio/best"])
            .args(["--merge-output-format", "mp4"])
            .arg("--restrict-filenames")
            .args(["--retries", "5"])
            .arg("--no-playlist")
            .arg("-o")
            .arg(&template)
            .arg(url)
            .execute_checked(|reason| CollaboratorError::Download {
                url: redact_url(url),
                reason,
            })
            .and_then(|_| find_downloaded(&staging, url))
            .and_then(|downloaded| {
                let duplicate = find_duplicate(&folder, &downloaded)
                    .map_err(|e| CollaboratorError::io(&folder, e))?;
                if let Some(existing) = duplicate {
                    return Ok(existing);
                }

                let extension = downloaded
                    .extension()
                    .map(|e| e.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "mp4".to_string());
                let target = ensure_unique_path(&folder.join(format!("{}.{}", title, extension)));
                fs::rename(&downloaded, &target).map_err(|e| CollaboratorError::io(&target, e))?;
                Ok(target)
            });

        if let Err(e) = fs::remove_dir_all(&staging) {
            debug!(error = %e, "could not remove download staging folder");
        }

        Ok(ResolvedVideo {
            path: result?,
            title,
        })
    }
}

fn find_downloaded(staging: &Path, url: &str) -> Result<PathBuf, CollaboratorError> {
    let entries = fs::read_dir(staging).map_err(|e| CollaboratorError::io(staging, e))?;

    entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .find(|path| {
            path.is_file()
                && path
                    .file_name()
                    .is_some_and(|n| n.to_string_lossy().starts_with("video."))
        })
        .ok_or_else(|| CollaboratorError::Download {
            url: redact_url(url),
            reason: "yt-dlp reported success but produced no file".to_string(),
        })
}

impl VideoSourceResolver for YtDlpResolver {
    fn resolve(
        &self,
        source: &JobSource,
        download_dir: &Path,
    ) -> Result<ResolvedVideo, CollaboratorError> {
        match source {
            JobSource::Url(url) => self.download(url, download_dir),
            JobSource::File(path) => Err(CollaboratorError::NotFound(path.to_path_buf())),
        }
    }
}

/// URLs go to yt-dlp, paths to the local resolver.
#[derive(Debug, Clone, Default)]
pub struct SourceResolver {
    local: LocalFileResolver,
    remote: YtDlpResolver,
}

impl SourceResolver {
    pub fn new(remote: YtDlpResolver) -> Self {
        Self {
            local: LocalFileResolver,
            remote,
        }
    }
}

impl VideoSourceResolver for SourceResolver {
    fn resolve(
        &self,
        source: &JobSource,
        download_dir: &Path,
    ) -> Result<ResolvedVideo, CollaboratorError> {
        if source.is_url() {
            self.remote.resolve(source, download_dir)
        } else {
            self.local.resolve(source, download_dir)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_local_file_title_is_sanitized_stem() {
        let dir = TempDir::new().unwrap();
        let video = dir.path().join("My Holiday: Day 1.mp4");
        fs::write(&video, b"fake").unwrap();

        let resolved = LocalFileResolver
            .resolve(&JobSource::File(video.clone()), dir.path())
            .unwrap();
        assert_eq!(resolved.path, video);
        assert_eq!(resolved.title, "My_Holiday__Day_1");
    }

    #[test]
    fn test_local_missing_file() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.mp4");

        let err = LocalFileResolver
            .resolve(&JobSource::File(missing.clone()), dir.path())
            .unwrap_err();
        assert!(matches!(err, CollaboratorError::NotFound(p) if p == missing));
    }

    #[test]
    fn test_local_rejects_directory() {
        let dir = TempDir::new().unwrap();
        let err = LocalFileResolver
            .resolve(&JobSource::File(dir.path().to_path_buf()), dir.path())
            .unwrap_err();
        assert!(matches!(err, CollaboratorError::NotFound(_)));
    }

    #[test]
    fn test_missing_downloader_is_spawn_error() {
        let dir = TempDir::new().unwrap();
        let resolver = SourceResolver::new(YtDlpResolver::with_program(
            "nonexistent_downloader_subflow_12345",
        ));

        let err = resolver
            .resolve(
                &JobSource::Url("https://example.com/watch?v=1".to_string()),
                dir.path(),
            )
            .unwrap_err();
        assert!(matches!(err, CollaboratorError::Spawn { .. }));
    }

    #[test]
    fn test_router_sends_paths_to_local_resolver() {
        let dir = TempDir::new().unwrap();
        let video = dir.path().join("clip.mkv");
        fs::write(&video, b"fake").unwrap();

        let resolver = SourceResolver::new(YtDlpResolver::with_program(
            "nonexistent_downloader_subflow_12345",
        ));
        let resolved = resolver.resolve(&JobSource::File(video), dir.path()).unwrap();
        assert_eq!(resolved.title, "clip");
    }

    #[cfg(unix)]
    #[test]
    fn test_download_with_fake_tool() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let tool = dir.path().join("fake-yt-dlp");
        // Prints a title for --print, otherwise writes the file named after -o.
        fs::write(
            &tool,
            "#!/bin/sh\n\
             case \"$*\" in *--print*) echo 'Great Talk'; exit 0;; esac\n\
             while [ $# -gt 0 ]; do if [ \"$1\" = \"-o\" ]; then out=\"$2\"; fi; shift; done\n\
             target=$(echo \"$out\" | sed 's/%(ext)s/mp4/')\n\
             echo data > \"$target\"\n",
        )
        .unwrap();
        fs::set_permissions(&tool, fs::Permissions::from_mode(0o755)).unwrap();

        let downloads = dir.path().join("out");
        let resolver = YtDlpResolver::with_program(tool.to_string_lossy());
        let resolved = resolver
            .resolve(&JobSource::Url("https://example.com/v".to_string()), &downloads)
            .unwrap();

        assert_eq!(resolved.title, "Great_Talk");
        assert_eq!(resolved.path, downloads.join("Great_Talk").join("Great_Talk.mp4"));
        assert!(resolved.path.exists());

        let leftovers: Vec<_> = fs::read_dir(downloads.join("Great_Talk"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".download-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_repeated_download_reuses_identical_file() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let tool = dir.path().join("fake-yt-dlp");
        // Copies the `content` file, so each run can return different bytes.
        fs::write(
            &tool,
            format!(
                "#!/bin/sh\n\
                 case \"$*\" in *--print*) echo 'Great Talk'; exit 0;; esac\n\
                 while [ $# -gt 0 ]; do if [ \"$1\" = \"-o\" ]; then out=\"$2\"; fi; shift; done\n\
                 target=$(echo \"$out\" | sed 's/%(ext)s/mp4/')\n\
                 cp '{}' \"$target\"\n",
                dir.path().join("content").display()
            ),
        )
        .unwrap();
        fs::set_permissions(&tool, fs::Permissions::from_mode(0o755)).unwrap();

        let downloads = dir.path().join("out");
        let folder = downloads.join("Great_Talk");
        let resolver = YtDlpResolver::with_program(tool.to_string_lossy());
        let url = JobSource::Url("https://example.com/v".to_string());

        fs::write(dir.path().join("content"), b"first video bytes").unwrap();
        let first = resolver.resolve(&url, &downloads).unwrap();
        assert_eq!(first.path, folder.join("Great_Talk.mp4"));

        let second = resolver.resolve(&url, &downloads).unwrap();
        assert_eq!(second.path, first.path);
        assert!(!folder.join("Great_Talk (1).mp4").exists());

        // Same size, different bytes: kept as a new file.
        fs::write(dir.path().join("content"), b"other video bytes").unwrap();
        let third = resolver.resolve(&url, &downloads).unwrap();
        assert_eq!(third.path, folder.join("Great_Talk (1).mp4"));
        assert_eq!(fs::read(&third.path).unwrap(), b"other video bytes");

        let videos = fs::read_dir(&folder)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_file())
            .count();
        assert_eq!(videos, 2);
    }
}
