//! Short download using yt-dlp.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant, SystemTime};

use tokio::process::Command;
use tracing::{debug, info, warn};

use shortsmith_models::{extract_youtube_id, shorts_url};

use crate::error::{MediaError, MediaResult};

/// Format selector: best MP4 video + M4A audio, else the best single MP4, else anything.
pub const YTDLP_FORMAT: &str = "bestvideo[ext=mp4]+bestaudio[ext=m4a]/best[ext=mp4]/best";

/// stderr fragments that mean the video will never download, however often we try.
const UNAVAILABLE_MARKERS: &[&str] = &[
    "private video",
    "video unavailable",
    "copyright",
    "removed",
    "not available",
    "has been terminated",
    "members-only",
    "confirm your age",
    "blocked it in your country",
];

/// Downloader settings.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// yt-dlp executable name or path
    pub program: PathBuf,
    /// Total attempts per short, first one included
    pub max_attempts: u32,
    /// Wait before retry `n` is `retry_base * n`
    pub retry_base: Duration,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("yt-dlp"),
            max_attempts: 3,
            retry_base: Duration::from_secs(2),
        }
    }
}

impl DownloadConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            program: defaults.program,
            max_attempts: std::env::var("DOWNLOAD_MAX_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_attempts),
            retry_base: std::env::var("DOWNLOAD_RETRY_BASE_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.retry_base),
        }
    }
}

/// A short saved to local disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedShort {
    pub path: PathBuf,
    /// Row the short was downloaded for
    pub row_index: usize,
    pub video_id: String,
}

/// Validate a source URL and normalize it to the canonical Shorts form.
///
/// Returns the video id and the normalized URL.
pub fn normalize_short_url(source_url: &str) -> MediaResult<(String, String)> {
    let video_id = extract_youtube_id(source_url)
        .map_err(|e| MediaError::invalid_url(source_url, e.to_string()))?;
    let url = shorts_url(&video_id);
    Ok((video_id, url))
}

/// Downloads shorts with yt-dlp, retrying transient failures.
#[derive(Debug, Clone, Default)]
pub struct YtDlpDownloader {
    config: DownloadConfig,
}

impl YtDlpDownloader {
    pub fn new(config: DownloadConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DownloadConfig {
        &self.config
    }

    /// Download the short behind `source_url` into `dest_dir`.
    pub async fn download(
        &self,
        source_url: &str,
        row_index: usize,
        dest_dir: &Path,
    ) -> MediaResult<DownloadedShort> {
        let (video_id, url) = normalize_short_url(source_url)?;
        let program =
            which::which(&self.config.program).map_err(|_| MediaError::YtDlpNotFound)?;

        let started = Instant::now();
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            debug!(video_id = %video_id, attempt, max_attempts, "Running yt-dlp");

            match self.run_once(&program, &url, &video_id, dest_dir).await {
                Ok(path) => {
                    let elapsed = started.elapsed().as_secs_f64();
                    metrics::histogram!("shortsmith_download_duration_seconds").record(elapsed);
                    info!(
                        video_id = %video_id,
                        path = %path.display(),
                        attempts = attempt,
                        elapsed_secs = elapsed,
                        "Downloaded short"
                    );
                    return Ok(DownloadedShort {
                        path,
                        row_index,
                        video_id,
                    });
                }
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let delay = self.config.retry_base * attempt;
                    warn!(
                        video_id = %video_id,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Download failed, retrying: {}",
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn run_once(
        &self,
        program: &Path,
        url: &str,
        video_id: &str,
        dest_dir: &Path,
    ) -> MediaResult<PathBuf> {
        let output = Command::new(program)
            .args(ytdlp_args(url, dest_dir))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!("yt-dlp stderr: {}", stderr);
            return Err(classify_failure(&stderr));
        }

        locate_output(dest_dir, video_id).await
    }
}

/// Arguments for one yt-dlp invocation.
pub fn ytdlp_args(url: &str, dest_dir: &Path) -> Vec<String> {
    let template = dest_dir.join("%(id)s.%(ext)s");
    vec![
        "--no-playlist".to_string(),
        "--no-progress".to_string(),
        "-f".to_string(),
        YTDLP_FORMAT.to_string(),
        "--merge-output-format".to_string(),
        "mp4".to_string(),
        "-o".to_string(),
        template.to_string_lossy().to_string(),
        url.to_string(),
    ]
}

/// Turn a failed run's stderr into a typed error carrying its last line.
pub fn classify_failure(stderr: &str) -> MediaError {
    let last_line = stderr
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("yt-dlp exited with an error")
        .to_string();

    let lowered = stderr.to_lowercase();
    if UNAVAILABLE_MARKERS.iter().any(|m| lowered.contains(m)) {
        MediaError::download_unavailable(last_line)
    } else {
        MediaError::download_failed(last_line)
    }
}

/// Find the downloaded file: `<id>.mp4` if present, else the newest `.mp4` in the directory.
pub async fn locate_output(dest_dir: &Path, video_id: &str) -> MediaResult<PathBuf> {
    let expected = dest_dir.join(format!("{video_id}.mp4"));
    if tokio::fs::try_exists(&expected).await.unwrap_or(false) {
        return Ok(expected);
    }

    let mut newest: Option<(SystemTime, PathBuf)> = None;
    let mut entries = tokio::fs::read_dir(dest_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("mp4") {
            continue;
        }
        let modified = entry
            .metadata()
            .await
            .and_then(|m| m.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        if newest.as_ref().map_or(true, |(t, _)| modified > *t) {
            newest = Some((modified, path));
        }
    }

    match newest {
        Some((_, path)) => {
            warn!(
                expected = %expected.display(),
                found = %path.display(),
                "Downloaded file not at expected path, using newest mp4"
            );
            Ok(path)
        }
        None => Err(MediaError::download_failed(format!(
            "yt-dlp finished but no mp4 was written to {}",
            dest_dir.display()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_short_url() {
        let (id, url) = normalize_short_url("https://youtu.be/dQw4w9WgXcQ?t=4").unwrap();
        assert_eq!(id, "dQw4w9WgXcQ");
        assert_eq!(url, "https://www.youtube.com/shorts/dQw4w9WgXcQ");

        let err = normalize_short_url("https://vimeo.com/1234").unwrap_err();
        assert!(matches!(err, MediaError::InvalidUrl { .. }));
        assert!(err.is_permanent_failure());
    }

    #[test]
    fn test_ytdlp_args() {
        let args = ytdlp_args("https://www.youtube.com/shorts/dQw4w9WgXcQ", Path::new("/tmp/row"));
        assert!(args.windows(2).any(|w| w == ["-f", YTDLP_FORMAT]));
        assert!(args.windows(2).any(|w| w == ["--merge-output-format", "mp4"]));
        assert!(args.contains(&"/tmp/row/%(id)s.%(ext)s".to_string()));
        assert_eq!(
            args.last().map(String::as_str),
            Some("https://www.youtube.com/shorts/dQw4w9WgXcQ")
        );
    }

    #[test]
    fn test_classify_failure() {
        let err = classify_failure(
            "[youtube] abc: Downloading webpage\nERROR: [youtube] abc: Private video. Sign in if you've been granted access\n",
        );
        assert!(err.is_permanent_failure());
        assert!(err.to_string().contains("Private video"));

        let err = classify_failure("ERROR: unable to download video data: HTTP Error 503: Service Unavailable");
        assert!(err.is_retryable());

        let err = classify_failure("ERROR: [youtube] abc: Video unavailable. This video has been removed by the uploader");
        assert!(!err.is_retryable());

        assert!(classify_failure("").is_retryable());
    }

    #[tokio::test]
    async fn test_locate_output_prefers_expected_name() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("other.mp4"), b"x").unwrap();
        std::fs::write(dir.path().join("dQw4w9WgXcQ.mp4"), b"x").unwrap();

        let path = locate_output(dir.path(), "dQw4w9WgXcQ").await.unwrap();
        assert_eq!(path, dir.path().join("dQw4w9WgXcQ.mp4"));
    }

    #[tokio::test]
    async fn test_locate_output_falls_back_to_any_mp4() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        std::fs::write(dir.path().join("renamed.mp4"), b"x").unwrap();

        let path = locate_output(dir.path(), "dQw4w9WgXcQ").await.unwrap();
        assert_eq!(path, dir.path().join("renamed.mp4"));
    }

    #[tokio::test]
    async fn test_locate_output_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        let err = locate_output(dir.path(), "dQw4w9WgXcQ").await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[cfg(unix)]
    fn fake_ytdlp(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("fake-yt-dlp");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let bin = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        let marker = bin.path().join("attempted");
        let script = fake_ytdlp(
            bin.path(),
            &format!(
                "if [ ! -f '{marker}' ]; then touch '{marker}'; echo 'ERROR: HTTP Error 503' >&2; exit 1; fi\nprintf video > '{dest}/dQw4w9WgXcQ.mp4'",
                marker = marker.display(),
                dest = dest.path().display()
            ),
        );

        let downloader = YtDlpDownloader::new(DownloadConfig {
            program: script,
            max_attempts: 3,
            retry_base: Duration::from_millis(5),
        });
        let short = downloader
            .download("https://youtube.com/shorts/dQw4w9WgXcQ", 4, dest.path())
            .await
            .unwrap();

        assert_eq!(short.row_index, 4);
        assert_eq!(short.path, dest.path().join("dQw4w9WgXcQ.mp4"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unavailable_video_is_not_retried() {
        let bin = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        let log = bin.path().join("calls");
        let script = fake_ytdlp(
            bin.path(),
            &format!(
                "echo call >> '{log}'\necho 'ERROR: [youtube] dQw4w9WgXcQ: Private video' >&2\nexit 1",
                log = log.display()
            ),
        );

        let downloader = YtDlpDownloader::new(DownloadConfig {
            program: script,
            max_attempts: 3,
            retry_base: Duration::from_millis(5),
        });
        let err = downloader
            .download("https://youtube.com/shorts/dQw4w9WgXcQ", 0, dest.path())
            .await
            .unwrap_err();

        assert!(err.is_permanent_failure());
        let calls = std::fs::read_to_string(&log).unwrap();
        assert_eq!(calls.lines().count(), 1);
    }
}
