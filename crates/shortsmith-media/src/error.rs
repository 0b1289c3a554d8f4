//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while downloading or composing videos.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("yt-dlp not found in PATH")]
    YtDlpNotFound,

    #[error("invalid video URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("download failed: {message}")]
    DownloadFailed {
        message: String,
        /// Video is private, removed, blocked or otherwise never going to download
        permanent: bool,
    },

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("FFprobe command failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("invalid video file: {0}")]
    InvalidVideo(String),

    #[error("file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl MediaError {
    pub fn invalid_url(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Create a download failure that may succeed on retry.
    pub fn download_failed(message: impl Into<String>) -> Self {
        Self::DownloadFailed {
            message: message.into(),
            permanent: false,
        }
    }

    /// Create a download failure that will not succeed on retry.
    pub fn download_unavailable(message: impl Into<String>) -> Self {
        Self::DownloadFailed {
            message: message.into(),
            permanent: true,
        }
    }

    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    /// Whether a repeat attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MediaError::DownloadFailed {
                permanent: false,
                ..
            } | MediaError::Timeout(_)
                | MediaError::Io(_)
        )
    }

    /// Failures that no amount of retrying fixes.
    pub fn is_permanent_failure(&self) -> bool {
        matches!(
            self,
            MediaError::InvalidUrl { .. }
                | MediaError::DownloadFailed {
                    permanent: true,
                    ..
                }
                | MediaError::YtDlpNotFound
                | MediaError::FfmpegNotFound
                | MediaError::FfprobeNotFound
                | MediaError::InvalidVideo(_)
        )
    }

    /// Message with the tool's stderr tail appended when there is one.
    pub fn detail(&self) -> String {
        match self {
            MediaError::FfmpegFailed {
                stderr: Some(tail),
                ..
            }
            | MediaError::FfprobeFailed {
                stderr: Some(tail),
                ..
            } if !tail.trim().is_empty() => format!("{self}: {}", tail.trim()),
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(MediaError::download_failed("HTTP Error 503").is_retryable());
        assert!(!MediaError::download_unavailable("Private video").is_retryable());
        assert!(MediaError::download_unavailable("Private video").is_permanent_failure());
        assert!(MediaError::invalid_url("x", "not youtube").is_permanent_failure());
        assert!(MediaError::Timeout(600).is_retryable());
    }

    #[test]
    fn test_detail_includes_stderr_tail() {
        let err = MediaError::ffmpeg_failed(
            "FFmpeg exited with status 1",
            Some("Invalid data found when processing input\n".to_string()),
            Some(1),
        );
        assert_eq!(
            err.detail(),
            "FFmpeg command failed: FFmpeg exited with status 1: Invalid data found when processing input"
        );
        assert_eq!(
            MediaError::Timeout(600).detail(),
            "operation timed out after 600 seconds"
        );
    }
}
