//! YouTube upload error types.

use serde::Deserialize;
use thiserror::Error;

pub type YoutubeResult<T> = Result<T, YoutubeError>;

/// `error.errors[].reason` values that mean the channel cannot upload any more today.
const QUOTA_REASONS: &[&str] = &[
    "quotaExceeded",
    "uploadLimitExceeded",
    "rateLimitExceeded",
    "dailyLimitExceeded",
    "userRateLimitExceeded",
];

#[derive(Debug, Error)]
pub enum YoutubeError {
    #[error("YouTube authentication failed: {0}")]
    Auth(String),

    #[error("YouTube quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("upload failed: {0}")]
    Upload(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Deserialize)]
struct GoogleErrorEnvelope {
    error: GoogleError,
}

#[derive(Debug, Deserialize)]
struct GoogleError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<GoogleErrorItem>,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorItem {
    #[serde(default)]
    reason: String,
}

impl YoutubeError {
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }

    pub fn upload(msg: impl Into<String>) -> Self {
        Self::Upload(msg.into())
    }

    /// Classify a failed Data API response.
    pub fn from_response(status: u16, body: &str) -> Self {
        let parsed = serde_json::from_str::<GoogleErrorEnvelope>(body).ok();
        let reasons: Vec<&str> = parsed
            .as_ref()
            .map(|p| p.error.errors.iter().map(|e| e.reason.as_str()).collect())
            .unwrap_or_default();
        let message = parsed
            .as_ref()
            .map(|p| p.error.message.clone())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| body.trim().to_string());

        if matches!(status, 403 | 429) && reasons.iter().any(|r| QUOTA_REASONS.contains(r)) {
            return Self::QuotaExceeded(format!("{} ({})", message, reasons.join(", ")));
        }
        match status {
            401 => Self::Auth(message),
            _ => Self::Upload(format!("HTTP {status}: {message}")),
        }
    }

    /// No later upload in the same run can succeed after this error.
    pub fn halts_run(&self) -> bool {
        matches!(self, YoutubeError::Auth(_) | YoutubeError::QuotaExceeded(_))
    }
}
