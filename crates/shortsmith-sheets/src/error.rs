//! Sheets error types.

use shortsmith_models::TableError;
use thiserror::Error;

/// Result type for Sheets operations.
pub type SheetsResult<T> = Result<T, SheetsError>;

/// Errors that can occur while reading or writing a spreadsheet.
#[derive(Debug, Error)]
pub enum SheetsError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("spreadsheet not found: {0}")]
    NotFound(String),

    #[error("unexpected sheet layout: {0}")]
    Schema(String),

    #[error("rate limited by the Sheets API")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("Sheets API server error {0}: {1}")]
    Server(u16, String),

    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SheetsError {
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema(msg.into())
    }

    /// Map an HTTP error status and body to an error.
    pub fn from_http_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        match status {
            401 | 403 => Self::Auth(body),
            404 => Self::NotFound(body),
            // A range naming a worksheet that does not exist comes back as 400
            400 if body.contains("Unable to parse range") => Self::NotFound(body),
            429 => Self::RateLimited {
                retry_after_ms: None,
            },
            500..=599 => Self::Server(status, body),
            _ => Self::RequestFailed(format!("HTTP {status}: {body}")),
        }
    }

    /// Check if error is retryable. Reads are idempotent, so transient failures are.
    pub fn is_retryable(&self) -> bool {
        match self {
            SheetsError::Network(e) => !e.is_builder() && !e.is_decode(),
            SheetsError::RateLimited { .. } | SheetsError::Server(..) => true,
            _ => false,
        }
    }

    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            SheetsError::RateLimited { retry_after_ms } => *retry_after_ms,
            _ => None,
        }
    }

    pub fn http_status(&self) -> Option<u16> {
        match self {
            SheetsError::NotFound(_) => Some(404),
            SheetsError::RateLimited { .. } => Some(429),
            SheetsError::Server(status, _) => Some(*status),
            SheetsError::Auth(_) => Some(401),
            _ => None,
        }
    }
}

impl From<TableError> for SheetsError {
    fn from(e: TableError) -> Self {
        Self::Schema(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_from_http_status() {
        assert!(matches!(SheetsError::from_http_status(401, "x"), SheetsError::Auth(_)));
        assert!(matches!(SheetsError::from_http_status(403, "x"), SheetsError::Auth(_)));
        assert!(matches!(SheetsError::from_http_status(404, "x"), SheetsError::NotFound(_)));
        assert!(matches!(
            SheetsError::from_http_status(400, "Unable to parse range: 'Nope'"),
            SheetsError::NotFound(_)
        ));
        assert!(matches!(
            SheetsError::from_http_status(400, "bad request"),
            SheetsError::RequestFailed(_)
        ));
    }

    #[test]
    fn test_retryable() {
        assert!(SheetsError::from_http_status(429, "").is_retryable());
        assert!(SheetsError::from_http_status(503, "").is_retryable());
        assert!(!SheetsError::from_http_status(403, "").is_retryable());
        assert!(!SheetsError::schema("no header").is_retryable());
    }

    #[test]
    fn test_table_error_is_schema() {
        let err: SheetsError = TableError::MissingColumn("youtube_url".into()).into();
        assert!(matches!(err, SheetsError::Schema(_)));
    }
}
