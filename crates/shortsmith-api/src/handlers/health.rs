//! Health check handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use shortsmith_media::{check_ffmpeg, check_ffprobe, check_ytdlp, MediaResult};

use crate::state::AppState;

/// Health response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
}

/// Health check endpoint (liveness probe).
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// Readiness check response.
#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub dev_mode: bool,
    pub dry_run: bool,
    pub checks: ReadinessChecks,
}

#[derive(Serialize)]
pub struct ReadinessChecks {
    pub ffmpeg: CheckStatus,
    pub ffprobe: CheckStatus,
    pub yt_dlp: CheckStatus,
}

#[derive(Serialize)]
pub struct CheckStatus {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CheckStatus {
    fn from_lookup(result: MediaResult<std::path::PathBuf>) -> Self {
        match result {
            Ok(path) => Self {
                status: "ok".to_string(),
                path: Some(path.display().to_string()),
                error: None,
            },
            Err(e) => Self {
                status: "error".to_string(),
                path: None,
                error: Some(e.to_string()),
            },
        }
    }

    fn skipped() -> Self {
        Self {
            status: "skipped".to_string(),
            path: None,
            error: None,
        }
    }

    fn is_ok(&self) -> bool {
        self.status != "error"
    }
}

/// Readiness check endpoint.
/// Looks up the external tools a run needs; dry runs need none.
pub async fn ready(
    State(state): State<AppState>,
) -> Result<Json<ReadinessResponse>, (StatusCode, Json<ReadinessResponse>)> {
    let config = state.pipeline().config();

    let checks = if config.dry_run {
        ReadinessChecks {
            ffmpeg: CheckStatus::skipped(),
            ffprobe: CheckStatus::skipped(),
            yt_dlp: CheckStatus::skipped(),
        }
    } else {
        ReadinessChecks {
            ffmpeg: CheckStatus::from_lookup(check_ffmpeg()),
            ffprobe: CheckStatus::from_lookup(check_ffprobe()),
            yt_dlp: CheckStatus::from_lookup(check_ytdlp()),
        }
    };

    let all_ok = checks.ffmpeg.is_ok() && checks.ffprobe.is_ok() && checks.yt_dlp.is_ok();

    let response = ReadinessResponse {
        status: if all_ok { "ready" } else { "degraded" }.to_string(),
        dev_mode: config.dev_mode,
        dry_run: config.dry_run,
        checks,
    };

    if all_ok {
        Ok(Json(response))
    } else {
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(response)))
    }
}
