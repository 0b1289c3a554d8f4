//! Resumable video uploads to the YouTube Data API v3.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::{DateTime, SecondsFormat, Utc};
use metrics::histogram;
use reqwest::header::LOCATION;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, Instrument};

use shortsmith_models::PrivacyStatus;

use crate::error::{YoutubeError, YoutubeResult};
use crate::secrets::ClientSecrets;
use crate::token::OAuthTokenCache;

pub const DEFAULT_UPLOAD_BASE_URL: &str = "https://www.googleapis.com/upload/youtube/v3";

/// "People & Blogs"
pub const DEFAULT_CATEGORY_ID: &str = "22";

const UPLOAD_DURATION_SECONDS: &str = "shortsmith_upload_duration_seconds";

#[derive(Debug, Clone)]
pub struct YoutubeConfig {
    /// OAuth client JSON with the channel's refresh token
    pub client_secrets_path: PathBuf,
    pub upload_base_url: String,
    pub category_id: String,
    /// Whole-request timeout; covers the byte upload
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for YoutubeConfig {
    fn default() -> Self {
        Self {
            client_secrets_path: PathBuf::from("client_secrets.json"),
            upload_base_url: DEFAULT_UPLOAD_BASE_URL.to_string(),
            category_id: DEFAULT_CATEGORY_ID.to_string(),
            timeout: Duration::from_secs(900),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl YoutubeConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            client_secrets_path: std::env::var("YOUTUBE_CLIENT_SECRETS_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.client_secrets_path),
            category_id: std::env::var("YOUTUBE_CATEGORY_ID")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.category_id),
            timeout: std::env::var("YOUTUBE_UPLOAD_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            ..defaults
        }
    }
}

/// One video to upload.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub path: PathBuf,
    pub title: String,
    pub description: String,
    pub privacy: PrivacyStatus,
    /// Required when `privacy` is [`PrivacyStatus::Scheduled`]
    pub publish_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedVideo {
    pub id: String,
}

#[derive(Debug, Serialize)]
struct VideoResource<'a> {
    snippet: Snippet<'a>,
    status: Status,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Snippet<'a> {
    title: &'a str,
    description: &'a str,
    category_id: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Status {
    privacy_status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    publish_at: Option<String>,
    self_declared_made_for_kids: bool,
}

#[derive(Debug, Deserialize)]
struct VideoResponse {
    id: String,
}

/// Uploads videos to the channel the refresh token belongs to.
pub struct YoutubeUploader {
    http: Client,
    config: YoutubeConfig,
    tokens: OAuthTokenCache,
}

impl YoutubeUploader {
    /// Load the configured client secrets file.
    pub fn new(config: YoutubeConfig) -> YoutubeResult<Self> {
        let secrets = ClientSecrets::from_file(&config.client_secrets_path)?;
        Self::with_secrets(config, secrets)
    }

    pub fn with_secrets(config: YoutubeConfig, secrets: ClientSecrets) -> YoutubeResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(concat!("shortsmith-youtube/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let tokens = OAuthTokenCache::new(http.clone(), secrets);
        Ok(Self {
            http,
            config,
            tokens,
        })
    }

    /// Check that the refresh token can still mint access tokens.
    pub async fn verify_credentials(&self) -> YoutubeResult<()> {
        self.tokens.access_token().await.map(|_| ())
    }

    pub async fn upload(&self, request: &UploadRequest) -> YoutubeResult<UploadedVideo> {
        let span = info_span!(
            "youtube_upload",
            path = %request.path.display(),
            privacy = %request.privacy,
        );

        async {
            let start = Instant::now();
            let resource = video_resource(request, &self.config.category_id)?;
            let bytes = tokio::fs::read(&request.path).await?;

            let session_url = self.start_session(&resource, bytes.len()).await?;
            debug!(size = bytes.len(), "Opened resumable upload session");

            let video = self.send_bytes(&session_url, bytes).await?;
            let elapsed = start.elapsed();
            histogram!(UPLOAD_DURATION_SECONDS).record(elapsed.as_secs_f64());

            info!(
                video_id = %video.id,
                duration_ms = elapsed.as_millis() as u64,
                "Uploaded video"
            );
            Ok(video)
        }
        .instrument(span)
        .await
    }

    /// Open a resumable session, returning its upload URL.
    async fn start_session(
        &self,
        resource: &VideoResource<'_>,
        content_length: usize,
    ) -> YoutubeResult<String> {
        let url = format!(
            "{}/videos?uploadType=resumable&part=snippet,status",
            self.config.upload_base_url
        );

        let mut retried_auth = false;
        loop {
            let token = self.tokens.access_token().await?;
            let response = self
                .http
                .post(&url)
                .bearer_auth(&token)
                .header("X-Upload-Content-Type", "video/mp4")
                .header("X-Upload-Content-Length", content_length.to_string())
                .json(resource)
                .send()
                .await?;

            let status = response.status();
            if status == StatusCode::UNAUTHORIZED && !retried_auth {
                debug!("Upload session rejected with 401, refreshing token");
                self.tokens.invalidate().await;
                retried_auth = true;
                continue;
            }
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(YoutubeError::from_response(status.as_u16(), &body));
            }

            return response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
                .ok_or_else(|| YoutubeError::upload("upload session response has no Location header"));
        }
    }

    async fn send_bytes(&self, session_url: &str, bytes: Vec<u8>) -> YoutubeResult<UploadedVideo> {
        let token = self.tokens.access_token().await?;
        let response = self
            .http
            .put(session_url)
            .bearer_auth(&token)
            .header(reqwest::header::CONTENT_TYPE, "video/mp4")
            .body(bytes)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(YoutubeError::from_response(status.as_u16(), &body));
        }

        let video: VideoResponse = response
            .json()
            .await
            .map_err(|e| YoutubeError::upload(format!("unexpected upload response: {e}")))?;
        Ok(UploadedVideo { id: video.id })
    }
}

fn video_resource<'a>(request: &'a UploadRequest, category_id: &'a str) -> YoutubeResult<VideoResource<'a>> {
    let publish_at = match (request.privacy, request.publish_at) {
        (PrivacyStatus::Scheduled, Some(at)) => Some(at.to_rfc3339_opts(SecondsFormat::Secs, true)),
        (PrivacyStatus::Scheduled, None) => {
            return Err(YoutubeError::upload("scheduled upload without a publish time"))
        }
        _ => None,
    };

    Ok(VideoResource {
        snippet: Snippet {
            title: &request.title,
            description: &request.description,
            category_id,
        },
        status: Status {
            privacy_status: request.privacy.api_status(),
            publish_at,
            self_declared_made_for_kids: false,
        },
    })
}
