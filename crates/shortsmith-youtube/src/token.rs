//! Access tokens minted from a stored OAuth refresh token.

use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{YoutubeError, YoutubeResult};
use crate::secrets::ClientSecrets;

/// Refresh a token 60 seconds before it expires.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Google issues one-hour tokens; used when the response omits `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: u64 = 3600;

/// Scopes the refresh token must have been granted.
pub const YOUTUBE_UPLOAD_SCOPE: &str = "https://www.googleapis.com/auth/youtube.upload";
pub const YOUTUBE_SCOPE: &str = "https://www.googleapis.com/auth/youtube";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    error_description: Option<String>,
}

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_valid(&self) -> bool {
        Instant::now() + TOKEN_REFRESH_MARGIN < self.expires_at
    }
}

/// Caches the access token obtained from the refresh-token grant.
pub struct OAuthTokenCache {
    http: reqwest::Client,
    secrets: ClientSecrets,
    cache: RwLock<Option<CachedToken>>,
}

impl OAuthTokenCache {
    pub fn new(http: reqwest::Client, secrets: ClientSecrets) -> Self {
        Self {
            http,
            secrets,
            cache: RwLock::new(None),
        }
    }

    pub async fn access_token(&self) -> YoutubeResult<String> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.is_valid() {
                    return Ok(cached.access_token.clone());
                }
            }
        }

        let mut cache = self.cache.write().await;

        // Another task may have refreshed while we waited for the lock
        if let Some(cached) = cache.as_ref() {
            if cached.is_valid() {
                return Ok(cached.access_token.clone());
            }
        }

        let token = self.exchange().await?;
        let access_token = token.access_token.clone();
        let ttl = Duration::from_secs(token.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS));
        *cache = Some(CachedToken {
            access_token: token.access_token,
            expires_at: Instant::now() + ttl,
        });

        debug!(expires_in_secs = ttl.as_secs(), "Refreshed YouTube access token");
        Ok(access_token)
    }

    pub async fn invalidate(&self) {
        *self.cache.write().await = None;
    }

    async fn exchange(&self) -> YoutubeResult<TokenResponse> {
        let params = [
            ("grant_type", "refresh_token"),
            ("client_id", self.secrets.client_id.as_str()),
            ("client_secret", self.secrets.client_secret.as_str()),
            ("refresh_token", self.secrets.refresh_token.as_str()),
        ];

        let response = self
            .http
            .post(&self.secrets.token_uri)
            .form(&params)
            .send()
            .await
            .map_err(|e| YoutubeError::auth(format!("token endpoint unreachable: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = match serde_json::from_str::<TokenErrorResponse>(&body) {
                Ok(err) => match err.error_description {
                    Some(desc) => format!("{}: {}", err.error, desc),
                    None => err.error,
                },
                Err(_) => body,
            };
            warn!(status = status.as_u16(), "Refresh token exchange rejected");
            return Err(YoutubeError::auth(format!(
                "refresh token exchange failed ({}): {}",
                status.as_u16(),
                detail
            )));
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| YoutubeError::auth(format!("invalid token response: {e}")))
    }
}
