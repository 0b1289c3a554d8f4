//! Access tokens for the Sheets API.
//!
//! Service-account tokens are cached with:
//! - Refresh margin to avoid token expiry during requests
//! - Single-flight refresh so concurrent callers share one token exchange
//! - Fallback to the existing token while it is still usable

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use gcp_auth::{CustomServiceAccount, TokenProvider};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{SheetsError, SheetsResult};

/// Refresh a token 60 seconds before it expires.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Read-only access to spreadsheet values.
pub const SHEETS_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets.readonly";

/// Read/write access, needed for status write-back.
pub const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";

/// Anything that can hand out a bearer token for the Sheets API.
#[async_trait]
pub trait AccessTokenSource: Send + Sync {
    async fn access_token(&self) -> SheetsResult<String>;

    /// Drop any cached token so the next call fetches a fresh one.
    async fn invalidate(&self) {}
}

/// A fixed token, for tests and pre-issued credentials.
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

#[async_trait]
impl AccessTokenSource for StaticToken {
    async fn access_token(&self) -> SheetsResult<String> {
        Ok(self.0.clone())
    }
}

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_valid(&self) -> bool {
        Instant::now() + TOKEN_REFRESH_MARGIN < self.expires_at
    }

    /// Past the refresh margin but not yet expired.
    fn is_usable(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// Thread-safe token cache over a `gcp_auth` provider.
pub struct TokenCache {
    auth: Arc<dyn TokenProvider>,
    scope: &'static str,
    cache: RwLock<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new(auth: Arc<dyn TokenProvider>, scope: &'static str) -> Self {
        Self {
            auth,
            scope,
            cache: RwLock::new(None),
        }
    }

    /// Load a service-account JSON key file.
    pub fn from_service_account_file(
        path: impl AsRef<Path>,
        scope: &'static str,
    ) -> SheetsResult<Self> {
        let path = path.as_ref();
        let account = CustomServiceAccount::from_file(path).map_err(|e| {
            SheetsError::auth(format!(
                "failed to load service account from {}: {}",
                path.display(),
                e
            ))
        })?;
        Ok(Self::new(Arc::new(account), scope))
    }

    pub fn scope(&self) -> &'static str {
        self.scope
    }

    async fn refresh_token(&self, cache: &mut Option<CachedToken>) -> SheetsResult<String> {
        match self.auth.token(&[self.scope]).await {
            Ok(token) => {
                let access_token = token.as_str().to_string();

                let now = Utc::now();
                let expires_at = match (token.expires_at() - now).to_std() {
                    Ok(ttl) => Instant::now() + ttl,
                    // Already expired: force a refresh on the next request
                    Err(_) => Instant::now(),
                };

                *cache = Some(CachedToken {
                    access_token: access_token.clone(),
                    expires_at,
                });

                debug!(scope = self.scope, "Refreshed Sheets auth token");
                Ok(access_token)
            }
            Err(e) => {
                if let Some(cached) = cache.as_ref() {
                    if cached.is_usable() {
                        warn!("Token refresh failed, using existing token: {}", e);
                        return Ok(cached.access_token.clone());
                    }
                }

                Err(SheetsError::auth(format!(
                    "failed to obtain auth token: {}",
                    e
                )))
            }
        }
    }
}

#[async_trait]
impl AccessTokenSource for TokenCache {
    async fn access_token(&self) -> SheetsResult<String> {
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

        self.refresh_token(&mut cache).await
    }

    async fn invalidate(&self) {
        *self.cache.write().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scopes() {
        assert!(SHEETS_READONLY_SCOPE.ends_with("spreadsheets.readonly"));
        assert!(SHEETS_SCOPE.ends_with("spreadsheets"));
    }

    #[test]
    fn test_missing_credentials_file_is_auth_error() {
        let err = TokenCache::from_service_account_file(
            "/nonexistent/credentials.json",
            SHEETS_READONLY_SCOPE,
        )
        .err()
        .unwrap();
        assert!(matches!(err, SheetsError::Auth(_)));
    }

    #[tokio::test]
    async fn test_static_token() {
        let source = StaticToken("abc".to_string());
        assert_eq!(source.access_token().await.unwrap(), "abc");
    }
}
