//! OAuth client secrets with a stored refresh token.
//!
//! The file is the Google Cloud console download (`web` or `installed`
//! section) with the channel's `refresh_token` added at the top level.

use std::path::Path;

use serde::Deserialize;

use crate::error::{YoutubeError, YoutubeResult};

pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

#[derive(Debug, Deserialize)]
struct SecretsFile {
    web: Option<ClientSection>,
    installed: Option<ClientSection>,
    refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClientSection {
    client_id: String,
    client_secret: String,
    token_uri: Option<String>,
}

/// Everything needed to mint access tokens for one channel.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    pub token_uri: String,
    pub refresh_token: String,
}

impl std::fmt::Debug for ClientSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSecrets")
            .field("client_id", &self.client_id)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

impl ClientSecrets {
    pub fn from_json(json: &str) -> YoutubeResult<Self> {
        let file: SecretsFile = serde_json::from_str(json)
            .map_err(|e| YoutubeError::auth(format!("invalid client secrets: {e}")))?;

        let client = file.web.or(file.installed).ok_or_else(|| {
            YoutubeError::auth("client secrets have neither a 'web' nor an 'installed' section")
        })?;

        let refresh_token = file
            .refresh_token
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| YoutubeError::auth("client secrets have no refresh_token"))?;

        Ok(Self {
            client_id: client.client_id,
            client_secret: client.client_secret,
            token_uri: client
                .token_uri
                .unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string()),
            refresh_token,
        })
    }

    pub fn from_file(path: impl AsRef<Path>) -> YoutubeResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            YoutubeError::auth(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&json)
    }
}
