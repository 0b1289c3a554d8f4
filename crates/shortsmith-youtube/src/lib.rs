//! YouTube Data API v3 uploader.
//!
//! Authenticates with an OAuth client plus a stored refresh token and uploads
//! composed videos through the resumable upload protocol.

pub mod client;
pub mod error;
pub mod secrets;
pub mod token;

pub use client::{UploadRequest, UploadedVideo, YoutubeConfig, YoutubeUploader};
pub use error::{YoutubeError, YoutubeResult};
pub use secrets::ClientSecrets;
pub use token::OAuthTokenCache;
