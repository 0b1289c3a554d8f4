//! URL parsing for YouTube videos, playlists and Google spreadsheets.

use thiserror::Error;
use url::Url;

/// Errors that can occur while pulling an id out of a URL.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum YoutubeIdError {
    #[error("URL is not a valid YouTube URL")]
    InvalidYoutubeUrl,

    #[error("video ID has invalid format")]
    InvalidVideoId,

    #[error("video ID not found in URL")]
    VideoIdNotFound,

    #[error("not a Google Sheets URL or spreadsheet ID")]
    InvalidSpreadsheet,
}

pub type YoutubeIdResult<T> = Result<T, YoutubeIdError>;

const YOUTUBE_HOSTS: &[&str] = &[
    "youtube.com",
    "www.youtube.com",
    "m.youtube.com",
    "music.youtube.com",
    "youtube-nocookie.com",
    "www.youtube-nocookie.com",
];

/// Parse a URL, tolerating a missing scheme (`youtu.be/abc`).
fn parse_loose(input: &str) -> Option<Url> {
    let input = input.trim();
    Url::parse(input)
        .ok()
        .or_else(|| Url::parse(&format!("https://{input}")).ok())
        .filter(|u| matches!(u.scheme(), "http" | "https"))
}

fn host_of(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_ascii_lowercase())
}

/// Extract the 11-character video id from any common YouTube URL form:
/// `watch?v=`, `youtu.be/`, `/embed/`, `/v/` and `/shorts/`.
pub fn extract_youtube_id(input: &str) -> YoutubeIdResult<String> {
    let url = parse_loose(input).ok_or(YoutubeIdError::InvalidYoutubeUrl)?;
    let host = host_of(&url).ok_or(YoutubeIdError::InvalidYoutubeUrl)?;

    let candidate = if host == "youtu.be" {
        url.path_segments().and_then(|mut s| s.next()).map(str::to_string)
    } else if YOUTUBE_HOSTS.contains(&host.as_str()) {
        let segments: Vec<&str> = url.path_segments().map(|s| s.collect()).unwrap_or_default();
        match segments.as_slice() {
            ["watch", ..] => url
                .query_pairs()
                .find(|(k, _)| k == "v")
                .map(|(_, v)| v.into_owned()),
            ["embed" | "v" | "shorts" | "live", id, ..] => Some(id.to_string()),
            _ => None,
        }
    } else {
        return Err(YoutubeIdError::InvalidYoutubeUrl);
    };

    match candidate {
        Some(id) if !id.is_empty() => validate_youtube_id(id),
        _ => Err(YoutubeIdError::VideoIdNotFound),
    }
}

/// Canonical Shorts URL for a video id.
pub fn shorts_url(video_id: &str) -> String {
    format!("https://www.youtube.com/shorts/{video_id}")
}

/// Extract the `list=` id of a YouTube playlist URL.
pub fn extract_playlist_id(input: &str) -> Option<String> {
    let url = parse_loose(input)?;
    let host = host_of(&url)?;
    if host != "youtu.be" && !YOUTUBE_HOSTS.contains(&host.as_str()) {
        return None;
    }
    url.query_pairs()
        .find(|(k, _)| k == "list")
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty() && is_id_chars(v))
}

/// Extract a spreadsheet id from a `docs.google.com/spreadsheets/d/<ID>/...`
/// URL, or accept a bare id.
pub fn extract_spreadsheet_id(input: &str) -> YoutubeIdResult<String> {
    let input = input.trim();
    if input.len() >= 20 && is_id_chars(input) {
        return Ok(input.to_string());
    }

    let url = parse_loose(input).ok_or(YoutubeIdError::InvalidSpreadsheet)?;
    if host_of(&url).as_deref() != Some("docs.google.com") {
        return Err(YoutubeIdError::InvalidSpreadsheet);
    }
    let segments: Vec<&str> = url.path_segments().map(|s| s.collect()).unwrap_or_default();
    match segments.as_slice() {
        ["spreadsheets", "d", id, ..] if id.len() >= 20 && is_id_chars(id) => Ok(id.to_string()),
        _ => Err(YoutubeIdError::InvalidSpreadsheet),
    }
}

fn is_id_chars(s: &str) -> bool {
    s.chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn validate_youtube_id(id: String) -> YoutubeIdResult<String> {
    if id.len() != 11 || !is_id_chars(&id) {
        return Err(YoutubeIdError::InvalidVideoId);
    }
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_youtube_id_forms() {
        for url in [
            "https://youtube.com/watch?v=dQw4w9WgXcQ",
            "https://www.youtube.com/watch?feature=share&v=dQw4w9WgXcQ",
            "https://youtu.be/dQw4w9WgXcQ?t=30",
            "youtu.be/dQw4w9WgXcQ",
            "https://youtube.com/embed/dQw4w9WgXcQ",
            "https://youtube.com/v/dQw4w9WgXcQ",
            "https://youtube.com/shorts/dQw4w9WgXcQ",
            "https://m.youtube.com/shorts/dQw4w9WgXcQ?feature=share",
        ] {
            assert_eq!(extract_youtube_id(url).unwrap(), "dQw4w9WgXcQ", "{url}");
        }
    }

    #[test]
    fn test_extract_youtube_id_errors() {
        assert_eq!(
            extract_youtube_id("https://vimeo.com/123456"),
            Err(YoutubeIdError::InvalidYoutubeUrl)
        );
        assert_eq!(
            extract_youtube_id("https://youtube.com/watch?v=short"),
            Err(YoutubeIdError::InvalidVideoId)
        );
        assert_eq!(
            extract_youtube_id("https://youtube.com/feed/trending"),
            Err(YoutubeIdError::VideoIdNotFound)
        );
        assert_eq!(
            extract_youtube_id("not a url at all"),
            Err(YoutubeIdError::InvalidYoutubeUrl)
        );
        // Lookalike hosts are rejected
        assert_eq!(
            extract_youtube_id("https://notyoutube.com/watch?v=dQw4w9WgXcQ"),
            Err(YoutubeIdError::InvalidYoutubeUrl)
        );
    }

    #[test]
    fn test_shorts_url() {
        assert_eq!(
            shorts_url("dQw4w9WgXcQ"),
            "https://www.youtube.com/shorts/dQw4w9WgXcQ"
        );
    }

    #[test]
    fn test_extract_playlist_id() {
        assert_eq!(
            extract_playlist_id("https://www.youtube.com/playlist?list=PLrAXtmRdnEQy4qtr"),
            Some("PLrAXtmRdnEQy4qtr".to_string())
        );
        assert_eq!(
            extract_playlist_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ"),
            None
        );
    }

    #[test]
    fn test_extract_spreadsheet_id() {
        let id = "1BxiMVs0XRA5nFMdKvBdBZjgmUUqptlbs74OgvE2upms";
        assert_eq!(
            extract_spreadsheet_id(&format!(
                "https://docs.google.com/spreadsheets/d/{id}/edit#gid=0"
            ))
            .unwrap(),
            id
        );
        assert_eq!(extract_spreadsheet_id(id).unwrap(), id);
        assert_eq!(
            extract_spreadsheet_id("https://example.com/spreadsheets/d/abc"),
            Err(YoutubeIdError::InvalidSpreadsheet)
        );
        assert_eq!(
            extract_spreadsheet_id("https://docs.google.com/document/d/xyz"),
            Err(YoutubeIdError::InvalidSpreadsheet)
        );
    }
}
