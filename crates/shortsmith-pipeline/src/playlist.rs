//! YouTube playlist and single-video sources.
//!
//! A playlist page is fetched and scraped for video ids; each id becomes a
//! row whose URL column holds the canonical Shorts URL.

use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, info};

use shortsmith_models::{extract_playlist_id, extract_youtube_id, shorts_url, Row, SheetTable};

use crate::error::{PipelineError, PipelineResult};
use crate::traits::{LoadedRows, RowSource};

pub const DEFAULT_PLAYLIST_BASE_URL: &str = "https://www.youtube.com/playlist";

static VIDEO_ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:watch\?v=|/shorts/)([A-Za-z0-9_-]{11})").unwrap()
});

/// Whether `source` points at YouTube rather than a spreadsheet.
pub fn is_youtube_source(source: &str) -> bool {
    extract_playlist_id(source).is_some() || extract_youtube_id(source).is_ok()
}

/// Unique video ids in page order.
pub fn extract_video_ids(html: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    VIDEO_ID_PATTERN
        .captures_iter(html)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|id| seen.insert(id.clone()))
        .collect()
}

/// Build a table with one URL column from a list of video ids.
pub fn table_from_ids(url_column: &str, ids: &[String]) -> SheetTable {
    let rows = ids
        .iter()
        .enumerate()
        .map(|(index, id)| {
            let mut columns = BTreeMap::new();
            columns.insert(url_column.to_string(), shorts_url(id));
            Row::new(index, index + 1, url_column, columns)
        })
        .collect();
    SheetTable {
        headers: vec![url_column.to_string()],
        rows,
    }
}

/// Rows from a playlist URL or a single video URL.
pub struct PlaylistSource {
    http: reqwest::Client,
    base_url: String,
    url_column: String,
}

impl PlaylistSource {
    pub fn new(url_column: impl Into<String>) -> PipelineResult<Self> {
        Self::with_base_url(url_column, DEFAULT_PLAYLIST_BASE_URL)
    }

    pub fn with_base_url(
        url_column: impl Into<String>,
        base_url: impl Into<String>,
    ) -> PipelineResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| PipelineError::playlist(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            url_column: url_column.into(),
        })
    }

    async fn fetch_playlist(&self, playlist_id: &str) -> PipelineResult<Vec<String>> {
        let response = self
            .http
            .get(&self.base_url)
            .query(&[("list", playlist_id)])
            .send()
            .await
            .map_err(|e| PipelineError::playlist(format!("failed to fetch playlist: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::playlist(format!(
                "playlist {playlist_id} returned HTTP {}",
                status.as_u16()
            )));
        }

        let html = response
            .text()
            .await
            .map_err(|e| PipelineError::playlist(format!("failed to read playlist page: {e}")))?;
        let ids = extract_video_ids(&html);
        debug!(playlist_id, videos = ids.len(), "Scraped playlist page");
        Ok(ids)
    }
}

#[async_trait]
impl RowSource for PlaylistSource {
    async fn load(&self, source: &str, _worksheet: Option<&str>) -> PipelineResult<LoadedRows> {
        let ids = match extract_playlist_id(source) {
            Some(playlist_id) => self.fetch_playlist(&playlist_id).await?,
            None => {
                let id = extract_youtube_id(source)
                    .map_err(|e| PipelineError::schema(format!("{source}: {e}")))?;
                vec![id]
            }
        };

        if ids.is_empty() {
            return Err(PipelineError::schema("no videos found in the playlist"));
        }

        info!(videos = ids.len(), "Loaded YouTube source");
        Ok(LoadedRows {
            table: table_from_ids(&self.url_column, &ids),
            location: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_extract_video_ids_dedupes_in_order() {
        let html = r#"<a href="/watch?v=aaaaaaaaaaa&list=PL1">x</a>
            <a href="/shorts/bbbbbbbbbbb">y</a>
            <a href="/watch?v=aaaaaaaaaaa&index=2">z</a>"#;
        assert_eq!(extract_video_ids(html), vec!["aaaaaaaaaaa", "bbbbbbbbbbb"]);
    }

    #[test]
    fn test_is_youtube_source() {
        assert!(is_youtube_source("https://www.youtube.com/playlist?list=PLabc"));
        assert!(is_youtube_source("https://youtu.be/dQw4w9WgXcQ"));
        assert!(!is_youtube_source(
            "https://docs.google.com/spreadsheets/d/1BxiMVs0XRA5nFMdKvBdBZjgmUUqptlbs74OgvE2upms/edit"
        ));
        assert!(!is_youtube_source("1BxiMVs0XRA5nFMdKvBdBZjgmUUqptlbs74OgvE2upms"));
    }

    #[test]
    fn test_table_from_ids() {
        let table = table_from_ids("youtube_url", &["dQw4w9WgXcQ".to_string()]);
        assert_eq!(table.headers, vec!["youtube_url"]);
        assert_eq!(
            table.rows[0].source_url,
            "https://www.youtube.com/shorts/dQw4w9WgXcQ"
        );
    }

    #[tokio::test]
    async fn test_single_video_needs_no_request() {
        let source = PlaylistSource::with_base_url("youtube_url", "http://127.0.0.1:9").unwrap();
        let loaded = source
            .load("https://www.youtube.com/watch?v=dQw4w9WgXcQ", None)
            .await
            .unwrap();
        assert_eq!(loaded.table.rows.len(), 1);
        assert!(loaded.location.is_none());
    }

    #[tokio::test]
    async fn test_playlist_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("list", "PLdemo"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"url":"/shorts/aaaaaaaaaaa"} {"url":"/watch?v=ccccccccccc"} /shorts/aaaaaaaaaaa"#,
            ))
            .mount(&server)
            .await;

        let source = PlaylistSource::with_base_url("youtube_url", server.uri()).unwrap();
        let loaded = source
            .load("https://www.youtube.com/playlist?list=PLdemo", None)
            .await
            .unwrap();
        let urls: Vec<_> = loaded.table.rows.iter().map(|r| r.source_url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://www.youtube.com/shorts/aaaaaaaaaaa",
                "https://www.youtube.com/shorts/ccccccccccc"
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_playlist_is_schema_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
            .mount(&server)
            .await;

        let source = PlaylistSource::with_base_url("youtube_url", server.uri()).unwrap();
        let err = source
            .load("https://www.youtube.com/playlist?list=PLempty", None)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Schema(_)));
    }
}
