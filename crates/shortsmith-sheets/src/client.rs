//! Google Sheets v4 REST client.
//!
//! Reads a worksheet into a [`SheetTable`] and, when configured, writes a
//! per-row status back into one column.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, info_span, Instrument};

use shortsmith_models::{extract_spreadsheet_id, SheetTable};

use crate::error::{SheetsError, SheetsResult};
use crate::metrics::record_request;
use crate::retry::{with_retry, RetryConfig};
use crate::token_cache::{AccessTokenSource, TokenCache, SHEETS_READONLY_SCOPE, SHEETS_SCOPE};

pub const DEFAULT_BASE_URL: &str = "https://sheets.googleapis.com/v4/spreadsheets";

/// Sheets client configuration.
#[derive(Debug, Clone)]
pub struct SheetsConfig {
    /// Service-account JSON key file
    pub credentials_path: PathBuf,
    /// Header of the column holding the short URL
    pub url_column: String,
    /// Header of the column that receives per-row results, if any
    pub status_column: Option<String>,
    pub base_url: String,
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub retry: RetryConfig,
}

impl Default for SheetsConfig {
    fn default() -> Self {
        Self {
            credentials_path: PathBuf::from("credentials.json"),
            url_column: "youtube_url".to_string(),
            status_column: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
            retry: RetryConfig::default(),
        }
    }
}

impl SheetsConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            credentials_path: std::env::var("SHEETS_CREDENTIALS_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.credentials_path),
            url_column: std::env::var("URL_COLUMN")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.url_column),
            status_column: std::env::var("SHEETS_STATUS_COLUMN")
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            ..defaults
        }
    }

    /// Scope the token must carry: write-back needs full spreadsheet access.
    pub fn scope(&self) -> &'static str {
        if self.status_column.is_some() {
            SHEETS_SCOPE
        } else {
            SHEETS_READONLY_SCOPE
        }
    }
}

/// A worksheet read from a spreadsheet, plus where it came from.
#[derive(Debug, Clone)]
pub struct SheetData {
    pub spreadsheet_id: String,
    pub worksheet: String,
    pub table: SheetTable,
}

/// One cell update for [`SheetsClient::write_statuses`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    /// 1-based worksheet line
    pub line: usize,
    pub value: String,
}

#[derive(Debug, Deserialize)]
struct SpreadsheetMetadata {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
struct SheetProperties {
    title: String,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchUpdateRequest {
    value_input_option: &'static str,
    data: Vec<BatchUpdateRange>,
}

#[derive(Debug, Serialize)]
struct BatchUpdateRange {
    range: String,
    values: Vec<Vec<String>>,
}

/// Google Sheets REST client.
#[derive(Clone)]
pub struct SheetsClient {
    http: Client,
    config: SheetsConfig,
    tokens: Arc<dyn AccessTokenSource>,
}

impl SheetsClient {
    /// Create a client authenticated with the configured service-account file.
    pub fn new(config: SheetsConfig) -> SheetsResult<Self> {
        let tokens = TokenCache::from_service_account_file(&config.credentials_path, config.scope())?;
        Self::with_token_source(config, Arc::new(tokens))
    }

    pub fn with_token_source(
        config: SheetsConfig,
        tokens: Arc<dyn AccessTokenSource>,
    ) -> SheetsResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(concat!("shortsmith-sheets/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            config,
            tokens,
        })
    }

    pub fn config(&self) -> &SheetsConfig {
        &self.config
    }

    /// Read a worksheet as a table keyed by its header row.
    ///
    /// `spreadsheet` is a full Sheets URL or a bare id; `worksheet` defaults
    /// to the first sheet of the spreadsheet.
    pub async fn read_table(
        &self,
        spreadsheet: &str,
        worksheet: Option<&str>,
    ) -> SheetsResult<SheetData> {
        let spreadsheet_id = extract_spreadsheet_id(spreadsheet)
            .map_err(|e| SheetsError::not_found(format!("{spreadsheet}: {e}")))?;

        let worksheet = match worksheet.map(str::trim).filter(|w| !w.is_empty()) {
            Some(title) => title.to_string(),
            None => self.first_sheet_title(&spreadsheet_id).await?,
        };

        let values = self.read_values(&spreadsheet_id, &worksheet).await?;
        let table = SheetTable::from_values(values, &self.config.url_column)?;

        info!(
            spreadsheet_id = %spreadsheet_id,
            worksheet = %worksheet,
            rows = table.rows.len(),
            "Read worksheet"
        );

        Ok(SheetData {
            spreadsheet_id,
            worksheet,
            table,
        })
    }

    /// Title of the first worksheet.
    pub async fn first_sheet_title(&self, spreadsheet_id: &str) -> SheetsResult<String> {
        let url = format!("{}/{}", self.config.base_url, spreadsheet_id);
        let meta: SpreadsheetMetadata = with_retry(&self.config.retry, "get_metadata", || {
            self.get_json(
                "get_metadata",
                &url,
                &[("fields", "sheets.properties.title")],
            )
        })
        .await?;

        meta.sheets
            .into_iter()
            .next()
            .map(|s| s.properties.title)
            .ok_or_else(|| SheetsError::schema("spreadsheet has no worksheets"))
    }

    async fn read_values(
        &self,
        spreadsheet_id: &str,
        worksheet: &str,
    ) -> SheetsResult<Vec<Vec<String>>> {
        let url = format!(
            "{}/{}/values/{}",
            self.config.base_url,
            spreadsheet_id,
            urlencoding::encode(&quote_sheet_title(worksheet))
        );

        let range: ValueRange = with_retry(&self.config.retry, "get_values", || {
            self.get_json(
                "get_values",
                &url,
                &[
                    ("majorDimension", "ROWS"),
                    ("valueRenderOption", "FORMATTED_VALUE"),
                ],
            )
        })
        .await?;

        Ok(range
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_to_string).collect())
            .collect())
    }

    /// Write one value per line into `column` (0-based) of `worksheet`.
    pub async fn write_statuses(
        &self,
        spreadsheet_id: &str,
        worksheet: &str,
        column: usize,
        updates: &[StatusUpdate],
    ) -> SheetsResult<()> {
        if updates.is_empty() {
            return Ok(());
        }

        let sheet = quote_sheet_title(worksheet);
        let letter = column_letter(column);
        let body = BatchUpdateRequest {
            value_input_option: "USER_ENTERED",
            data: updates
                .iter()
                .map(|u| BatchUpdateRange {
                    range: format!("{sheet}!{letter}{}", u.line),
                    values: vec![vec![u.value.clone()]],
                })
                .collect(),
        };

        let url = format!(
            "{}/{}/values:batchUpdate",
            self.config.base_url, spreadsheet_id
        );

        self.send_json::<Value, _>("batch_update", &url, &body)
            .await?;
        debug!(
            spreadsheet_id = %spreadsheet_id,
            cells = updates.len(),
            "Wrote row statuses"
        );
        Ok(())
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        operation: &str,
        url: &str,
        query: &[(&str, &str)],
    ) -> SheetsResult<T> {
        self.execute(operation, || self.http.get(url).query(query))
            .await
    }

    async fn send_json<T, B>(&self, operation: &str, url: &str, body: &B) -> SheetsResult<T>
    where
        T: serde::de::DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.execute(operation, || self.http.post(url).json(body))
            .await
    }

    /// Send an authenticated request, retrying once with a fresh token on 401.
    async fn execute<T, R>(&self, operation: &str, build: R) -> SheetsResult<T>
    where
        T: serde::de::DeserializeOwned,
        R: Fn() -> reqwest::RequestBuilder,
    {
        let span = info_span!("sheets_request", operation = %operation);
        let start = Instant::now();

        let result = async {
            let token = self.tokens.access_token().await?;
            let mut response = build().bearer_auth(&token).send().await?;

            if response.status() == StatusCode::UNAUTHORIZED {
                debug!("Sheets returned 401, refreshing token");
                self.tokens.invalidate().await;
                let token = self.tokens.access_token().await?;
                response = build().bearer_auth(&token).send().await?;
            }

            let status = response.status();
            if status.is_success() {
                return Ok(response.json::<T>().await?);
            }

            let retry_after_ms = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|secs| secs * 1000);
            let body = response.text().await.unwrap_or_default();

            Err(match SheetsError::from_http_status(status.as_u16(), body) {
                SheetsError::RateLimited { .. } => SheetsError::RateLimited { retry_after_ms },
                other => other,
            })
        }
        .instrument(span)
        .await;

        let status = match &result {
            Ok(_) => 200,
            Err(e) => e.http_status().unwrap_or(0),
        };
        record_request(operation, status, start.elapsed().as_millis() as f64);

        result
    }
}

/// Quote a worksheet title for A1 notation: `My Sheet` becomes `'My Sheet'`.
fn quote_sheet_title(title: &str) -> String {
    format!("'{}'", title.replace('\'', "''"))
}

/// 0-based column index to A1 letters: 0 is `A`, 26 is `AA`.
pub fn column_letter(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    letters.reverse();
    String::from_utf8_lossy(&letters).into_owned()
}

fn cell_to_string(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
