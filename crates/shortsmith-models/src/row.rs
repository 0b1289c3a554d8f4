//! Spreadsheet rows and worksheet tables.

use std::collections::{BTreeMap, HashSet};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One spreadsheet record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Row {
    /// 0-based position among the data rows that were kept
    pub index: usize,
    /// 1-based worksheet line (the header is line 1)
    pub line: usize,
    /// Value of the configured URL column
    pub source_url: String,
    /// Every column of the row keyed by header, URL column included
    pub columns: BTreeMap<String, String>,
}

impl Row {
    /// Create a row from its column map, pulling the source URL out of `url_column`.
    pub fn new(
        index: usize,
        line: usize,
        url_column: &str,
        columns: BTreeMap<String, String>,
    ) -> Self {
        let source_url = columns
            .get(url_column)
            .map(|v| v.trim().to_string())
            .unwrap_or_default();
        Self {
            index,
            line,
            source_url,
            columns,
        }
    }

    /// Look up a column value.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.columns.get(column).map(String::as_str)
    }

    /// Whether the row carries a source URL at all.
    pub fn has_source(&self) -> bool {
        !self.source_url.is_empty()
    }
}

/// Errors raised while turning raw worksheet values into rows.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableError {
    #[error("worksheet is empty")]
    Empty,

    #[error("header cell {0} is blank")]
    BlankHeader(usize),

    #[error("duplicate header '{0}'")]
    DuplicateHeader(String),

    #[error("required column '{0}' is missing")]
    MissingColumn(String),
}

/// A worksheet: header row plus data rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SheetTable {
    pub headers: Vec<String>,
    pub rows: Vec<Row>,
}

impl SheetTable {
    /// Build a table from the raw `values` grid returned by the Sheets API.
    ///
    /// The first row is the header. Short rows are padded with empty strings,
    /// cells past the header width are ignored and fully blank rows are dropped.
    pub fn from_values(values: Vec<Vec<String>>, url_column: &str) -> Result<Self, TableError> {
        let mut lines = values.into_iter();
        let raw_headers = lines.next().ok_or(TableError::Empty)?;

        // Trailing blank header cells are common in hand-edited sheets
        let mut headers: Vec<String> = raw_headers.iter().map(|h| h.trim().to_string()).collect();
        while headers.last().is_some_and(|h| h.is_empty()) {
            headers.pop();
        }
        if headers.is_empty() {
            return Err(TableError::Empty);
        }

        let mut seen = HashSet::new();
        for (i, header) in headers.iter().enumerate() {
            if header.is_empty() {
                return Err(TableError::BlankHeader(i + 1));
            }
            if !seen.insert(header.as_str()) {
                return Err(TableError::DuplicateHeader(header.clone()));
            }
        }

        if !seen.contains(url_column) {
            return Err(TableError::MissingColumn(url_column.to_string()));
        }

        let mut rows = Vec::new();
        for (offset, cells) in lines.enumerate() {
            if cells.iter().all(|c| c.trim().is_empty()) {
                continue;
            }

            let columns = headers
                .iter()
                .enumerate()
                .map(|(i, h)| (h.clone(), cells.get(i).cloned().unwrap_or_default()))
                .collect();

            rows.push(Row::new(rows.len(), offset + 2, url_column, columns));
        }

        Ok(Self { headers, rows })
    }

    /// Position of a header, 0-based.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(rows: &[&[&str]]) -> Vec<Vec<String>> {
        rows.iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    #[test]
    fn test_from_values_pads_and_skips_blank_rows() {
        let table = SheetTable::from_values(
            grid(&[
                &["youtube_url", "creator", "notes"],
                &["https://youtube.com/shorts/aaaaaaaaaaa", "alice"],
                &["", "", ""],
                &["https://youtube.com/shorts/bbbbbbbbbbb", "bob", "x"],
            ]),
            "youtube_url",
        )
        .unwrap();

        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].get("notes"), Some(""));
        assert_eq!(table.rows[1].index, 1);
        assert_eq!(table.rows[1].line, 4);
        assert_eq!(
            table.rows[1].source_url,
            "https://youtube.com/shorts/bbbbbbbbbbb"
        );
    }

    #[test]
    fn test_missing_url_column() {
        let err = SheetTable::from_values(grid(&[&["link", "creator"]]), "youtube_url")
            .unwrap_err();
        assert_eq!(err, TableError::MissingColumn("youtube_url".to_string()));
    }

    #[test]
    fn test_header_problems() {
        assert_eq!(
            SheetTable::from_values(Vec::new(), "youtube_url").unwrap_err(),
            TableError::Empty
        );
        assert_eq!(
            SheetTable::from_values(grid(&[&["youtube_url", "", "x"]]), "youtube_url")
                .unwrap_err(),
            TableError::BlankHeader(2)
        );
        assert_eq!(
            SheetTable::from_values(grid(&[&["youtube_url", "a", "a"]]), "youtube_url")
                .unwrap_err(),
            TableError::DuplicateHeader("a".to_string())
        );
    }

    #[test]
    fn test_trailing_blank_headers_are_ignored() {
        let table =
            SheetTable::from_values(grid(&[&["youtube_url", "title", "", ""]]), "youtube_url")
                .unwrap();
        assert_eq!(table.headers, vec!["youtube_url", "title"]);
        assert_eq!(table.column_index("title"), Some(1));
    }

    #[test]
    fn test_row_without_source() {
        let table = SheetTable::from_values(
            grid(&[&["youtube_url", "creator"], &["  ", "carol"]]),
            "youtube_url",
        )
        .unwrap();
        assert!(!table.rows[0].has_source());
    }
}
