//! Title and description templates.
//!
//! A template is plain text with `{column name}` placeholders. `{{` and `}}`
//! produce literal braces. Two built-ins are always available: `{number}`
//! and `{originalUrl}`; they win over sheet columns with the same name.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::row::Row;

pub const NUMBER_PLACEHOLDER: &str = "number";
pub const ORIGINAL_URL_PLACEHOLDER: &str = "originalUrl";

pub const DEFAULT_TITLE_TEMPLATE: &str = "Short #{number} - Repost";
pub const DEFAULT_DESCRIPTION_TEMPLATE: &str =
    "Original video: {originalUrl}\n\n#shorts #viral #trending";

/// YouTube rejects longer titles.
pub const MAX_TITLE_CHARS: usize = 100;
/// YouTube rejects longer descriptions.
pub const MAX_DESCRIPTION_BYTES: usize = 5000;

/// Which template a problem was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateField {
    Title,
    Description,
}

impl std::fmt::Display for TemplateField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TemplateField::Title => f.write_str("title"),
            TemplateField::Description => f.write_str("description"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("{field} template has an unbalanced brace at character {position}")]
    Unbalanced { field: TemplateField, position: usize },

    #[error("{field} template references unknown placeholder '{{{name}}}'")]
    UnknownPlaceholder { field: TemplateField, name: String },

    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

fn parse(field: TemplateField, source: &str) -> Result<Vec<Segment>, TemplateError> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = source.chars().enumerate().peekable();

    while let Some((pos, c)) = chars.next() {
        match c {
            '{' if chars.peek().is_some_and(|(_, n)| *n == '{') => {
                chars.next();
                literal.push('{');
            }
            '}' if chars.peek().is_some_and(|(_, n)| *n == '}') => {
                chars.next();
                literal.push('}');
            }
            '{' => {
                let mut name = String::new();
                let mut closed = false;
                for (_, n) in chars.by_ref() {
                    match n {
                        '}' => {
                            closed = true;
                            break;
                        }
                        '{' => break,
                        other => name.push(other),
                    }
                }
                let name = name.trim();
                if !closed || name.is_empty() {
                    return Err(TemplateError::Unbalanced {
                        field,
                        position: pos,
                    });
                }
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Placeholder(name.to_string()));
            }
            '}' => {
                return Err(TemplateError::Unbalanced {
                    field,
                    position: pos,
                })
            }
            other => literal.push(other),
        }
    }

    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}

fn is_builtin(name: &str) -> bool {
    name == NUMBER_PLACEHOLDER || name == ORIGINAL_URL_PLACEHOLDER
}

/// Per-row values available to a template.
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    pub row: &'a Row,
    /// Starting number plus the row's ordinal among processed rows
    pub number: u64,
}

impl<'a> RenderContext<'a> {
    pub fn new(row: &'a Row, number: u64) -> Self {
        Self { row, number }
    }

    fn resolve(&self, field: TemplateField, name: &str) -> Result<String, TemplateError> {
        match name {
            NUMBER_PLACEHOLDER => Ok(self.number.to_string()),
            ORIGINAL_URL_PLACEHOLDER => Ok(self.row.source_url.clone()),
            _ => self
                .row
                .get(name)
                .map(str::to_string)
                .ok_or_else(|| TemplateError::UnknownPlaceholder {
                    field,
                    name: name.to_string(),
                }),
        }
    }
}

/// Rendered per-row metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RenderedMetadata {
    pub title: String,
    pub description: String,
}

impl RenderedMetadata {
    /// Check the rendered strings against YouTube's metadata limits.
    pub fn validate(&self) -> Result<(), TemplateError> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(TemplateError::InvalidMetadata(
                "rendered title is empty".to_string(),
            ));
        }
        let title_chars = title.chars().count();
        if title_chars > MAX_TITLE_CHARS {
            return Err(TemplateError::InvalidMetadata(format!(
                "title is {title_chars} characters, limit is {MAX_TITLE_CHARS}"
            )));
        }
        if self.description.len() > MAX_DESCRIPTION_BYTES {
            return Err(TemplateError::InvalidMetadata(format!(
                "description is {} bytes, limit is {MAX_DESCRIPTION_BYTES}",
                self.description.len()
            )));
        }
        for (field, value) in [("title", &self.title), ("description", &self.description)] {
            if value.contains('<') || value.contains('>') {
                return Err(TemplateError::InvalidMetadata(format!(
                    "{field} may not contain '<' or '>'"
                )));
            }
        }
        Ok(())
    }
}

/// Title and description template pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct MetadataTemplate {
    pub title: String,
    pub description: String,
}

impl Default for MetadataTemplate {
    fn default() -> Self {
        Self {
            title: DEFAULT_TITLE_TEMPLATE.to_string(),
            description: DEFAULT_DESCRIPTION_TEMPLATE.to_string(),
        }
    }
}

impl MetadataTemplate {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
        }
    }

    fn fields(&self) -> [(TemplateField, &str); 2] {
        [
            (TemplateField::Title, self.title.as_str()),
            (TemplateField::Description, self.description.as_str()),
        ]
    }

    /// Placeholder names used by both templates, built-ins included.
    pub fn placeholders(&self) -> Result<Vec<String>, TemplateError> {
        let mut names = Vec::new();
        for (field, source) in self.fields() {
            for segment in parse(field, source)? {
                if let Segment::Placeholder(name) = segment {
                    if !names.contains(&name) {
                        names.push(name);
                    }
                }
            }
        }
        Ok(names)
    }

    /// Check both templates against a sheet's headers.
    ///
    /// Runs once before any row is processed, so per-row rendering never
    /// meets an unknown placeholder.
    pub fn validate(&self, headers: &[String]) -> Result<(), TemplateError> {
        for (field, source) in self.fields() {
            for segment in parse(field, source)? {
                if let Segment::Placeholder(name) = segment {
                    if !is_builtin(&name) && !headers.iter().any(|h| *h == name) {
                        return Err(TemplateError::UnknownPlaceholder { field, name });
                    }
                }
            }
        }
        Ok(())
    }

    /// Render both templates for one row and check the result against YouTube's limits.
    pub fn render(&self, ctx: &RenderContext<'_>) -> Result<RenderedMetadata, TemplateError> {
        let rendered = RenderedMetadata {
            title: render_field(TemplateField::Title, &self.title, ctx)?
                .trim()
                .to_string(),
            description: render_field(TemplateField::Description, &self.description, ctx)?,
        };
        rendered.validate()?;
        Ok(rendered)
    }
}

fn render_field(
    field: TemplateField,
    source: &str,
    ctx: &RenderContext<'_>,
) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(source.len());
    for segment in parse(field, source)? {
        match segment {
            Segment::Literal(text) => out.push_str(&text),
            Segment::Placeholder(name) => out.push_str(&ctx.resolve(field, &name)?),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn row(pairs: &[(&str, &str)]) -> Row {
        let columns: BTreeMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Row::new(0, 2, "youtube_url", columns)
    }

    #[test]
    fn test_render_substitutes_columns() {
        let r = row(&[
            ("youtube_url", "https://youtube.com/shorts/aaaaaaaaaaa"),
            ("creator", "Ada"),
        ]);
        let template = MetadataTemplate::new("Clip by {creator}", "via {originalUrl}");
        let out = template.render(&RenderContext::new(&r, 7)).unwrap();
        assert_eq!(out.title, "Clip by Ada");
        assert_eq!(out.description, "via https://youtube.com/shorts/aaaaaaaaaaa");
    }

    #[test]
    fn test_default_templates() {
        let r = row(&[("youtube_url", "https://youtu.be/aaaaaaaaaaa")]);
        let out = MetadataTemplate::default()
            .render(&RenderContext::new(&r, 12))
            .unwrap();
        assert_eq!(out.title, "Short #12 - Repost");
        assert!(out
            .description
            .starts_with("Original video: https://youtu.be/aaaaaaaaaaa"));
    }

    #[test]
    fn test_builtins_take_precedence() {
        let r = row(&[("youtube_url", "u"), ("number", "from-sheet")]);
        let template = MetadataTemplate::new("#{number}", "");
        let out = template.render(&RenderContext::new(&r, 3)).unwrap();
        assert_eq!(out.title, "#3");
    }

    #[test]
    fn test_escaped_braces() {
        let r = row(&[("youtube_url", "u"), ("tag", "x")]);
        let template = MetadataTemplate::new("{{literal}} {tag}", "}}");
        let out = template.render(&RenderContext::new(&r, 1)).unwrap();
        assert_eq!(out.title, "{literal} x");
        assert_eq!(out.description, "}");
    }

    #[test]
    fn test_validate_rejects_unknown_placeholder() {
        let headers = vec!["youtube_url".to_string(), "creator".to_string()];
        let template = MetadataTemplate::new("{creator}", "{missing}");
        assert_eq!(
            template.validate(&headers).unwrap_err(),
            TemplateError::UnknownPlaceholder {
                field: TemplateField::Description,
                name: "missing".to_string()
            }
        );
        assert!(MetadataTemplate::default().validate(&headers).is_ok());
    }

    #[test]
    fn test_unbalanced_braces() {
        let headers = vec!["youtube_url".to_string()];
        for bad in ["{open", "close}", "{}", "{a{b}"] {
            let err = MetadataTemplate::new(bad, "").validate(&headers).unwrap_err();
            assert!(
                matches!(err, TemplateError::Unbalanced { .. }),
                "{bad}: {err:?}"
            );
        }
    }

    #[test]
    fn test_youtube_limits() {
        let long = "x".repeat(120);
        let r = row(&[("youtube_url", "u"), ("long", long.as_str())]);
        let err = MetadataTemplate::new("{long}", "")
            .render(&RenderContext::new(&r, 1))
            .unwrap_err();
        assert!(matches!(err, TemplateError::InvalidMetadata(_)));

        let err = MetadataTemplate::new("   ", "")
            .render(&RenderContext::new(&r, 1))
            .unwrap_err();
        assert!(matches!(err, TemplateError::InvalidMetadata(_)));

        let err = MetadataTemplate::new("a <b>", "")
            .render(&RenderContext::new(&r, 1))
            .unwrap_err();
        assert!(matches!(err, TemplateError::InvalidMetadata(_)));
    }

    #[test]
    fn test_placeholders_listed_once() {
        let template = MetadataTemplate::new("{a} {number}", "{a} {b}");
        assert_eq!(template.placeholders().unwrap(), vec!["a", "number", "b"]);
    }
}
