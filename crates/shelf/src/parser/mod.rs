pub mod detect;
pub mod epub;
pub mod pdf;
pub mod registry;
pub mod render;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ParseError;

pub use detect::{detect_format, sniff, BookFormat, Signature, SIGNATURE_LEN};
pub use epub::EpubParser;
pub use pdf::PdfParser;
pub use registry::{ParserConfig, ParserRegistry};
pub use render::PageRenderer;

/// Extracted metadata, field name to JSON value.
///
/// Absent fields are omitted. Setters drop empty strings and empty lists so
/// a field is present only when the source declared a value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookMetadata(BTreeMap<String, Value>);

impl BookMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_text(&mut self, field: &str, value: &str) {
        let value = value.trim();
        if !value.is_empty() {
            self.0.insert(field.to_string(), Value::String(value.to_string()));
        }
    }

    pub fn set_list<I, S>(&mut self, field: &str, values: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let values: Vec<Value> = values
            .into_iter()
            .map(|v| v.as_ref().trim().to_string())
            .filter(|v| !v.is_empty())
            .map(Value::String)
            .collect();
        if !values.is_empty() {
            self.0.insert(field.to_string(), Value::Array(values));
        }
    }

    pub fn set_value(&mut self, field: &str, value: Value) {
        let empty = match &value {
            Value::Null => true,
            Value::String(s) => s.is_empty(),
            Value::Array(a) => a.is_empty(),
            Value::Object(o) => o.is_empty(),
            _ => false,
        };
        if !empty {
            self.0.insert(field.to_string(), value);
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn text(&self, field: &str) -> Option<&str> {
        self.0.get(field).and_then(Value::as_str)
    }

    pub fn title(&self) -> Option<&str> {
        self.text("title")
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

/// Raw cover bytes as found in the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverImage {
    pub data: Vec<u8>,
    pub media_type: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ParsedDocument {
    pub format: BookFormat,
    pub metadata: BookMetadata,
    pub cover: Option<CoverImage>,
    pub page_count: Option<u32>,
}

impl ParsedDocument {
    pub fn new(format: BookFormat) -> Self {
        Self {
            format,
            metadata: BookMetadata::new(),
            cover: None,
            page_count: None,
        }
    }
}

pub trait BookParser: Send + Sync {
    fn format(&self) -> BookFormat;
    fn parse(&self, bytes: &[u8]) -> Result<ParsedDocument, ParseError>;
}

/// Closed set of supported formats. New formats are new variants.
#[derive(Debug, Clone)]
pub enum Parser {
    Pdf(PdfParser),
    Epub(EpubParser),
}

impl BookParser for Parser {
    fn format(&self) -> BookFormat {
        match self {
            Parser::Pdf(p) => p.format(),
            Parser::Epub(p) => p.format(),
        }
    }

    fn parse(&self, bytes: &[u8]) -> Result<ParsedDocument, ParseError> {
        match self {
            Parser::Pdf(p) => p.parse(bytes),
            Parser::Epub(p) => p.parse(bytes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_values_are_not_stored() {
        let mut metadata = BookMetadata::new();
        metadata.set_text("title", "   ");
        metadata.set_list("authors", ["", "  "]);
        metadata.set_value("identifiers", json!([]));
        metadata.set_value("series", Value::Null);
        assert!(metadata.is_empty());
        assert_eq!(metadata.title(), None);
    }

    #[test]
    fn test_values_are_trimmed() {
        let mut metadata = BookMetadata::new();
        metadata.set_text("title", "  Dune \n");
        metadata.set_list("tags", ["sci-fi ", "", " classics"]);
        assert_eq!(metadata.title(), Some("Dune"));
        assert_eq!(metadata.get("tags"), Some(&json!(["sci-fi", "classics"])));
        assert_eq!(metadata.len(), 2);
    }

    #[test]
    fn test_serializes_as_plain_object() {
        let mut metadata = BookMetadata::new();
        metadata.set_text("title", "Dune");
        metadata.set_text("language", "en");
        let json = serde_json::to_value(&metadata).unwrap();
        assert_eq!(json, json!({"language": "en", "title": "Dune"}));
    }
}
