//! Plain text and Markdown extraction.

use std::path::Path;

use super::{normalize_text, ExtractError, ExtractedText, ExtractionMethod, Extractor};

/// Direct reader for text-like formats.
pub struct PlainTextExtractor;

impl Extractor for PlainTextExtractor {
    fn detect(&self, mime_type: &str, extension: &str) -> bool {
        mime_type.starts_with("text/")
            || matches!(
                extension.to_ascii_lowercase().as_str(),
                "txt" | "text" | "md" | "markdown" | "log" | "csv" | "eml"
            )
    }

    fn extract_text(&self, path: &Path) -> Result<ExtractedText, ExtractError> {
        let bytes = std::fs::read(path)?;
        Ok(ExtractedText {
            text: normalize_text(&bytes),
            pages: None,
            page_count: None,
            method: ExtractionMethod::DirectRead,
        })
    }
}
