//! Text extraction from documents.
//!
//! Extractors are polymorphic over {detect, extract_text, extract_pages}.
//! PDF extraction shells out to pdftotext with a Tesseract OCR fallback for
//! sparse pages; DOCX reads the zip container directly; plain text and
//! Markdown are decoded with lossy UTF-8. OCR is always an opaque
//! subprocess producing (text, confidence).

mod docx;
mod ocr;
mod pdf;
mod text;

use std::path::Path;

use thiserror::Error;

pub use docx::DocxExtractor;
pub use ocr::TesseractOcr;
pub use pdf::PdfExtractor;
pub use text::PlainTextExtractor;

/// Errors that can occur during text extraction.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported file type: {0}")]
    UnsupportedFileType(String),

    #[error("external tool not found: {0}")]
    ToolNotFound(String),

    #[error("extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Method used to produce the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionMethod {
    PdfToText,
    TesseractOcr,
    /// pdftotext with OCR fallback for sparse pages.
    Hybrid,
    DirectRead,
    DocxXml,
}

/// Result of text extraction.
#[derive(Debug)]
pub struct ExtractedText {
    /// Full document text, UTF-8 with lossy replacement, NULs collapsed.
    pub text: String,
    /// Per-page text where the format has pages.
    pub pages: Option<Vec<String>>,
    pub page_count: Option<u32>,
    pub method: ExtractionMethod,
}

/// A format-specific extractor.
pub trait Extractor: Send + Sync {
    /// Whether this extractor handles the given MIME type / extension.
    fn detect(&self, mime_type: &str, extension: &str) -> bool;

    /// Extract the full text of a document.
    fn extract_text(&self, path: &Path) -> Result<ExtractedText, ExtractError>;

    /// Extract per-page text. Formats without pages return a single page.
    fn extract_pages(&self, path: &Path) -> Result<Vec<String>, ExtractError> {
        let extracted = self.extract_text(path)?;
        Ok(extracted.pages.unwrap_or_else(|| vec![extracted.text]))
    }
}

/// The default extractor set, probed in order.
pub struct ExtractorSet {
    extractors: Vec<Box<dyn Extractor>>,
}

impl Default for ExtractorSet {
    fn default() -> Self {
        Self {
            extractors: vec![
                Box::new(PdfExtractor::default()),
                Box::new(DocxExtractor),
                Box::new(PlainTextExtractor),
            ],
        }
    }
}

impl ExtractorSet {
    /// Find the extractor for a MIME type / extension pair.
    pub fn for_document(&self, mime_type: &str, extension: &str) -> Option<&dyn Extractor> {
        self.extractors
            .iter()
            .find(|e| e.detect(mime_type, extension))
            .map(|e| e.as_ref())
    }
}

/// Decode bytes as UTF-8 with replacement, collapse NULs, normalize line
/// endings. Line structure is retained for page attribution.
pub fn normalize_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .replace('\0', "")
        .replace("\r\n", "\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_text_lossy_and_nul() {
        let bytes = b"hello\0world\xff\r\nnext";
        let text = normalize_text(bytes);
        assert!(!text.contains('\0'));
        assert!(text.contains('\u{fffd}'));
        assert_eq!(text.lines().count(), 2);
    }

    #[test]
    fn test_extractor_set_routing() {
        let set = ExtractorSet::default();
        assert!(set.for_document("application/pdf", "pdf").is_some());
        assert!(set
            .for_document(
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
                "docx"
            )
            .is_some());
        assert!(set.for_document("text/plain", "txt").is_some());
        assert!(set.for_document("application/x-unknown", "bin").is_none());
    }
}
