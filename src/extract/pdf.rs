//! PDF text extraction.
//!
//! pdftotext does the heavy lifting; pages whose extracted text falls
//! below a character threshold are retried through the OCR port when the
//! binaries are present. Page counts come from the PDF page tree.

use std::path::Path;
use std::process::Command;

use super::{normalize_text, ExtractError, ExtractedText, ExtractionMethod, Extractor, TesseractOcr};

/// Handle command output, extracting stdout on success.
fn handle_cmd_output(
    result: std::io::Result<std::process::Output>,
    tool_name: &str,
    error_prefix: &str,
) -> Result<String, ExtractError> {
    match result {
        Ok(output) => {
            if output.status.success() {
                Ok(normalize_text(&output.stdout))
            } else {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Err(ExtractError::ExtractionFailed(format!(
                    "{}: {}",
                    error_prefix, stderr
                )))
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(ExtractError::ToolNotFound(tool_name.to_string()))
        }
        Err(e) => Err(ExtractError::Io(e)),
    }
}

/// PDF extractor with per-page OCR fallback.
pub struct PdfExtractor {
    /// Minimum characters per page before the page is considered sparse.
    min_chars_per_page: usize,
    ocr: TesseractOcr,
    /// Whether to try OCR at all; disabled when binaries are missing.
    ocr_enabled: bool,
}

impl Default for PdfExtractor {
    fn default() -> Self {
        Self {
            min_chars_per_page: 100,
            ocr: TesseractOcr::default(),
            ocr_enabled: TesseractOcr::available(),
        }
    }
}

impl PdfExtractor {
    pub fn with_min_chars(mut self, min_chars: usize) -> Self {
        self.min_chars_per_page = min_chars;
        self
    }

    pub fn without_ocr(mut self) -> Self {
        self.ocr_enabled = false;
        self
    }

    /// Page count from the document's page tree.
    pub fn page_count(path: &Path) -> Result<u32, ExtractError> {
        let doc = lopdf::Document::load(path)
            .map_err(|e| ExtractError::ExtractionFailed(format!("unreadable pdf: {}", e)))?;
        Ok(doc.get_pages().len() as u32)
    }

    /// Extract one page's text with pdftotext.
    fn page_text(&self, path: &Path, page: u32) -> Result<String, ExtractError> {
        let page_str = page.to_string();
        let output = Command::new("pdftotext")
            .args(["-layout", "-enc", "UTF-8", "-f", &page_str, "-l", &page_str])
            .arg(path)
            .arg("-")
            .output();
        handle_cmd_output(output, "pdftotext (install poppler-utils)", "pdftotext failed")
    }
}

impl Extractor for PdfExtractor {
    fn detect(&self, mime_type: &str, extension: &str) -> bool {
        mime_type == "application/pdf" || extension.eq_ignore_ascii_case("pdf")
    }

    fn extract_text(&self, path: &Path) -> Result<ExtractedText, ExtractError> {
        let page_count = Self::page_count(path)?;
        let mut pages = Vec::with_capacity(page_count as usize);
        let mut used_ocr = false;

        for page in 1..=page_count {
            let mut text = self.page_text(path, page)?;
            if text.trim().len() < self.min_chars_per_page && self.ocr_enabled {
                match self.ocr.ocr_pdf_page(path, page) {
                    Ok(ocr) if ocr.text.trim().len() > text.trim().len() => {
                        tracing::debug!(
                            "page {} of {} recovered by OCR (confidence {:.0})",
                            page,
                            path.display(),
                            ocr.confidence
                        );
                        text = ocr.text;
                        used_ocr = true;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!("OCR fallback failed for page {}: {}", page, e);
                    }
                }
            }
            pages.push(text);
        }

        let method = if used_ocr {
            ExtractionMethod::Hybrid
        } else {
            ExtractionMethod::PdfToText
        };
        Ok(ExtractedText {
            text: pages.join("\u{c}"),
            page_count: Some(page_count),
            pages: Some(pages),
            method,
        })
    }
}
