//! Tesseract OCR port.
//!
//! OCR is consumed as an opaque subprocess producing (text, confidence).
//! Pages are rasterized with pdftoppm and fed to tesseract in TSV mode so
//! word confidences come back alongside the text.

use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

use super::ExtractError;

/// Recognized text with a mean word confidence in [0, 100].
#[derive(Debug, Clone)]
pub struct OcrOutput {
    pub text: String,
    pub confidence: f32,
}

/// Tesseract subprocess adapter.
pub struct TesseractOcr {
    language: String,
    dpi: u32,
}

impl Default for TesseractOcr {
    fn default() -> Self {
        Self {
            language: "eng".to_string(),
            dpi: 300,
        }
    }
}

impl TesseractOcr {
    pub fn with_language(mut self, lang: &str) -> Self {
        self.language = lang.to_string();
        self
    }

    /// Whether the required binaries are installed.
    pub fn available() -> bool {
        which::which("tesseract").is_ok() && which::which("pdftoppm").is_ok()
    }

    /// OCR a single PDF page (1-based).
    pub fn ocr_pdf_page(&self, pdf_path: &Path, page: u32) -> Result<OcrOutput, ExtractError> {
        let scratch = TempDir::new()?;
        let image = self.rasterize_page(pdf_path, page, scratch.path())?;
        self.recognize(&image)
    }

    /// OCR an image file directly.
    pub fn recognize(&self, image_path: &Path) -> Result<OcrOutput, ExtractError> {
        let output = Command::new("tesseract")
            .arg(image_path)
            .arg("stdout")
            .args(["-l", &self.language])
            .arg("tsv")
            .output();
        match output {
            Ok(output) if output.status.success() => {
                Ok(parse_tsv(&String::from_utf8_lossy(&output.stdout)))
            }
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Err(ExtractError::ExtractionFailed(format!(
                    "tesseract failed: {}",
                    stderr
                )))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ExtractError::ToolNotFound(
                "tesseract (install tesseract-ocr)".to_string(),
            )),
            Err(e) => Err(ExtractError::Io(e)),
        }
    }

    fn rasterize_page(
        &self,
        pdf_path: &Path,
        page: u32,
        output_dir: &Path,
    ) -> Result<PathBuf, ExtractError> {
        let page_str = page.to_string();
        let prefix = output_dir.join("page");
        let status = Command::new("pdftoppm")
            .args(["-png", "-r", &self.dpi.to_string(), "-f", &page_str, "-l", &page_str])
            .arg(pdf_path)
            .arg(&prefix)
            .status();
        match status {
            Ok(s) if s.success() => find_page_image(output_dir, page).ok_or_else(|| {
                ExtractError::ExtractionFailed(format!("no image generated for page {}", page))
            }),
            Ok(_) => Err(ExtractError::ExtractionFailed(
                "pdftoppm failed to convert PDF page".to_string(),
            )),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ExtractError::ToolNotFound(
                "pdftoppm (install poppler-utils)".to_string(),
            )),
            Err(e) => Err(ExtractError::Io(e)),
        }
    }
}

/// pdftoppm names files page-01.png, page-001.png, ... depending on total.
fn find_page_image(dir: &Path, page_num: u32) -> Option<PathBuf> {
    for digits in [1, 2, 3, 4] {
        let filename = format!("page-{:0width$}.png", page_num, width = digits);
        let path = dir.join(&filename);
        if path.exists() {
            return Some(path);
        }
    }
    None
}

/// Rebuild text and mean confidence from tesseract's TSV output.
///
/// Columns: level, page, block, par, line, word, left, top, width, height,
/// conf, text. Word rows have level 5 and conf >= 0.
fn parse_tsv(tsv: &str) -> OcrOutput {
    let mut text = String::new();
    let mut confidences: Vec<f32> = Vec::new();
    let mut last_line_key = (0u32, 0u32, 0u32);
    for row in tsv.lines().skip(1) {
        let cols: Vec<&str> = row.split('\t').collect();
        if cols.len() < 12 || cols[0] != "5" {
            continue;
        }
        let conf: f32 = cols[10].parse().unwrap_or(-1.0);
        if conf < 0.0 {
            continue;
        }
        let key = (
            cols[2].parse().unwrap_or(0),
            cols[3].parse().unwrap_or(0),
            cols[4].parse().unwrap_or(0),
        );
        if !text.is_empty() {
            if key != last_line_key {
                text.push('\n');
            } else {
                text.push(' ');
            }
        }
        last_line_key = key;
        text.push_str(cols[11]);
        confidences.push(conf);
    }
    let confidence = if confidences.is_empty() {
        0.0
    } else {
        confidences.iter().sum::<f32>() / confidences.len() as f32
    };
    OcrOutput { text, confidence }
}
