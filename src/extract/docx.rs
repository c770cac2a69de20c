//! DOCX extraction.
//!
//! Reads `word/document.xml` out of the zip container and collects the
//! text runs. Paragraphs become lines; explicit page breaks split pages.

use std::io::Read;
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;

use super::{ExtractError, ExtractedText, ExtractionMethod, Extractor};

const DOCX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

pub struct DocxExtractor;

impl Extractor for DocxExtractor {
    fn detect(&self, mime_type: &str, extension: &str) -> bool {
        mime_type == DOCX_MIME
            || mime_type == "application/zip" && extension.eq_ignore_ascii_case("docx")
            || extension.eq_ignore_ascii_case("docx")
    }

    fn extract_text(&self, path: &Path) -> Result<ExtractedText, ExtractError> {
        let file = std::fs::File::open(path)?;
        let mut archive = zip::ZipArchive::new(file)
            .map_err(|e| ExtractError::ExtractionFailed(format!("not a docx container: {}", e)))?;
        let mut xml = String::new();
        archive
            .by_name("word/document.xml")
            .map_err(|e| {
                ExtractError::ExtractionFailed(format!("missing word/document.xml: {}", e))
            })?
            .read_to_string(&mut xml)?;

        let pages = parse_document_xml(&xml)?;
        let text = pages.join("\n");
        let page_count = pages.len() as u32;
        Ok(ExtractedText {
            text,
            page_count: Some(page_count),
            pages: Some(pages),
            method: ExtractionMethod::DocxXml,
        })
    }
}

/// Walk the WordprocessingML body, collecting `w:t` runs. `w:p` closes a
/// line, `w:br w:type="page"` and `w:lastRenderedPageBreak` close a page.
fn parse_document_xml(xml: &str) -> Result<Vec<String>, ExtractError> {
    let mut reader = Reader::from_str(xml);
    let mut pages: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_text_run = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.name().as_ref() == b"w:t" => in_text_run = true,
            Ok(Event::End(e)) if e.name().as_ref() == b"w:t" => in_text_run = false,
            Ok(Event::End(e)) if e.name().as_ref() == b"w:p" => current.push('\n'),
            Ok(Event::Empty(e)) | Ok(Event::Start(e))
                if is_page_break(e.name().as_ref(), e.attributes().flatten()) =>
            {
                pages.push(std::mem::take(&mut current));
            }
            Ok(Event::Text(t)) if in_text_run => {
                let chunk = t
                    .unescape()
                    .map_err(|e| ExtractError::ExtractionFailed(format!("bad xml text: {}", e)))?;
                current.push_str(&chunk);
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(ExtractError::ExtractionFailed(format!(
                    "xml parse error at byte {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
        }
    }
    if !current.is_empty() || pages.is_empty() {
        pages.push(current);
    }
    Ok(pages)
}

fn is_page_break<'a>(
    name: &[u8],
    attributes: impl Iterator<Item = quick_xml::events::attributes::Attribute<'a>>,
) -> bool {
    if name == b"w:lastRenderedPageBreak" {
        return true;
    }
    if name != b"w:br" {
        return false;
    }
    for attr in attributes {
        if attr.key.as_ref() == b"w:type" && attr.value.as_ref() == b"page" {
            return true;
        }
    }
    false
}
