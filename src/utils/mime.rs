//! MIME detection and extension mapping.

use std::path::Path;

/// Lowercased extension of a path, or empty string.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default()
}

/// Detect a MIME type from leading file bytes, falling back to the
/// extension mapping when content sniffing is inconclusive.
pub fn detect_mime(head: &[u8], path: &Path) -> String {
    if let Some(kind) = infer::get(head) {
        return kind.mime_type().to_string();
    }
    mime_for_extension(&extension_of(path)).to_string()
}

fn mime_for_extension(ext: &str) -> &'static str {
    match ext {
        "pdf" => "application/pdf",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "doc" => "application/msword",
        "txt" | "text" | "log" => "text/plain",
        "md" | "markdown" => "text/markdown",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "eml" => "message/rfc822",
        "json" => "application/json",
        "xml" => "application/xml",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pdf_magic_detected() {
        let head = b"%PDF-1.5 rest of file";
        assert_eq!(
            detect_mime(head, Path::new("unknown.bin")),
            "application/pdf"
        );
    }

    #[test]
    fn test_extension_fallback() {
        assert_eq!(
            detect_mime(b"just some words", Path::new("notes.md")),
            "text/markdown"
        );
        assert_eq!(
            detect_mime(b"plain", Path::new("a.weird")),
            "application/octet-stream"
        );
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of(Path::new("A.PDF")), "pdf");
        assert_eq!(extension_of(Path::new("noext")), "");
    }
}
