//! Document model.
//!
//! A document's identity is the SHA-256 of its bytes; everything downstream
//! (index, Bates registry, redaction plans, audit inputs) refers to it only
//! by that hash. Documents are immutable after ingest.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Document type derived from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocType {
    Pdf,
    Docx,
    Text,
    Markdown,
    Email,
    Other,
}

impl DocType {
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Self::Pdf,
            "docx" | "doc" => Self::Docx,
            "txt" | "text" | "log" | "csv" => Self::Text,
            "md" | "markdown" => Self::Markdown,
            "eml" => Self::Email,
            _ => Self::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Text => "text",
            Self::Markdown => "markdown",
            Self::Email => "email",
            Self::Other => "other",
        }
    }
}

/// A single ingested document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// SHA-256 of the file bytes; the document's identity.
    pub sha256: String,
    /// Absolute resolved path, guaranteed within the ingest root.
    pub path: PathBuf,
    /// Size in bytes.
    pub size: u64,
    /// Filesystem modification time.
    pub mtime: DateTime<Utc>,
    /// Detected MIME type.
    pub mime_type: String,
    /// Custodian, derived from the first directory segment under the root.
    pub custodian: String,
    /// Document type from the extension mapping.
    pub doctype: DocType,
    /// Extracted text, UTF-8 with lossy replacement.
    pub text: String,
    /// Page count where the format has pages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_count: Option<u32>,
    /// Detected language, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Thread hash grouping email families; None for standalone documents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family_id: Option<String>,
    /// Set when extraction failed and `text` is an empty placeholder.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub extraction_failed: bool,
    /// Review tags written by external classifiers; None until reviewed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub privileged: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responsive: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub production: Option<bool>,
}

impl Document {
    /// Derive the custodian from the first path segment under `root`.
    ///
    /// `root/smith/inbox/a.pdf` → `smith`; files directly under the root
    /// get the `unassigned` custodian.
    pub fn custodian_for(root: &Path, resolved: &Path) -> String {
        let rel = match resolved.strip_prefix(root) {
            Ok(rel) => rel,
            Err(_) => return "unassigned".to_string(),
        };
        // A bare filename at the root has no custodian segment.
        if rel.components().count() < 2 {
            return "unassigned".to_string();
        }
        match rel.components().next() {
            Some(std::path::Component::Normal(seg)) => seg.to_string_lossy().into_owned(),
            _ => "unassigned".to_string(),
        }
    }
}
