//! Manifest records.
//!
//! One JSONL line per ingested document, ordered by `(sha256, path)`.
//! Records are versioned and carry a content hash over the record body;
//! unknown fields from future schema versions are preserved on re-emit.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::determinism::{stamp_metadata, DocumentKey, SchemaStamp};
use crate::models::Document;

pub const MANIFEST_SCHEMA_ID: &str = "rexlit.manifest";
pub const MANIFEST_SCHEMA_VERSION: u32 = 1;

/// A manifest line: the document body plus its schema envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestRecord {
    #[serde(flatten)]
    pub document: Document,
    #[serde(flatten)]
    pub stamp: SchemaStamp,
    /// Fields from newer schema versions we don't understand but keep.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl ManifestRecord {
    /// Wrap a document in a stamped manifest record.
    pub fn stamp(document: Document) -> serde_json::Result<Self> {
        let stamp = stamp_metadata(&document, MANIFEST_SCHEMA_ID, MANIFEST_SCHEMA_VERSION)?;
        Ok(Self {
            document,
            stamp,
            extra: serde_json::Map::new(),
        })
    }

    pub fn sha256(&self) -> &str {
        &self.document.sha256
    }

    pub fn path_str(&self) -> String {
        self.document.path.to_string_lossy().into_owned()
    }
}

impl DocumentKey for ManifestRecord {
    fn sha256(&self) -> &str {
        &self.document.sha256
    }

    fn path(&self) -> &str {
        self.document.path.to_str().unwrap_or("")
    }
}
