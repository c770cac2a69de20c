//! Metadata cache.
//!
//! Constant-time custodian/doctype/count lookups maintained during index
//! builds and persisted at every commit boundary. Query-time consumers
//! read this file; scanning the index for facets is forbidden.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::IndexError;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MetadataCache {
    pub custodians: BTreeSet<String>,
    pub doctypes: BTreeSet<String>,
    pub doc_count: u64,
}

impl MetadataCache {
    /// Record one document's facets.
    pub fn observe(&mut self, custodian: &str, doctype: &str) {
        self.custodians.insert(custodian.to_string());
        self.doctypes.insert(doctype.to_string());
        self.doc_count += 1;
    }

    /// Persist atomically (temp + rename).
    pub fn save(&self, path: &Path) -> Result<(), IndexError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = tempfile::NamedTempFile::new_in(
            path.parent().unwrap_or_else(|| Path::new(".")),
        )?;
        serde_json::to_writer_pretty(tmp.as_file(), self)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| IndexError::Io(e.error))?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, IndexError> {
        if !path.exists() {
            return Err(IndexError::NotBuilt(path.display().to_string()));
        }
        let file = std::fs::File::open(path)?;
        Ok(serde_json::from_reader(file)?)
    }
}
