//! Bates registry.
//!
//! Append-only JSONL per prefix namespace recording every applied range.
//! Writers serialize through a lock file; preflight detects overlap with
//! existing ranges and verifies monotonicity.

use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::plan::{parse_label, BatesPlan};
use crate::determinism::{iso_now, stamp_metadata, SchemaStamp};
use crate::error::{Result, RexError};

pub const REGISTRY_SCHEMA_ID: &str = "rexlit.bates";
pub const REGISTRY_SCHEMA_VERSION: u32 = 1;

/// One registry line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryRecord {
    pub prefix: String,
    /// Formatted start label, e.g. `REX0000001`.
    pub start: String,
    /// Formatted end label (inclusive).
    pub end: String,
    pub document_sha256: String,
    pub page_count: u32,
    pub assigned_at: String,
    #[serde(flatten)]
    pub stamp: SchemaStamp,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// A detected range conflict.
#[derive(Debug, Clone, Serialize)]
pub struct Conflict {
    pub document_sha256: String,
    pub planned_start: u64,
    pub planned_end: u64,
    pub existing_start: u64,
    pub existing_end: u64,
    pub existing_document: String,
}

/// Registry for one prefix namespace.
pub struct Registry {
    prefix: String,
    path: PathBuf,
    lock_path: PathBuf,
}

impl Registry {
    pub fn new(bates_dir: &Path, prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            path: bates_dir.join(format!("{}.registry.jsonl", prefix)),
            lock_path: bates_dir.join(format!("{}.lock", prefix)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read all records for this prefix.
    pub fn read_all(&self) -> Result<Vec<RegistryRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let file = std::fs::File::open(&self.path)?;
        let mut records = Vec::new();
        for (i, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: RegistryRecord = serde_json::from_str(&line).map_err(|e| {
                RexError::ConfigError(format!(
                    "bad registry line {} in {}: {}",
                    i + 1,
                    self.path.display(),
                    e
                ))
            })?;
            records.push(record);
        }
        Ok(records)
    }

    /// Detect overlap between a plan and the existing registry.
    pub fn preflight(&self, plan: &BatesPlan) -> Result<Vec<Conflict>> {
        let existing = self.read_all()?;
        let mut ranges: Vec<(u64, u64, String)> = Vec::with_capacity(existing.len());
        for record in &existing {
            let start = parse_label(&self.prefix, &record.start).ok_or_else(|| {
                RexError::ConfigError(format!("unparseable registry label {}", record.start))
            })?;
            let end = parse_label(&self.prefix, &record.end).ok_or_else(|| {
                RexError::ConfigError(format!("unparseable registry label {}", record.end))
            })?;
            ranges.push((start, end, record.document_sha256.clone()));
        }

        let mut conflicts = Vec::new();
        for entry in &plan.entries {
            for (start, end, sha) in &ranges {
                if entry.start_number <= *end && *start <= entry.end_number {
                    conflicts.push(Conflict {
                        document_sha256: entry.document_sha256.clone(),
                        planned_start: entry.start_number,
                        planned_end: entry.end_number,
                        existing_start: *start,
                        existing_end: *end,
                        existing_document: sha.clone(),
                    });
                }
            }
        }
        Ok(conflicts)
    }

    /// Verify strict monotonicity across adjacent records:
    /// `parse(next.start) > parse(prev.end)`. Gaps are permitted.
    pub fn verify_monotonic(&self) -> Result<()> {
        let records = self.read_all()?;
        let mut previous_end: Option<u64> = None;
        for record in &records {
            let start = parse_label(&self.prefix, &record.start).ok_or_else(|| {
                RexError::ConfigError(format!("unparseable registry label {}", record.start))
            })?;
            let end = parse_label(&self.prefix, &record.end).ok_or_else(|| {
                RexError::ConfigError(format!("unparseable registry label {}", record.end))
            })?;
            if let Some(prev) = previous_end {
                if start <= prev {
                    return Err(RexError::BatesCollision {
                        prefix: self.prefix.clone(),
                        conflicts: 1,
                    });
                }
            }
            if end < start {
                return Err(RexError::ConfigError(format!(
                    "inverted range {}..{} in registry",
                    record.start, record.end
                )));
            }
            previous_end = Some(end);
        }
        Ok(())
    }

    /// Append records for an applied plan under the prefix lock file.
    pub fn append_applied(&self, plan: &BatesPlan) -> Result<Vec<RegistryRecord>> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&self.lock_path)?;
        lock_file.lock_exclusive()?;

        let result = self.append_applied_locked(plan);
        let _ = fs2::FileExt::unlock(&lock_file);
        result
    }

    fn append_applied_locked(&self, plan: &BatesPlan) -> Result<Vec<RegistryRecord>> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut appended = Vec::with_capacity(plan.entries.len());
        for entry in &plan.entries {
            let body = serde_json::json!({
                "prefix": self.prefix,
                "start": plan.label(entry.start_number),
                "end": plan.label(entry.end_number),
                "document_sha256": entry.document_sha256,
                "page_count": entry.page_count,
            });
            let stamp = stamp_metadata(&body, REGISTRY_SCHEMA_ID, REGISTRY_SCHEMA_VERSION)?;
            let record = RegistryRecord {
                prefix: self.prefix.clone(),
                start: plan.label(entry.start_number),
                end: plan.label(entry.end_number),
                document_sha256: entry.document_sha256.clone(),
                page_count: entry.page_count,
                assigned_at: iso_now(),
                stamp,
                extra: serde_json::Map::new(),
            };
            let mut line = serde_json::to_string(&record)?;
            line.push('\n');
            file.write_all(line.as_bytes())?;
            appended.push(record);
        }
        file.flush()?;
        file.sync_all()?;
        Ok(appended)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bates::plan::{build_plan, PlanRequest};
    use crate::models::{DocType, Document, ManifestRecord};
    use chrono::Utc;
    use std::path::PathBuf;

    fn record(sha: &str, pages: u32) -> ManifestRecord {
        ManifestRecord::stamp(Document {
            sha256: sha.to_string(),
            path: PathBuf::from(format!("/case/{}.pdf", sha)),
            size: 10,
            mtime: Utc::now(),
            mime_type: "application/pdf".into(),
            custodian: "smith".into(),
            doctype: DocType::Pdf,
            text: String::new(),
            page_count: Some(pages),
            language: None,
            family_id: None,
            extraction_failed: false,
            privileged: None,
            responsive: None,
            production: None,
        })
        .unwrap()
    }

    #[test]
    fn test_append_read_roundtrip_and_monotonic() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::new(dir.path(), "REX");
        let docs = vec![record("aa", 2), record("bb", 2), record("cc", 2)];
        let plan = build_plan(&docs, &PlanRequest::default());

        let appended = registry.append_applied(&plan).unwrap();
        assert_eq!(appended.len(), 3);
        assert_eq!(appended[0].start, "REX0000001");
        assert_eq!(appended[2].end, "REX0000006");

        let back = registry.read_all().unwrap();
        assert_eq!(back.len(), 3);
        assert_eq!(back[1].start, "REX0000003");
        registry.verify_monotonic().unwrap();
    }

    #[test]
    fn test_preflight_detects_overlap() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::new(dir.path(), "REX");
        let docs = vec![record("aa", 2), record("bb", 2), record("cc", 2)];
        let plan = build_plan(&docs, &PlanRequest::default());
        registry.append_applied(&plan).unwrap();

        // A second plan starting at 4 collides with ranges 3..4 and 5..6.
        let more = vec![record("dd", 2), record("ee", 2)];
        let overlapping = build_plan(
            &more,
            &PlanRequest {
                start: 4,
                ..PlanRequest::default()
            },
        );
        let conflicts = registry.preflight(&overlapping).unwrap();
        assert!(!conflicts.is_empty());

        // Starting past the existing end is clean.
        let clean = build_plan(
            &more,
            &PlanRequest {
                start: 7,
                ..PlanRequest::default()
            },
        );
        assert!(registry.preflight(&clean).unwrap().is_empty());
    }

    #[test]
    fn test_gaps_allowed_but_order_enforced() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::new(dir.path(), "REX");
        let first = build_plan(&[record("aa", 1)], &PlanRequest::default());
        registry.append_applied(&first).unwrap();
        // Gap from 2..9 is fine.
        let second = build_plan(
            &[record("bb", 1)],
            &PlanRequest {
                start: 10,
                ..PlanRequest::default()
            },
        );
        registry.append_applied(&second).unwrap();
        registry.verify_monotonic().unwrap();
    }

    #[test]
    fn test_empty_registry_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::new(dir.path(), "REX");
        assert!(registry.read_all().unwrap().is_empty());
        registry.verify_monotonic().unwrap();
    }
}
