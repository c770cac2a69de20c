//! Manifest file IO.
//!
//! The manifest is one JSONL line per document, ordered by
//! `(sha256, path)`. Write-then-read reproduces equal records.

use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::determinism::deterministic_sort;
use crate::error::{Result, RexError};
use crate::models::ManifestRecord;

/// Write records to `path`, sorted by `(sha256, path)`. Atomic: the file
/// is written to a temp sibling and renamed into place.
pub fn write_manifest(path: &Path, mut records: Vec<ManifestRecord>) -> Result<usize> {
    deterministic_sort(&mut records);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = tempfile::NamedTempFile::new_in(
        path.parent().unwrap_or_else(|| Path::new(".")),
    )?;
    {
        let mut writer = BufWriter::new(tmp.as_file());
        for record in &records {
            serde_json::to_writer(&mut writer, record)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .map_err(|e| RexError::Io(e.error))?;
    Ok(records.len())
}

/// Read every manifest record.
pub fn read_manifest(path: &Path) -> Result<Vec<ManifestRecord>> {
    if !path.exists() {
        return Err(RexError::ConfigError(format!(
            "manifest not found at {}; run ingest first",
            path.display()
        )));
    }
    let file = std::fs::File::open(path)?;
    let mut records = Vec::new();
    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: ManifestRecord = serde_json::from_str(&line).map_err(|e| {
            RexError::ConfigError(format!("bad manifest line {}: {}", i + 1, e))
        })?;
        records.push(record);
    }
    Ok(records)
}
