//! Tamper-evident audit ledger.
//!
//! An append-only JSONL file where each entry binds its predecessor via a
//! SHA-256 hash over the entry's canonical JSON. Writes are serialized by
//! an in-process mutex plus an OS advisory lock and are fsynced before
//! `log` returns; readers never see an entry that wasn't durably persisted.

mod entry;

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use fs2::FileExt;

pub use entry::{AuditEntry, Operation, GENESIS_HASH};

use crate::determinism::{canonical_json, iso_now, sha256_hex};
use crate::error::{Result, RexError};

/// Append-only hash-chained ledger. Single writer per file.
pub struct Ledger {
    path: PathBuf,
    inner: Mutex<LedgerInner>,
}

struct LedgerInner {
    file: File,
    last_hash: String,
}

impl Ledger {
    /// Open (creating if absent) and take the exclusive advisory lock.
    ///
    /// The tail of an existing ledger is scanned to recover `last_hash`;
    /// a partial trailing line (torn write) is ignored.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;
        file.try_lock_exclusive().map_err(|e| {
            RexError::LedgerCorrupted(format!(
                "another writer holds the ledger lock on {}: {}",
                path.display(),
                e
            ))
        })?;
        file.seek(SeekFrom::Start(0))?;
        let entries = parse_entries(BufReader::new(&file))?;
        let last_hash = entries
            .last()
            .map(|e| e.entry_hash.clone())
            .unwrap_or_else(|| GENESIS_HASH.to_string());
        Ok(Self {
            path: path.to_path_buf(),
            inner: Mutex::new(LedgerInner { file, last_hash }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry and force it to durable storage before returning.
    ///
    /// Transient IO failures are retried once; a second failure is fatal.
    pub fn log(
        &self,
        operation: Operation,
        inputs: Vec<String>,
        outputs: Vec<String>,
        args: serde_json::Value,
    ) -> Result<AuditEntry> {
        self.log_with_versions(operation, inputs, outputs, args, &[])
    }

    /// Append one entry carrying extra component versions beside the
    /// engine's own.
    pub fn log_with_versions(
        &self,
        operation: Operation,
        inputs: Vec<String>,
        outputs: Vec<String>,
        args: serde_json::Value,
        components: &[(&str, &str)],
    ) -> Result<AuditEntry> {
        let mut inner = self.inner.lock().expect("ledger mutex poisoned");
        let mut versions = entry::default_versions();
        for (component, version) in components {
            versions.insert(component.to_string(), version.to_string());
        }
        let mut entry = AuditEntry {
            timestamp: iso_now(),
            operation,
            inputs,
            outputs,
            args,
            versions,
            previous_hash: inner.last_hash.clone(),
            entry_hash: String::new(),
            extra: serde_json::Map::new(),
        };
        entry.entry_hash = compute_entry_hash(&entry)?;

        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');
        if let Err(first) = append_durable(&mut inner.file, line.as_bytes()) {
            tracing::warn!("ledger append failed, retrying once: {}", first);
            append_durable(&mut inner.file, line.as_bytes())?;
        }

        inner.last_hash = entry.entry_hash.clone();
        Ok(entry)
    }

    /// Read every durably persisted entry.
    pub fn read_all(path: &Path) -> Result<Vec<AuditEntry>> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(path)?;
        parse_entries(BufReader::new(file))
    }

    /// Verify hash integrity and chain contiguity.
    ///
    /// Returns `(true, None)` when the chain holds, `(false, Some(i))`
    /// with the first offending entry index otherwise.
    pub fn verify(path: &Path) -> Result<(bool, Option<usize>)> {
        let entries = Self::read_all(path)?;
        for (i, entry) in entries.iter().enumerate() {
            let expected_previous = if i == 0 {
                GENESIS_HASH.to_string()
            } else {
                entries[i - 1].entry_hash.clone()
            };
            if entry.previous_hash != expected_previous {
                return Ok((false, Some(i)));
            }
            if compute_entry_hash(entry)? != entry.entry_hash {
                return Ok((false, Some(i)));
            }
        }
        Ok((true, None))
    }
}

impl Drop for Ledger {
    fn drop(&mut self) {
        if let Ok(inner) = self.inner.lock() {
            let _ = fs2::FileExt::unlock(&inner.file);
        }
    }
}

fn append_durable(file: &mut File, bytes: &[u8]) -> std::io::Result<()> {
    file.write_all(bytes)?;
    file.flush()?;
    file.sync_all()
}

/// Hash preimage: canonical JSON of the entry with `entry_hash` removed.
pub fn compute_entry_hash(entry: &AuditEntry) -> Result<String> {
    let mut value = serde_json::to_value(entry)?;
    if let Some(map) = value.as_object_mut() {
        map.remove("entry_hash");
    }
    Ok(sha256_hex(canonical_json(&value).as_bytes()))
}

/// Parse JSONL entries, skipping a torn final line.
fn parse_entries<R: BufRead>(reader: R) -> Result<Vec<AuditEntry>> {
    let mut entries = Vec::new();
    let mut lines = reader.lines().peekable();
    let mut index = 0usize;
    while let Some(line) = lines.next() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<AuditEntry>(&line) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                if lines.peek().is_none() {
                    // Torn final line from an interrupted write: the entry
                    // never became durable, so readers ignore it.
                    tracing::warn!("ignoring partial trailing ledger line: {}", e);
                    break;
                }
                return Err(RexError::LedgerCorrupted(format!(
                    "unparseable entry at line {}: {}",
                    index + 1,
                    e
                )));
            }
        }
        index += 1;
    }
    Ok(entries)
}
