//! Determinism utilities.
//!
//! Stable sorting, canonical JSON, plan-id hashing, and schema stamping.
//! Every artifact that claims reproducibility funnels through here.

use std::io::Read;
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Hex SHA-256 of a byte slice.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Hex SHA-256 of a file, streamed in 8 KiB chunks.
pub fn sha256_file(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Records addressable by `(sha256, path)`.
pub trait DocumentKey {
    fn sha256(&self) -> &str;
    fn path(&self) -> &str;
}

/// Sort records by `(sha256, path)` ascending.
pub fn deterministic_sort<T: DocumentKey>(records: &mut [T]) {
    records.sort_by(|a, b| {
        a.sha256()
            .cmp(b.sha256())
            .then_with(|| a.path().cmp(b.path()))
    });
}

/// Plan id: SHA-256 of the sorted input hashes joined by `\n`.
pub fn compute_plan_id<S: AsRef<str>>(inputs: &[S]) -> String {
    let mut hashes: Vec<&str> = inputs.iter().map(|s| s.as_ref()).collect();
    hashes.sort_unstable();
    sha256_hex(hashes.join("\n").as_bytes())
}

/// Canonical JSON: sorted keys, `,`/`:` separators, no whitespace.
///
/// Numbers pass through serde_json's shortest round-trip formatting.
/// This is the preimage format for every chained or stamped hash.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key).expect("string serializes"));
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        other => {
            out.push_str(&serde_json::to_string(other).expect("scalar serializes"));
        }
    }
}

/// Versioned-record envelope shared by every artifact that crosses a
/// boundary: manifest lines, registry lines, plan headers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchemaStamp {
    pub schema_id: String,
    pub schema_version: u32,
    pub producer: String,
    pub produced_at: String,
    pub content_hash: String,
}

/// Producer identity string: crate name/version plus hostname when known.
pub fn producer_id() -> String {
    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown-host".to_string());
    format!("rexlit/{}@{}", env!("CARGO_PKG_VERSION"), host)
}

/// UTC ISO-8601 timestamp with second precision.
pub fn iso_now() -> String {
    now_utc().to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn now_utc() -> DateTime<Utc> {
    Utc::now()
}

/// Stamp a record body with schema identity and a content hash.
///
/// `content_hash` covers the canonical JSON of the body alone, so readers
/// can re-verify a record independent of its envelope.
pub fn stamp_metadata<T: Serialize>(
    body: &T,
    schema_id: &str,
    schema_version: u32,
) -> serde_json::Result<SchemaStamp> {
    let value = serde_json::to_value(body)?;
    let content_hash = sha256_hex(canonical_json(&value).as_bytes());
    Ok(SchemaStamp {
        schema_id: schema_id.to_string(),
        schema_version,
        producer: producer_id(),
        produced_at: iso_now(),
        content_hash,
    })
}

/// Run a build twice into fresh directories and compare artifact hashes.
///
/// Returns true when every produced file hashes identically across runs.
/// Only meaningful for artifacts whose determinism is claimed byte-level.
pub fn verify_determinism<F>(build_fn: F) -> anyhow::Result<bool>
where
    F: Fn(&Path) -> anyhow::Result<()>,
{
    let first = tempfile::tempdir()?;
    let second = tempfile::tempdir()?;
    build_fn(first.path())?;
    build_fn(second.path())?;
    Ok(dir_digest(first.path())? == dir_digest(second.path())?)
}

/// Digest of a directory tree: sorted relative paths plus content hashes.
fn dir_digest(root: &Path) -> anyhow::Result<String> {
    let mut entries = Vec::new();
    for entry in walkdir::WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        if entry.file_type().is_file() {
            let rel = entry
                .path()
                .strip_prefix(root)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .into_owned();
            entries.push(format!("{}\t{}", rel, sha256_file(entry.path())?));
        }
    }
    entries.sort();
    Ok(sha256_hex(entries.join("\n").as_bytes()))
}
