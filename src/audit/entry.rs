//! Audit entry record.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// previous_hash of the first entry.
pub const GENESIS_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// Operations recorded in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Ingest,
    IndexBuild,
    EmbeddingBatch,
    BatesPlan,
    BatesApply,
    BatesForceOverride,
    RedactionPlan,
    RedactionApply,
    RedactionForceOverride,
    PrivilegeDecision,
    AuditVerify,
    Produce,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ingest => "ingest",
            Self::IndexBuild => "index_build",
            Self::EmbeddingBatch => "embedding_batch",
            Self::BatesPlan => "bates_plan",
            Self::BatesApply => "bates_apply",
            Self::BatesForceOverride => "bates_force_override",
            Self::RedactionPlan => "redaction_plan",
            Self::RedactionApply => "redaction_apply",
            Self::RedactionForceOverride => "redaction_force_override",
            Self::PrivilegeDecision => "privilege_decision",
            Self::AuditVerify => "audit_verify",
            Self::Produce => "produce",
        }
    }
}

/// One chained ledger line.
///
/// `entry_hash` is SHA-256 over the canonical JSON of every other field.
/// Unknown fields from future schema versions are preserved on re-emit so
/// legacy entries stay verifiable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// UTC ISO-8601.
    pub timestamp: String,
    pub operation: Operation,
    /// SHA-256 or path strings identifying what the operation consumed.
    pub inputs: Vec<String>,
    /// Paths the operation produced.
    pub outputs: Vec<String>,
    /// Opaque operation-specific arguments, including per-record failures.
    pub args: Value,
    /// Component → version map for whatever acted.
    pub versions: BTreeMap<String, String>,
    /// 64 hex chars; genesis entries carry all zeros.
    pub previous_hash: String,
    /// 64 hex chars.
    pub entry_hash: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Baseline component versions stamped into every entry.
pub fn default_versions() -> BTreeMap<String, String> {
    let mut versions = BTreeMap::new();
    versions.insert("rexlit".to_string(), env!("CARGO_PKG_VERSION").to_string());
    versions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_snake_case() {
        let json = serde_json::to_string(&Operation::BatesForceOverride).unwrap();
        assert_eq!(json, "\"bates_force_override\"");
        let back: Operation = serde_json::from_str("\"embedding_batch\"").unwrap();
        assert_eq!(back, Operation::EmbeddingBatch);
    }

    #[test]
    fn test_genesis_is_64_zeros() {
        assert_eq!(GENESIS_HASH.len(), 64);
        assert!(GENESIS_HASH.chars().all(|c| c == '0'));
    }

    #[test]
    fn test_entry_preserves_unknown_fields() {
        let raw = serde_json::json!({
            "timestamp": "2026-01-01T00:00:00Z",
            "operation": "ingest",
            "inputs": [],
            "outputs": [],
            "args": {},
            "versions": {"rexlit": "0.0.0"},
            "previous_hash": GENESIS_HASH,
            "entry_hash": "ab",
            "introduced_later": 42
        });
        let entry: AuditEntry = serde_json::from_value(raw).unwrap();
        assert_eq!(entry.extra["introduced_later"], serde_json::json!(42));
        let out = serde_json::to_value(&entry).unwrap();
        assert_eq!(out["introduced_later"], serde_json::json!(42));
    }
}
