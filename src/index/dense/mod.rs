//! Optional dense vector index.
//!
//! The embedding provider and the vector store are both ports; the build
//! service batches manifest text through the embedding port, audits every
//! batch, and persists an HNSW store. Offline runs use a pre-built index
//! or the deterministic local embedder.

mod embed;
mod hnsw;
mod store;

use async_trait::async_trait;
use thiserror::Error;

pub use embed::{HashEmbedder, HttpEmbedder, HASH_EMBEDDER_MODEL, HASH_EMBEDDER_VERSION};
pub use self::hnsw::{new_graph, CosineDistance, Graph, EF_CONSTRUCTION, GRAPH_M, GRAPH_M0};
pub use store::{DenseMeta, DenseStore};

use crate::audit::{Ledger, Operation};
use crate::config::Settings;
use crate::error::RexError;
use crate::models::ManifestRecord;
use crate::utils::CancelFlag;

/// Errors from the dense subsystem.
#[derive(Debug, Error)]
pub enum DenseError {
    #[error(transparent)]
    Refused(#[from] RexError),

    #[error("embedding provider error: {0}")]
    Api(String),

    #[error("embedding request timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("dense artifacts pinned to {expected} but found {actual}; rebuild with re-embedding")]
    ModelMismatch { expected: String, actual: String },

    #[error("dense index not built under {0}")]
    NotBuilt(String),

    #[error("dense artifacts corrupt: {0}")]
    Corrupt(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One embedding batch result.
pub struct EmbeddingBatch {
    pub vectors: Vec<Vec<f32>>,
    pub latency_ms: u64,
    pub tokens: u64,
    pub model: String,
    pub dim: usize,
}

/// Embedding provider port.
#[async_trait]
pub trait EmbeddingPort: Send + Sync {
    async fn embed_documents(
        &self,
        texts: &[String],
        dim: usize,
    ) -> Result<EmbeddingBatch, DenseError>;

    async fn embed_query(&self, text: &str, dim: usize) -> Result<Vec<f32>, DenseError>;

    fn model_id(&self) -> &str;

    fn model_version(&self) -> &str;
}

/// A scored identifier from the vector store; score in [0, 1].
#[derive(Debug, Clone)]
pub struct ScoredId {
    pub id: String,
    pub score: f32,
}

/// Vector store port.
pub trait VectorStorePort {
    fn build(
        &mut self,
        vectors: Vec<Vec<f32>>,
        identifiers: Vec<String>,
        model_version: &str,
    ) -> Result<(), DenseError>;

    fn load(&mut self) -> Result<(), DenseError>;

    fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<ScoredId>, DenseError>;
}

/// Bounded retries for recoverable (timeout) batch failures.
const MAX_BATCH_RETRIES: usize = 3;

/// Outcome of a dense build.
#[derive(Debug)]
pub struct DenseBuildStats {
    pub documents: usize,
    pub batches: usize,
    pub cancelled: bool,
}

/// Build the dense index from manifest records.
///
/// One `embedding_batch` audit entry is written per completed batch with
/// truncated input ids, token counts, and latency percentiles; plaintext
/// never reaches the ledger.
pub async fn build_dense_index(
    settings: &Settings,
    embedder: &dyn EmbeddingPort,
    records: &[ManifestRecord],
    ledger: &Ledger,
    cancel: &CancelFlag,
) -> Result<DenseBuildStats, DenseError> {
    let dim = settings.dense_dim;
    let mut store = DenseStore::new(&settings.dense_dir(), embedder.model_id(), dim);

    let eligible: Vec<&ManifestRecord> = records
        .iter()
        .filter(|r| !r.document.text.is_empty())
        .collect();

    let mut identifiers: Vec<String> = Vec::with_capacity(eligible.len());
    let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(eligible.len());
    let mut batches = 0usize;
    let mut cancelled = false;

    for chunk in eligible.chunks(settings.batch_size.max(1)) {
        if cancel.is_cancelled() {
            cancelled = true;
            break;
        }
        let texts: Vec<String> = chunk.iter().map(|r| r.document.text.clone()).collect();
        let ids: Vec<String> = chunk.iter().map(|r| r.document.sha256.clone()).collect();

        let mut latencies: Vec<u64> = Vec::new();
        let mut attempt = 0usize;
        let batch = loop {
            attempt += 1;
            match embedder.embed_documents(&texts, dim).await {
                Ok(batch) => break batch,
                Err(DenseError::Timeout { seconds }) if attempt < MAX_BATCH_RETRIES => {
                    tracing::warn!(
                        "embedding batch timed out after {}s (attempt {}), re-enqueueing",
                        seconds,
                        attempt
                    );
                    continue;
                }
                Err(e) => return Err(e),
            }
        };
        latencies.push(batch.latency_ms);

        let truncated: Vec<String> = ids.iter().map(|id| id[..16.min(id.len())].to_string()).collect();
        ledger
            .log_with_versions(
                Operation::EmbeddingBatch,
                truncated,
                store
                    .artifact_paths()
                    .iter()
                    .map(|p| p.to_string_lossy().into_owned())
                    .collect(),
                serde_json::json!({
                    "batch_size": texts.len(),
                    "tokens": batch.tokens,
                    "latency_ms": {
                        "p50": percentile(&latencies, 50),
                        "p95": percentile(&latencies, 95),
                        "p99": percentile(&latencies, 99),
                    },
                    "dim": dim,
                    "model": batch.model,
                    "attempts": attempt,
                }),
                &[(embedder.model_id(), embedder.model_version())],
            )
            .map_err(|e| DenseError::Io(std::io::Error::other(e)))?;

        identifiers.extend(ids);
        vectors.extend(batch.vectors);
        batches += 1;
    }

    let documents = identifiers.len();
    if documents > 0 {
        store.build(vectors, identifiers, embedder.model_version())?;
    }

    Ok(DenseBuildStats {
        documents,
        batches,
        cancelled,
    })
}

/// Load the persisted store for querying.
pub fn open_dense_store(settings: &Settings, model: &str) -> Result<DenseStore, DenseError> {
    let mut store = DenseStore::new(&settings.dense_dir(), model, settings.dense_dim);
    store.load()?;
    Ok(store)
}

fn percentile(sorted_source: &[u64], p: usize) -> u64 {
    if sorted_source.is_empty() {
        return 0;
    }
    let mut values = sorted_source.to_vec();
    values.sort_unstable();
    let rank = (p * (values.len() - 1)) / 100;
    values[rank]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DocType, Document};
    use chrono::Utc;
    use std::path::PathBuf;

    fn record(i: usize, text: &str) -> ManifestRecord {
        ManifestRecord::stamp(Document {
            sha256: format!("{:064x}", i),
            path: PathBuf::from(format!("/case/smith/doc{}.txt", i)),
            size: text.len() as u64,
            mtime: Utc::now(),
            mime_type: "text/plain".into(),
            custodian: "smith".into(),
            doctype: DocType::Text,
            text: text.into(),
            page_count: None,
            language: None,
            family_id: None,
            extraction_failed: false,
            privileged: None,
            responsive: None,
            production: None,
        })
        .unwrap()
    }

    fn scratch() -> (tempfile::TempDir, Settings) {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::with_home(dir.path().join("home"));
        settings.dense_dim = 256;
        settings.batch_size = 4;
        settings.ensure_directories().unwrap();
        (dir, settings)
    }

    #[tokio::test]
    async fn test_build_query_and_audit() {
        let (_dir, settings) = scratch();
        let ledger = Ledger::open(&settings.audit_path).unwrap();
        let records: Vec<ManifestRecord> = (0..10)
            .map(|i| record(i, &format!("contract clause number {}", i)))
            .collect();

        let stats = build_dense_index(
            &settings,
            &HashEmbedder,
            &records,
            &ledger,
            &CancelFlag::new(),
        )
        .await
        .unwrap();
        assert_eq!(stats.documents, 10);
        assert_eq!(stats.batches, 3);

        let store = open_dense_store(&settings, HASH_EMBEDDER_MODEL).unwrap();
        let query = HashEmbedder::embed("contract clause number 3", 256);
        let hits = store.query(&query, 3).unwrap();
        assert!(!hits.is_empty());
        assert_eq!(hits[0].id, format!("{:064x}", 3));

        let entries = Ledger::read_all(&settings.audit_path).unwrap();
        assert_eq!(entries.len(), 3);
        for entry in &entries {
            assert_eq!(entry.operation, Operation::EmbeddingBatch);
            // Truncated ids only, 16 hex chars.
            for input in &entry.inputs {
                assert_eq!(input.len(), 16);
            }
            assert!(entry.args["latency_ms"]["p50"].is_u64());
        }
    }

    #[tokio::test]
    async fn test_empty_text_documents_skipped() {
        let (_dir, settings) = scratch();
        let ledger = Ledger::open(&settings.audit_path).unwrap();
        let mut records = vec![record(0, "real text")];
        records.push(record(1, ""));

        let stats = build_dense_index(
            &settings,
            &HashEmbedder,
            &records,
            &ledger,
            &CancelFlag::new(),
        )
        .await
        .unwrap();
        assert_eq!(stats.documents, 1);
    }

    #[test]
    fn test_percentile() {
        assert_eq!(percentile(&[], 50), 0);
        assert_eq!(percentile(&[10], 99), 10);
        assert_eq!(percentile(&[30, 10, 20, 40], 50), 20);
    }
}
