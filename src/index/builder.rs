//! Parallel lexical index build.
//!
//! Documents are pre-sorted by `(sha256, path)` and fed through a bounded
//! queue to a worker pool that converts manifest records into index
//! operations. A single writer applies the operations and commits every
//! `commit_every` documents and at end of stream; the metadata cache is
//! persisted at each commit boundary. Cancellation is honored between
//! batches.

use tantivy::TantivyDocument;
use tokio::sync::mpsc;

use super::lexical::LexicalIndex;
use super::{IndexError, MetadataCache};
use crate::audit::{Ledger, Operation};
use crate::config::Settings;
use crate::determinism::deterministic_sort;
use crate::models::ManifestRecord;
use crate::utils::CancelFlag;

/// Outcome of a build run.
#[derive(Debug)]
pub struct IndexBuildStats {
    pub documents: usize,
    pub commits: usize,
    pub cancelled: bool,
}

/// Per-document index operation produced by workers.
struct IndexOp {
    doc: TantivyDocument,
    custodian: String,
    doctype: String,
}

/// Build the lexical index from manifest records.
pub async fn build_lexical_index(
    settings: &Settings,
    mut records: Vec<ManifestRecord>,
    ledger: &Ledger,
    cancel: &CancelFlag,
) -> Result<IndexBuildStats, IndexError> {
    deterministic_sort(&mut records);
    let total = records.len();

    let index = LexicalIndex::create(&settings.lexical_dir())?;
    let fields = index.fields;
    let writer = index.writer()?;

    let workers = settings.workers.max(1);
    let batch_size = settings.batch_size.max(1);
    let commit_every = settings.commit_every.max(1);
    let cache_path = settings.metadata_cache_path();

    // Bounded queues give backpressure in both directions.
    let (batch_tx, batch_rx) = mpsc::channel::<Vec<ManifestRecord>>(workers * 2);
    let (op_tx, op_rx) = mpsc::channel::<Vec<IndexOp>>(workers * 2);
    let batch_rx = std::sync::Arc::new(tokio::sync::Mutex::new(batch_rx));

    // Workers: pure record → op conversion.
    let mut worker_handles = Vec::with_capacity(workers);
    for _ in 0..workers {
        let batch_rx = batch_rx.clone();
        let op_tx = op_tx.clone();
        worker_handles.push(tokio::spawn(async move {
            loop {
                let batch = {
                    let mut rx = batch_rx.lock().await;
                    rx.recv().await
                };
                let Some(batch) = batch else { break };
                let ops: Vec<IndexOp> = batch
                    .iter()
                    .map(|record| IndexOp {
                        doc: LexicalIndex::document_for(&fields, record),
                        custodian: record.document.custodian.clone(),
                        doctype: record.document.doctype.as_str().to_string(),
                    })
                    .collect();
                if op_tx.send(ops).await.is_err() {
                    break;
                }
            }
        }));
    }
    drop(op_tx);

    // Single writer thread: applies ops, commits, persists the cache.
    let writer_handle = tokio::task::spawn_blocking(move || -> Result<(usize, usize), IndexError> {
        let mut writer = writer;
        let mut rx = op_rx;
        let mut cache = MetadataCache::default();
        let mut documents = 0usize;
        let mut commits = 0usize;
        let mut since_commit = 0usize;
        while let Some(ops) = rx.blocking_recv() {
            for op in ops {
                writer.add_document(op.doc)?;
                cache.observe(&op.custodian, &op.doctype);
                documents += 1;
                since_commit += 1;
                if since_commit >= commit_every {
                    writer.commit()?;
                    cache.save(&cache_path)?;
                    commits += 1;
                    since_commit = 0;
                }
            }
        }
        writer.commit()?;
        cache.save(&cache_path)?;
        commits += 1;
        Ok((documents, commits))
    });

    // Feed batches, checking cancellation at batch boundaries.
    let mut cancelled = false;
    for batch in records.chunks(batch_size) {
        if cancel.is_cancelled() {
            cancelled = true;
            break;
        }
        if batch_tx.send(batch.to_vec()).await.is_err() {
            break;
        }
    }
    drop(batch_tx);

    for handle in worker_handles {
        let _ = handle.await;
    }
    let (documents, commits) = writer_handle
        .await
        .map_err(|e| IndexError::Io(std::io::Error::other(e)))??;

    if cancelled {
        tracing::info!("index build cancelled after {} of {} documents", documents, total);
    }

    ledger
        .log(
            Operation::IndexBuild,
            vec![settings.manifest_path().to_string_lossy().into_owned()],
            vec![
                settings.lexical_dir().to_string_lossy().into_owned(),
                settings.metadata_cache_path().to_string_lossy().into_owned(),
            ],
            serde_json::json!({
                "documents": documents,
                "commits": commits,
                "cancelled": cancelled,
                "workers": workers,
                "batch_size": batch_size,
                "commit_every": commit_every,
                "failures": [],
            }),
        )
        .map_err(|e| IndexError::Io(std::io::Error::other(e)))?;

    Ok(IndexBuildStats {
        documents,
        commits,
        cancelled,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::SearchFilters;
    use crate::models::{DocType, Document};
    use chrono::Utc;
    use std::path::PathBuf;

    fn record(i: usize, custodian: &str, text: &str) -> ManifestRecord {
        ManifestRecord::stamp(Document {
            sha256: format!("{:064x}", i),
            path: PathBuf::from(format!("/case/{}/doc{}.txt", custodian, i)),
            size: text.len() as u64,
            mtime: Utc::now(),
            mime_type: "text/plain".into(),
            custodian: custodian.into(),
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
        settings.workers = 2;
        settings.batch_size = 3;
        settings.commit_every = 5;
        settings.ensure_directories().unwrap();
        (dir, settings)
    }

    #[tokio::test]
    async fn test_build_and_search() {
        let (_dir, settings) = scratch();
        let ledger = Ledger::open(&settings.audit_path).unwrap();
        let records: Vec<ManifestRecord> = (0..20)
            .map(|i| {
                let custodian = if i % 2 == 0 { "smith" } else { "jones" };
                record(i, custodian, &format!("document number {} about contracts", i))
            })
            .collect();

        let stats = build_lexical_index(&settings, records, &ledger, &CancelFlag::new())
            .await
            .unwrap();
        assert_eq!(stats.documents, 20);
        assert!(!stats.cancelled);
        assert!(stats.commits >= 4);

        let cache = MetadataCache::load(&settings.metadata_cache_path()).unwrap();
        assert_eq!(cache.doc_count, 20);
        assert_eq!(
            cache.custodians,
            ["jones", "smith"].iter().map(|s| s.to_string()).collect()
        );

        let index = LexicalIndex::open(&settings.lexical_dir()).unwrap();
        let hits = index
            .search("contracts", &SearchFilters::default(), 50)
            .unwrap();
        assert_eq!(hits.len(), 20);

        // The build left an audit trail.
        let entries = Ledger::read_all(&settings.audit_path).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].operation, Operation::IndexBuild);
    }

    #[tokio::test]
    async fn test_rebuild_gives_identical_results() {
        let (_dir, settings) = scratch();
        let ledger = Ledger::open(&settings.audit_path).unwrap();
        let records: Vec<ManifestRecord> = (0..10)
            .map(|i| record(i, "smith", "shared vocabulary filing"))
            .collect();

        build_lexical_index(&settings, records.clone(), &ledger, &CancelFlag::new())
            .await
            .unwrap();
        let index = LexicalIndex::open(&settings.lexical_dir()).unwrap();
        let first: Vec<String> = index
            .search("filing", &SearchFilters::default(), 50)
            .unwrap()
            .into_iter()
            .map(|h| h.sha256)
            .collect();

        build_lexical_index(&settings, records, &ledger, &CancelFlag::new())
            .await
            .unwrap();
        let index = LexicalIndex::open(&settings.lexical_dir()).unwrap();
        let second: Vec<String> = index
            .search("filing", &SearchFilters::default(), 50)
            .unwrap()
            .into_iter()
            .map(|h| h.sha256)
            .collect();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_cancel_before_start_builds_nothing() {
        let (_dir, settings) = scratch();
        let ledger = Ledger::open(&settings.audit_path).unwrap();
        let cancel = CancelFlag::new();
        cancel.cancel();
        let records = vec![record(0, "smith", "text")];
        let stats = build_lexical_index(&settings, records, &ledger, &cancel)
            .await
            .unwrap();
        assert!(stats.cancelled);
        assert_eq!(stats.documents, 0);
    }
}
