//! End-to-end discovery pipeline: ingest, audit, index, search.

mod common;

use rexlit::audit::{Ledger, Operation};
use rexlit::index::dense::{
    build_dense_index, open_dense_store, EmbeddingPort, HashEmbedder, VectorStorePort,
    HASH_EMBEDDER_MODEL,
};
use rexlit::index::{build_lexical_index, rrf_fuse, LexicalIndex, SearchFilters, MetadataCache};
use rexlit::ingest::IngestService;
use rexlit::manifest::read_manifest;
use rexlit::utils::CancelFlag;

fn seed_corpus(root: &std::path::Path) {
    std::fs::create_dir_all(root.join("smith")).unwrap();
    std::fs::create_dir_all(root.join("jones")).unwrap();
    std::fs::write(
        root.join("smith").join("merger.txt"),
        "Confidential memo regarding the Acme merger timeline and valuation.",
    )
    .unwrap();
    std::fs::write(
        root.join("smith").join("hr.txt"),
        "HR note: employee SSN 123-45-6789 must be protected.",
    )
    .unwrap();
    std::fs::write(
        root.join("jones").join("minutes.md"),
        "# Board minutes\nDiscussion of the Acme merger and financing.",
    )
    .unwrap();
}

#[tokio::test]
async fn test_ingest_index_search_flow() {
    let scratch = tempfile::tempdir().unwrap();
    let settings = common::scratch_settings(scratch.path());
    let root = scratch.path().join("case");
    seed_corpus(&root);

    // Ingest writes a sorted manifest and one audit entry per file.
    let records = {
        let ledger = Ledger::open(&settings.audit_path).unwrap();
        let service = IngestService::new(&settings, &ledger);
        let outcome = service.run(&root, &CancelFlag::new(), |_| {}).unwrap();
        assert_eq!(outcome.documents, 3);
        read_manifest(&outcome.manifest_path).unwrap()
    };
    let shas: Vec<&str> = records.iter().map(|r| r.sha256()).collect();
    let mut sorted = shas.clone();
    sorted.sort();
    assert_eq!(shas, sorted);

    // Build lexical index and query it.
    {
        let ledger = Ledger::open(&settings.audit_path).unwrap();
        build_lexical_index(&settings, records.clone(), &ledger, &CancelFlag::new())
            .await
            .unwrap();
    }
    let index = LexicalIndex::open(&settings.lexical_dir()).unwrap();
    let hits = index
        .search("merger", &SearchFilters::default(), 10)
        .unwrap();
    assert_eq!(hits.len(), 2);

    let filtered = index
        .search(
            "merger",
            &SearchFilters {
                custodian: Some("jones".into()),
                ..SearchFilters::default()
            },
            10,
        )
        .unwrap();
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0].custodian, "jones");

    // Metadata cache answers facet questions without scanning.
    let cache = MetadataCache::load(&settings.metadata_cache_path()).unwrap();
    assert_eq!(cache.doc_count, 3);
    assert!(cache.custodians.contains("smith"));
    assert!(cache.custodians.contains("jones"));

    // The whole run left a verifiable chain.
    let (ok, bad) = Ledger::verify(&settings.audit_path).unwrap();
    assert!(ok, "chain must verify, first bad: {:?}", bad);
    let entries = Ledger::read_all(&settings.audit_path).unwrap();
    assert_eq!(
        entries
            .iter()
            .filter(|e| e.operation == Operation::Ingest)
            .count(),
        3
    );
    assert_eq!(
        entries
            .iter()
            .filter(|e| e.operation == Operation::IndexBuild)
            .count(),
        1
    );
}

#[cfg(unix)]
#[tokio::test]
async fn test_boundary_symlink_never_leaks() {
    let outside = tempfile::tempdir().unwrap();
    std::fs::write(outside.path().join("hostname"), b"host-secret-bytes").unwrap();

    let scratch = tempfile::tempdir().unwrap();
    let settings = common::scratch_settings(scratch.path());
    let root = scratch.path().join("case");
    std::fs::create_dir_all(root.join("evidence")).unwrap();
    std::fs::write(root.join("evidence").join("a.txt"), b"real evidence").unwrap();
    std::os::unix::fs::symlink(
        outside.path().join("hostname"),
        root.join("evidence").join("leak"),
    )
    .unwrap();

    let ledger = Ledger::open(&settings.audit_path).unwrap();
    let service = IngestService::new(&settings, &ledger);
    let outcome = service.run(&root, &CancelFlag::new(), |_| {}).unwrap();

    assert_eq!(outcome.documents, 1);
    assert_eq!(outcome.boundary_violations.len(), 1);

    // Nothing from the symlink target exists anywhere in the home.
    let manifest = std::fs::read_to_string(settings.manifest_path()).unwrap();
    assert!(!manifest.contains("host-secret-bytes"));
    let audit = std::fs::read_to_string(&settings.audit_path).unwrap();
    assert!(!audit.contains("host-secret-bytes"));
}

#[tokio::test]
async fn test_hybrid_search_fuses_lexical_and_dense() {
    let scratch = tempfile::tempdir().unwrap();
    let mut settings = common::scratch_settings(scratch.path());
    settings.dense_dim = 256;
    let root = scratch.path().join("case");
    seed_corpus(&root);

    let records = {
        let ledger = Ledger::open(&settings.audit_path).unwrap();
        let service = IngestService::new(&settings, &ledger);
        service.run(&root, &CancelFlag::new(), |_| {}).unwrap();
        read_manifest(&settings.manifest_path()).unwrap()
    };

    {
        let ledger = Ledger::open(&settings.audit_path).unwrap();
        build_lexical_index(&settings, records.clone(), &ledger, &CancelFlag::new())
            .await
            .unwrap();
        build_dense_index(&settings, &HashEmbedder, &records, &ledger, &CancelFlag::new())
            .await
            .unwrap();
    }

    let index = LexicalIndex::open(&settings.lexical_dir()).unwrap();
    let lexical = index
        .search("merger timeline", &SearchFilters::default(), 100)
        .unwrap();
    let store = open_dense_store(&settings, HASH_EMBEDDER_MODEL).unwrap();
    let query = HashEmbedder
        .embed_query("merger timeline", 256)
        .await
        .unwrap();
    let dense = store.query(&query, 100).unwrap();
    assert!(!lexical.is_empty());
    assert!(!dense.is_empty());

    let fused = rrf_fuse(lexical, dense, 10, |sha| index.lookup(sha).ok().flatten());
    assert!(!fused.is_empty());
    // Fused scores are RRF sums, descending with sha tie-break.
    for pair in fused.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }

    // Embedding batches were audited with truncated ids only.
    let entries = Ledger::read_all(&settings.audit_path).unwrap();
    let batches: Vec<_> = entries
        .iter()
        .filter(|e| e.operation == Operation::EmbeddingBatch)
        .collect();
    assert!(!batches.is_empty());
    for batch in batches {
        for input in &batch.inputs {
            assert!(input.len() <= 16);
        }
    }
}

#[tokio::test]
async fn test_chain_break_detected_at_exact_index() {
    let scratch = tempfile::tempdir().unwrap();
    let settings = common::scratch_settings(scratch.path());

    {
        let ledger = Ledger::open(&settings.audit_path).unwrap();
        for i in 0..100 {
            ledger
                .log(
                    Operation::Ingest,
                    vec![format!("{:064x}", i)],
                    vec![],
                    serde_json::json!({"seq": i}),
                )
                .unwrap();
        }
    }

    let content = std::fs::read_to_string(&settings.audit_path).unwrap();
    let pruned: Vec<&str> = content
        .lines()
        .enumerate()
        .filter(|(i, _)| *i != 50)
        .map(|(_, l)| l)
        .collect();
    std::fs::write(&settings.audit_path, pruned.join("\n") + "\n").unwrap();

    let (ok, first_bad) = Ledger::verify(&settings.audit_path).unwrap();
    assert!(!ok);
    assert_eq!(first_bad, Some(50));
}
