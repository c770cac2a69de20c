//! Index build and search commands.

use console::style;

use crate::cli::helpers;
use crate::cli::SearchMode;
use crate::config::Settings;
use crate::gate::OfflineGate;
use crate::index::dense::{
    build_dense_index, open_dense_store, EmbeddingPort, HashEmbedder, HttpEmbedder,
    VectorStorePort,
};
use crate::index::{build_lexical_index, rrf_fuse, LexicalIndex, SearchFilters, Strategy};
use crate::utils::CancelFlag;

/// Pick the embedding adapter from settings. A configured provider runs
/// behind the gate; otherwise the deterministic local embedder is used.
fn embedder_for(settings: &Settings, gate: &OfflineGate) -> Box<dyn EmbeddingPort> {
    match (&settings.embedding_api_base, &settings.embedding_api_key) {
        (Some(base), Some(key)) => Box::new(HttpEmbedder::new(
            base,
            key,
            "kanon2",
            settings.embed_timeout_secs,
            gate.clone(),
        )),
        _ => Box::new(HashEmbedder),
    }
}

pub async fn cmd_build(settings: &Settings, dense: bool) -> anyhow::Result<()> {
    settings.ensure_directories()?;
    let ledger = helpers::open_ledger(settings)?;
    let records = helpers::load_manifest(settings)?;
    let total = records.len();

    let bar = helpers::progress(total as u64, "indexing");
    let stats =
        build_lexical_index(settings, records.clone(), &ledger, &CancelFlag::new()).await?;
    bar.finish_and_clear();
    println!(
        "{} Indexed {} documents ({} commits)",
        style("✓").green(),
        stats.documents,
        stats.commits
    );

    if dense {
        let gate = OfflineGate::new(settings.online);
        let embedder = embedder_for(settings, &gate);
        let stats = build_dense_index(
            settings,
            embedder.as_ref(),
            &records,
            &ledger,
            &CancelFlag::new(),
        )
        .await?;
        println!(
            "{} Embedded {} documents in {} batches (dim {})",
            style("✓").green(),
            stats.documents,
            stats.batches,
            settings.dense_dim
        );
    }
    Ok(())
}

pub async fn cmd_search(
    settings: &Settings,
    query: &str,
    mode: SearchMode,
    limit: usize,
    filters: SearchFilters,
) -> anyhow::Result<()> {
    let index = LexicalIndex::open(&settings.lexical_dir())?;
    let depth = limit.max(100);

    let hits = match mode {
        SearchMode::Lexical => {
            let mut hits = index.search(query, &filters, depth)?;
            hits.truncate(limit);
            hits
        }
        SearchMode::Dense | SearchMode::Hybrid => {
            let gate = OfflineGate::new(settings.online);
            let embedder = embedder_for(settings, &gate);
            let dense_hits = match open_dense_store(settings, embedder.model_id()) {
                Ok(store) => {
                    let vector = embedder.embed_query(query, settings.dense_dim).await?;
                    store.query(&vector, depth)?
                }
                Err(e) => {
                    tracing::warn!("dense index unavailable, degrading to lexical: {}", e);
                    eprintln!(
                        "{} dense index unavailable, using lexical results",
                        style("!").yellow()
                    );
                    Vec::new()
                }
            };
            let lexical_hits = if mode == SearchMode::Hybrid || dense_hits.is_empty() {
                index.search(query, &filters, depth)?
            } else {
                Vec::new()
            };
            rrf_fuse(lexical_hits, dense_hits, limit, |sha| {
                index.lookup(sha).ok().flatten()
            })
        }
    };

    // Strategy reflects what actually contributed when degradation
    // occurred; hit lists go out as JSON for shell consumers.
    let out = serde_json::to_string_pretty(&hits)?;
    println!("{}", out);
    if hits.iter().all(|h| h.strategy == Strategy::Lexical) && mode != SearchMode::Lexical {
        tracing::debug!("query answered lexically");
    }
    Ok(())
}
