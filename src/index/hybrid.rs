//! Reciprocal Rank Fusion of lexical and dense hit lists.

use std::collections::BTreeMap;

use super::dense::ScoredId;
use super::lexical::{SearchHit, Strategy};

/// RRF constant.
pub const RRF_K: f64 = 60.0;

/// Fuse ranked lists: `score(d) = Σ 1/(k + rank_d)` over the strategies
/// that returned `d`. Missing lists contribute zero; ties break on
/// ascending sha256. `resolve` hydrates documents only the dense list
/// surfaced (stored fields from the lexical index).
pub fn rrf_fuse(
    lexical: Vec<SearchHit>,
    dense: Vec<ScoredId>,
    limit: usize,
    mut resolve: impl FnMut(&str) -> Option<SearchHit>,
) -> Vec<SearchHit> {
    struct Fused {
        hit: Option<SearchHit>,
        rrf: f64,
        lexical_score: Option<f32>,
        dense_score: Option<f32>,
    }

    let mut by_sha: BTreeMap<String, Fused> = BTreeMap::new();

    for (rank, hit) in lexical.into_iter().enumerate() {
        let entry = by_sha.entry(hit.sha256.clone()).or_insert(Fused {
            lexical_score: hit.lexical_score.or(Some(hit.score)),
            hit: Some(hit),
            rrf: 0.0,
            dense_score: None,
        });
        entry.rrf += 1.0 / (RRF_K + (rank + 1) as f64);
    }

    for (rank, scored) in dense.into_iter().enumerate() {
        let entry = by_sha.entry(scored.id.clone()).or_insert(Fused {
            hit: None,
            rrf: 0.0,
            lexical_score: None,
            dense_score: None,
        });
        entry.rrf += 1.0 / (RRF_K + (rank + 1) as f64);
        entry.dense_score = Some(scored.score);
        if entry.hit.is_none() {
            entry.hit = resolve(&scored.id);
        }
    }

    let mut fused: Vec<(String, Fused)> = by_sha.into_iter().collect();
    fused.sort_by(|a, b| {
        b.1.rrf
            .partial_cmp(&a.1.rrf)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });

    fused
        .into_iter()
        .filter_map(|(_, f)| {
            let mut hit = f.hit?;
            let had_lexical = f.lexical_score.is_some();
            let had_dense = f.dense_score.is_some();
            hit.strategy = match (had_lexical, had_dense) {
                (true, true) => Strategy::Hybrid,
                (false, true) => Strategy::Dense,
                _ => Strategy::Lexical,
            };
            hit.score = f.rrf as f32;
            hit.lexical_score = f.lexical_score;
            hit.dense_score = f.dense_score;
            Some(hit)
        })
        .take(limit)
        .collect()
}
