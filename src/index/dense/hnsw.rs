//! Dense graph construction over the `hnsw` crate.
//!
//! Vectors are normalized before insertion; the metric maps cosine
//! distance into order-preserving `u32` bits as `space` requires. The
//! graph's PRNG is a `Pcg64` seeded from a fixed state, so the same
//! insertion sequence always yields the same graph.

use hnsw::{Hnsw, Params, Searcher};
use rand_pcg::Pcg64;
use serde::{Deserialize, Serialize};
use space::{Metric, Neighbor};

/// Max connections per node per layer; layer 0 allows twice this.
pub const GRAPH_M: usize = 16;
pub const GRAPH_M0: usize = 32;
/// Candidate list size during construction.
pub const EF_CONSTRUCTION: usize = 200;

/// Cosine distance over normalized vectors.
///
/// `1 - dot` lies in [0, 2] for unit vectors; non-negative f32 bit
/// patterns compare in the same order as the floats, which satisfies the
/// metric's unsigned-unit requirement.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CosineDistance;

impl Metric<Vec<f32>> for CosineDistance {
    type Unit = u32;

    fn distance(&self, a: &Vec<f32>, b: &Vec<f32>) -> u32 {
        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        (1.0 - dot).max(0.0).to_bits()
    }
}

/// The dense index graph type.
pub type Graph = Hnsw<CosineDistance, Vec<f32>, Pcg64, GRAPH_M, GRAPH_M0>;

/// Fresh graph with the pinned construction parameters. `Hnsw::new_params`
/// seeds the PRNG from a fixed default state, so construction is
/// deterministic for a given insertion order.
pub fn new_graph() -> Graph {
    Hnsw::new_params(
        CosineDistance,
        Params::new().ef_construction(EF_CONSTRUCTION),
    )
}

/// Insert a vector, normalizing it first. Returns the item index.
pub fn insert_normalized(
    graph: &mut Graph,
    searcher: &mut Searcher<u32>,
    mut vector: Vec<f32>,
) -> usize {
    normalize(&mut vector);
    graph.insert(vector, searcher)
}

/// Nearest `top_k` item indices with cosine similarity, best first.
pub fn nearest(graph: &Graph, query: &[f32], top_k: usize, ef: usize) -> Vec<(usize, f32)> {
    if graph.is_empty() {
        return Vec::new();
    }
    let mut query = query.to_vec();
    normalize(&mut query);
    let mut searcher: Searcher<u32> = Searcher::default();
    let mut neighbors = vec![
        Neighbor {
            index: !0,
            distance: !0,
        };
        top_k.min(graph.len())
    ];
    let found = graph.nearest(&query, ef.max(top_k), &mut searcher, &mut neighbors);
    found
        .iter()
        .map(|n| (n.index, 1.0 - f32::from_bits(n.distance)))
        .collect()
}

pub fn normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(dim: usize, hot: usize) -> Vec<f32> {
        let mut v = vec![0.0; dim];
        v[hot] = 1.0;
        v
    }

    fn build(points: &[Vec<f32>]) -> Graph {
        let mut graph = new_graph();
        let mut searcher = Searcher::default();
        for p in points {
            insert_normalized(&mut graph, &mut searcher, p.clone());
        }
        graph
    }

    #[test]
    fn test_metric_orders_by_angle() {
        let metric = CosineDistance;
        let a = vec![1.0, 0.0];
        let close = vec![0.9, 0.435_889_9]; // normalized-ish
        let far = vec![0.0, 1.0];
        assert!(metric.distance(&a, &close) < metric.distance(&a, &far));
        assert_eq!(metric.distance(&a, &a), 0.0f32.to_bits());
    }

    #[test]
    fn test_exact_match_comes_first() {
        let points: Vec<Vec<f32>> = (0..8).map(|i| unit(8, i)).collect();
        let graph = build(&points);
        let hits = nearest(&graph, &unit(8, 3), 3, 50);
        assert_eq!(hits[0].0, 3);
        assert!((hits[0].1 - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_neighborhood_recall_on_clustered_data() {
        let dim = 16;
        // Two clusters around orthogonal axes with small perturbations.
        let mut points = Vec::new();
        for i in 0..40 {
            let mut v = vec![0.01f32; dim];
            let axis = if i < 20 { 0 } else { 8 };
            v[axis] = 1.0;
            v[(i % 4) + 2] = 0.05 + (i as f32) * 0.001;
            points.push(v);
        }
        let graph = build(&points);
        let hits = nearest(&graph, &unit(dim, 0), 10, 100);
        assert_eq!(hits.len(), 10);
        // Every returned point should be from the first cluster.
        for (index, sim) in hits {
            assert!(index < 20, "expected cluster-0 member, got {}", index);
            assert!(sim > 0.5);
        }
    }

    #[test]
    fn test_same_inputs_same_graph() {
        let points: Vec<Vec<f32>> = (0..30)
            .map(|i| {
                vec![
                    (i as f32).sin(),
                    (i as f32).cos(),
                    ((i * 7) as f32).sin(),
                    1.0,
                ]
            })
            .collect();
        let encode = || {
            bincode::serde::encode_to_vec(build(&points), bincode::config::standard()).unwrap()
        };
        assert_eq!(encode(), encode());
    }

    #[test]
    fn test_graph_serde_roundtrip_preserves_search() {
        let points: Vec<Vec<f32>> = (0..20)
            .map(|i| vec![(i as f32).sin(), (i as f32).cos(), 0.5, 1.0])
            .collect();
        let graph = build(&points);
        let bytes =
            bincode::serde::encode_to_vec(&graph, bincode::config::standard()).unwrap();
        let (decoded, _): (Graph, usize) =
            bincode::serde::decode_from_slice(&bytes, bincode::config::standard()).unwrap();
        assert_eq!(decoded.len(), 20);

        let q = vec![0.8f32, 0.1, 0.0, 0.6];
        assert_eq!(nearest(&graph, &q, 5, 50), nearest(&decoded, &q, 5, 50));
    }

    #[test]
    fn test_empty_graph_returns_nothing() {
        let graph = new_graph();
        assert!(nearest(&graph, &[1.0, 0.0, 0.0, 0.0], 5, 50).is_empty());
    }
}
