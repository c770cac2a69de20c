//! Dense index disk persistence.
//!
//! Layout under `index/dense/` for model `<model>` at dimension `<dim>`:
//! `<model>_<dim>.graph` (framed binary graph), `<model>_<dim>.vec`
//! (little-endian f32, sorted by identifier), `<model>_<dim>.ids`
//! (sorted SHA-256 list, one per line), `<model>_<dim>.meta.json`.
//!
//! The graph file is a small hand-written frame (magic + format version)
//! around the serde-encoded graph, so the format can be versioned
//! independently of the graph crate.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use hnsw::Searcher;
use serde::{Deserialize, Serialize};

use super::hnsw::{
    insert_normalized, nearest, new_graph, Graph, EF_CONSTRUCTION, GRAPH_M,
};
use super::{DenseError, ScoredId, VectorStorePort};

const GRAPH_MAGIC: &[u8; 4] = b"RXHG";
const GRAPH_FORMAT_VERSION: u32 = 2;

/// Builder/metadata sidecar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseMeta {
    pub dim: usize,
    pub m: usize,
    pub ef_construction: usize,
    pub doc_count: usize,
    pub builder_version: String,
    pub model: String,
    pub model_version: String,
}

/// HNSW-backed vector store with the pinned four-file layout.
pub struct DenseStore {
    dir: PathBuf,
    model: String,
    dim: usize,
    graph: Option<Graph>,
    ids: Vec<String>,
    vectors: Vec<Vec<f32>>,
    meta: Option<DenseMeta>,
}

impl DenseStore {
    pub fn new(dir: &Path, model: &str, dim: usize) -> Self {
        Self {
            dir: dir.to_path_buf(),
            model: model.to_string(),
            dim,
            graph: None,
            ids: Vec::new(),
            vectors: Vec::new(),
            meta: None,
        }
    }

    fn artifact(&self, suffix: &str) -> PathBuf {
        self.dir
            .join(format!("{}_{}.{}", self.model, self.dim, suffix))
    }

    pub fn graph_path(&self) -> PathBuf {
        self.artifact("graph")
    }

    pub fn exists(&self) -> bool {
        self.graph_path().exists()
            && self.artifact("vec").exists()
            && self.artifact("ids").exists()
            && self.artifact("meta.json").exists()
    }

    pub fn meta(&self) -> Option<&DenseMeta> {
        self.meta.as_ref()
    }

    pub fn artifact_paths(&self) -> Vec<PathBuf> {
        vec![
            self.artifact("graph"),
            self.artifact("vec"),
            self.artifact("ids"),
            self.artifact("meta.json"),
        ]
    }

    fn encode_graph(graph: &Graph) -> Result<Vec<u8>, DenseError> {
        let body = bincode::serde::encode_to_vec(graph, bincode::config::standard())
            .map_err(|e| DenseError::Corrupt(format!("graph encode failed: {}", e)))?;
        let mut framed = Vec::with_capacity(body.len() + 8);
        framed.extend_from_slice(GRAPH_MAGIC);
        framed.extend_from_slice(&GRAPH_FORMAT_VERSION.to_le_bytes());
        framed.extend_from_slice(&body);
        Ok(framed)
    }

    fn decode_graph(bytes: &[u8]) -> Result<Graph, DenseError> {
        if bytes.len() < 8 || &bytes[..4] != GRAPH_MAGIC {
            return Err(DenseError::Corrupt("graph file has no frame".to_string()));
        }
        let version = u32::from_le_bytes(bytes[4..8].try_into().expect("4-byte slice"));
        if version != GRAPH_FORMAT_VERSION {
            return Err(DenseError::Corrupt(format!(
                "graph format {} unsupported (expected {})",
                version, GRAPH_FORMAT_VERSION
            )));
        }
        let (graph, _) =
            bincode::serde::decode_from_slice(&bytes[8..], bincode::config::standard())
                .map_err(|e| DenseError::Corrupt(format!("graph decode failed: {}", e)))?;
        Ok(graph)
    }
}

impl VectorStorePort for DenseStore {
    /// Build the graph and persist all four artifacts.
    ///
    /// Identifiers are sorted (with their vectors) before insertion so the
    /// graph is a pure function of the (id, vector) set.
    fn build(
        &mut self,
        vectors: Vec<Vec<f32>>,
        identifiers: Vec<String>,
        model_version: &str,
    ) -> Result<(), DenseError> {
        if vectors.len() != identifiers.len() {
            return Err(DenseError::Corrupt(format!(
                "{} vectors for {} identifiers",
                vectors.len(),
                identifiers.len()
            )));
        }
        for v in &vectors {
            if v.len() != self.dim {
                return Err(DenseError::DimensionMismatch {
                    expected: self.dim,
                    actual: v.len(),
                });
            }
        }
        let mut paired: Vec<(String, Vec<f32>)> =
            identifiers.into_iter().zip(vectors).collect();
        paired.sort_by(|a, b| a.0.cmp(&b.0));

        let mut graph = new_graph();
        let mut searcher = Searcher::default();
        let mut normalized: Vec<Vec<f32>> = Vec::with_capacity(paired.len());
        for (_, vector) in &paired {
            let item = insert_normalized(&mut graph, &mut searcher, vector.clone());
            let mut stored = vector.clone();
            super::hnsw::normalize(&mut stored);
            debug_assert_eq!(item, normalized.len());
            normalized.push(stored);
        }

        std::fs::create_dir_all(&self.dir)?;

        let mut vec_bytes = Vec::with_capacity(normalized.len() * self.dim * 4);
        for vector in &normalized {
            for &x in vector {
                vec_bytes.extend_from_slice(&x.to_le_bytes());
            }
        }
        std::fs::write(self.artifact("vec"), &vec_bytes)?;

        let ids: Vec<String> = paired.iter().map(|(id, _)| id.clone()).collect();
        std::fs::write(self.artifact("ids"), ids.join("\n") + "\n")?;

        std::fs::write(self.graph_path(), Self::encode_graph(&graph)?)?;

        let meta = DenseMeta {
            dim: self.dim,
            m: GRAPH_M,
            ef_construction: EF_CONSTRUCTION,
            doc_count: ids.len(),
            builder_version: env!("CARGO_PKG_VERSION").to_string(),
            model: self.model.clone(),
            model_version: model_version.to_string(),
        };
        let mut meta_file = std::fs::File::create(self.artifact("meta.json"))?;
        meta_file.write_all(serde_json::to_string_pretty(&meta)?.as_bytes())?;
        meta_file.sync_all()?;

        self.ids = ids;
        self.vectors = normalized;
        self.graph = Some(graph);
        self.meta = Some(meta);
        Ok(())
    }

    /// Load the four artifacts, verifying the pinned dimension.
    fn load(&mut self) -> Result<(), DenseError> {
        if !self.exists() {
            return Err(DenseError::NotBuilt(self.dir.display().to_string()));
        }
        let meta: DenseMeta =
            serde_json::from_reader(std::fs::File::open(self.artifact("meta.json"))?)?;
        if meta.dim != self.dim || meta.model != self.model {
            return Err(DenseError::ModelMismatch {
                expected: format!("{}_{}", self.model, self.dim),
                actual: format!("{}_{}", meta.model, meta.dim),
            });
        }

        let ids: Vec<String> = std::fs::read_to_string(self.artifact("ids"))?
            .lines()
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();

        let mut vec_bytes = Vec::new();
        std::fs::File::open(self.artifact("vec"))?.read_to_end(&mut vec_bytes)?;
        let expected_len = ids.len() * self.dim * 4;
        if vec_bytes.len() != expected_len {
            return Err(DenseError::Corrupt(format!(
                "vector file is {} bytes, expected {}",
                vec_bytes.len(),
                expected_len
            )));
        }
        let mut vectors = Vec::with_capacity(ids.len());
        for chunk in vec_bytes.chunks_exact(self.dim * 4) {
            let mut v = Vec::with_capacity(self.dim);
            for quad in chunk.chunks_exact(4) {
                v.push(f32::from_le_bytes(quad.try_into().expect("4-byte chunk")));
            }
            vectors.push(v);
        }

        let graph = Self::decode_graph(&std::fs::read(self.graph_path())?)?;
        if graph.len() != ids.len() {
            return Err(DenseError::Corrupt(format!(
                "graph holds {} items for {} identifiers",
                graph.len(),
                ids.len()
            )));
        }

        self.ids = ids;
        self.vectors = vectors;
        self.graph = Some(graph);
        self.meta = Some(meta);
        Ok(())
    }

    /// Query by vector; scores are cosine mapped into [0, 1].
    fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<ScoredId>, DenseError> {
        let graph = self
            .graph
            .as_ref()
            .ok_or_else(|| DenseError::NotBuilt(self.dir.display().to_string()))?;
        if vector.len() != self.dim {
            return Err(DenseError::DimensionMismatch {
                expected: self.dim,
                actual: vector.len(),
            });
        }
        let raw = nearest(graph, vector, top_k, (top_k * 4).max(64));
        Ok(raw
            .into_iter()
            .map(|(item, cos)| ScoredId {
                id: self.ids[item].clone(),
                score: ((cos + 1.0) / 2.0).clamp(0.0, 1.0),
            })
            .collect())
    }
}
