//! Search indexing: lexical BM25, metadata cache, optional dense vectors,
//! and hybrid fusion.

mod builder;
pub mod dense;
mod hybrid;
mod lexical;
mod metadata;

use thiserror::Error;

pub use builder::{build_lexical_index, IndexBuildStats};
pub use hybrid::{rrf_fuse, RRF_K};
pub use lexical::{LexicalIndex, SearchFilters, SearchHit, SnippetSpan, Strategy};
pub use metadata::MetadataCache;

/// Errors raised by index build and search.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),

    #[error("query error: {0}")]
    Query(#[from] tantivy::query::QueryParserError),

    #[error("dense index error: {0}")]
    Dense(#[from] dense::DenseError),

    #[error("index not found at {0}; run `index build` first")]
    NotBuilt(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
