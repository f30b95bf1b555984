//! Search Module
//!
//! - Vector search via HNSW (USearch).
//! - Keyword search via FTS5.
//! - Hybrid search with reciprocal-rank fusion, reused to merge the two
//!   above for [`crate::storage::Storage::query`] (SPEC_FULL.md's
//!   "Supplemented features").

mod hybrid;
mod keyword;
mod vector;

pub use vector::{
    VectorIndex, VectorIndexConfig, VectorIndexStats, VectorSearchError, DEFAULT_CONNECTIVITY,
    DEFAULT_DIMENSIONS,
};

pub use keyword::{sanitize_fts5_query, sanitize_keywords, KeywordSearcher};

pub use hybrid::{linear_combination, reciprocal_rank_fusion, HybridSearchConfig, HybridSearcher};
