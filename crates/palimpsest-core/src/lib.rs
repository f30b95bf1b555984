//! # Palimpsest Core
//!
//! Memory pipeline for preserving long-horizon AI coding assistant context
//! across compaction events. Two host-triggered phases share this library:
//!
//! - **PreCompact**: chunk a raw transcript into Intent/Action/Outcome
//!   triples, score and enrich them, embed with a contextual prefix, persist
//!   to the store, and fold new entities into the knowledge graph.
//! - **SessionStart**: given a task query, retrieve an adaptive-sized,
//!   task-boosted set of memories for re-injection.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use palimpsest_core::config::Config;
//! use palimpsest_core::storage::Storage;
//! use palimpsest_core::pipeline::{precompact, session_start};
//!
//! let storage = Storage::open(None)?;
//! let request = precompact::PreCompactRequest::new("session-1", transcript_jsonl);
//! let report = precompact::run(&storage, &request, &Config::default())?;
//! let retrieval = session_start::run(&storage, "fix the auth bug", &Default::default())?;
//! ```
//!
//! ## Feature flags
//!
//! - `embeddings` (default): local semantic embeddings via `fastembed`.
//! - `vector-search` (default): HNSW approximate nearest-neighbor search via
//!   `usearch`, fused with FTS5 keyword search via reciprocal rank fusion.
//! - `bundled-sqlite` (default): statically link SQLite rather than requiring
//!   a system library.

#![warn(rustdoc::missing_crate_level_docs)]

pub mod artifacts;
pub mod chunk;
pub mod clusterer;
pub mod config;
pub mod entities;
pub mod graph;
pub mod memory;
pub mod pipeline;
pub mod pruner;
pub mod score;
pub mod storage;
pub mod task_context;
pub mod transcript;

#[cfg(feature = "embeddings")]
#[cfg_attr(docsrs, doc(cfg(feature = "embeddings")))]
pub mod embeddings;

#[cfg(feature = "vector-search")]
#[cfg_attr(docsrs, doc(cfg(feature = "vector-search")))]
pub mod search;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

pub use memory::{Artifacts, CodeSnippet, Flags, ImportanceCategory, Memory};

pub use entities::{Entity, EntityType};

pub use chunk::{Chunk, ChunkerError};

pub use score::score_chunk;

pub use graph::{Centrality, GraphError, KnowledgeGraph};

pub use task_context::task_importance;

pub use pruner::{PruneReport, PrunePolicy, Pruner};

pub use clusterer::{cluster_session, Cluster};

pub use storage::{MemoryFilter, PutBatchReport, Storage, StorageError, Stats};

pub use transcript::{TranscriptMessage, TranscriptRole};

pub use pipeline::{
    precompact::{PreCompactReport, PreCompactRequest},
    session_start::{RetrievalOptions, RetrievalReport, RetrievedMemory},
    PipelineError,
};

#[cfg(feature = "embeddings")]
pub use embeddings::{cosine_similarity, Embedder, EmbeddingError, EMBEDDING_DIMENSIONS};

#[cfg(feature = "vector-search")]
pub use search::{
    linear_combination, reciprocal_rank_fusion, HybridSearchConfig, HybridSearcher,
    KeywordSearcher, VectorIndex, VectorIndexConfig, VectorSearchError,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Convenient imports for common usage.
pub mod prelude {
    pub use crate::{
        Chunk, Entity, EntityType, Memory, PipelineError, PreCompactReport, RetrievalOptions,
        RetrievalReport, Storage, StorageError,
    };

    #[cfg(feature = "embeddings")]
    pub use crate::{Embedder, EmbeddingError};

    #[cfg(feature = "vector-search")]
    pub use crate::{HybridSearcher, VectorIndex};
}
