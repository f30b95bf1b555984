//! Pipeline orchestration: the two host-triggered phases (spec.md §2, §4.11).
//!
//! - [`precompact`]: transcript → chunks → scored, embedded, entity-linked
//!   memories, persisted and folded into the knowledge graph.
//! - [`session_start`]: task query → adaptive-K retrieval, task-boosted and
//!   formatted for re-injection.

pub mod precompact;
pub mod session_start;

/// Errors surfaced at the pipeline boundary. Both phases are meant to
/// degrade gracefully rather than block the host (spec.md §7) — callers at
/// the `palimpsest-hooks` boundary flatten this into the `{status: "error"}`
/// envelope rather than propagating a panic.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),

    #[cfg(feature = "embeddings")]
    #[error("embedding error: {0}")]
    Embedding(#[from] crate::embeddings::EmbeddingError),

    #[error("this build was compiled without the `{0}` feature, which this operation requires")]
    FeatureDisabled(&'static str),
}
