//! Semantic Embeddings (C5).
//!
//! Local embedding generation via `fastembed` (ONNX). No network calls —
//! the pipeline is strictly local-first (spec.md §1 Non-goals).

mod local;

pub use local::{
    build_contextual_prefix, cosine_similarity, dot_product, euclidean_distance,
    matryoshka_truncate, Embedder, Embedding, EmbeddingError, BATCH_SIZE, EMBEDDING_DIMENSIONS,
    MAX_TEXT_LENGTH,
};
