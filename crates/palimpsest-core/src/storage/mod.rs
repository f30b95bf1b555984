//! Storage Module (C6): spec.md §4.5.
//!
//! SQLite-based persistent store with:
//! - FTS5 full-text search with query sanitization
//! - Embedded vector storage plus an in-process HNSW index
//! - A TTL-cached knowledge graph rebuilt from the `memory_entity_edges` table

mod migrations;
mod sqlite;

pub use migrations::MIGRATIONS;
pub use sqlite::{default_store_dir, MemoryFilter, PutBatchReport, Result, Stats, Storage, StorageError};
