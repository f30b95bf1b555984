//! SQLite-backed Memory Store (C6): spec.md §4.5.
//!
//! Single-writer, multi-reader within a process (spec.md §5): a dedicated
//! writer connection behind a `Mutex`, and a separate reader connection so
//! concurrent reads aren't serialized behind writes. WAL mode, owner-only
//! permissions, and `configure_connection` hardening follow the teacher's
//! `Storage::new`/`configure_connection` pattern (SPEC_FULL.md's
//! "File-locked, WAL-mode SQLite" supplement).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use rusqlite::{params, Connection, OptionalExtension};

use crate::entities::{Entity, EntityType};
use crate::graph::{GraphCache, KnowledgeGraph};
use crate::memory::{Artifacts, Flags, ImportanceCategory, Memory};

use super::migrations::MIGRATIONS;

#[cfg(feature = "embeddings")]
use crate::embeddings::EMBEDDING_DIMENSIONS;

#[cfg(feature = "vector-search")]
use crate::search::VectorIndex;

/// Storage error type.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("memory not found: {0}")]
    NotFound(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("duplicate memory id: {0}")]
    DuplicateId(String),
    #[error("embedding dimensionality mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("initialization error: {0}")]
    Init(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Post-hoc metadata filter for `query`/`scan` (spec.md §4.5).
#[derive(Debug, Clone, Default)]
pub struct MemoryFilter {
    pub session_id: Option<String>,
    pub min_importance: Option<f64>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub has_code: Option<bool>,
    pub has_files: Option<bool>,
    pub has_architecture: Option<bool>,
    pub success: Option<bool>,
}

impl MemoryFilter {
    pub fn matches(&self, m: &Memory) -> bool {
        if let Some(session_id) = &self.session_id {
            if &m.session_id != session_id {
                return false;
            }
        }
        if let Some(min) = self.min_importance {
            if m.importance < min {
                return false;
            }
        }
        if let Some(since) = self.since {
            if m.timestamp < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if m.timestamp > until {
                return false;
            }
        }
        if let Some(v) = self.has_code {
            if m.flags.has_code != v {
                return false;
            }
        }
        if let Some(v) = self.has_files {
            if m.flags.has_files != v {
                return false;
            }
        }
        if let Some(v) = self.has_architecture {
            if m.flags.has_architecture != v {
                return false;
            }
        }
        if let Some(v) = self.success {
            if m.flags.success != v {
                return false;
            }
        }
        true
    }
}

/// Outcome of [`Storage::put_batch`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PutBatchReport {
    pub stored: usize,
    pub duplicates: usize,
}

/// Cheap aggregations (§6.4 `stats()`).
#[derive(Debug, Clone, Default)]
pub struct Stats {
    pub total: usize,
    pub by_category: HashMap<&'static str, usize>,
    pub by_flag: HashMap<&'static str, usize>,
    pub avg_importance: f64,
}

fn configure_connection(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "busy_timeout", 5000)?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;
    Ok(())
}

fn run_migrations(conn: &Connection) -> Result<()> {
    let current: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    for migration in MIGRATIONS {
        if migration.version > current {
            conn.execute_batch(migration.up)?;
            conn.pragma_update(None, "user_version", migration.version)?;
            tracing::debug!(version = migration.version, description = migration.description, "applied migration");
        }
    }
    Ok(())
}

#[cfg(unix)]
fn harden_permissions(dir: &Path, db_path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700))?;
    if db_path.exists() {
        std::fs::set_permissions(db_path, std::fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn harden_permissions(_dir: &Path, _db_path: &Path) -> Result<()> {
    Ok(())
}

/// Default on-disk location: `<platform data dir>/memory_db/` (spec.md
/// §6.3).
pub fn default_store_dir() -> Result<PathBuf> {
    let dirs = ProjectDirs::from("dev", "palimpsest", "core")
        .ok_or_else(|| StorageError::Init("could not determine platform data directory".to_string()))?;
    Ok(dirs.data_dir().join("memory_db"))
}

/// Persistent vector+metadata store, keyed by stable memory id.
pub struct Storage {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
    #[cfg(feature = "vector-search")]
    vector_index: Mutex<VectorIndex>,
    graph_cache: Mutex<Option<GraphCache>>,
}

impl Storage {
    /// Open (creating if absent) the store at `dir`, or the default
    /// platform location if `None`.
    pub fn open(dir: Option<PathBuf>) -> Result<Self> {
        let dir = match dir {
            Some(d) => d,
            None => default_store_dir()?,
        };
        std::fs::create_dir_all(&dir)?;

        let db_path = dir.join("palimpsest.db");
        let writer = Connection::open(&db_path)?;
        configure_connection(&writer)?;
        run_migrations(&writer)?;

        let reader = Connection::open(&db_path)?;
        configure_connection(&reader)?;

        harden_permissions(&dir, &db_path)?;

        #[cfg(feature = "vector-search")]
        let vector_index = {
            #[cfg(feature = "embeddings")]
            let dims = EMBEDDING_DIMENSIONS;
            #[cfg(not(feature = "embeddings"))]
            let dims = crate::search::DEFAULT_DIMENSIONS;
            let mut config = crate::search::VectorIndexConfig::default();
            config.dimensions = dims;
            VectorIndex::with_config(config)
                .map_err(|e| StorageError::Init(format!("vector index init failed: {e}")))?
        };

        let storage = Storage {
            writer: Mutex::new(writer),
            reader: Mutex::new(reader),
            #[cfg(feature = "vector-search")]
            vector_index: Mutex::new(vector_index),
            graph_cache: Mutex::new(None),
        };

        #[cfg(feature = "vector-search")]
        storage.load_embeddings_into_index()?;

        Ok(storage)
    }

    #[cfg(feature = "vector-search")]
    fn load_embeddings_into_index(&self) -> Result<()> {
        let reader = self.reader.lock().expect("reader mutex poisoned");
        let mut stmt = reader.prepare("SELECT id, embedding FROM memories WHERE embedding IS NOT NULL")?;
        let mut index = self.vector_index.lock().expect("vector index mutex poisoned");
        let rows = stmt.query_map([], |row| {
            let id: String = row.get(0)?;
            let blob: Vec<u8> = row.get(1)?;
            Ok((id, blob))
        })?;
        for row in rows {
            let (id, blob) = row?;
            let vector = bytes_to_vector(&blob);
            if index.add(&id, &vector).is_err() {
                tracing::warn!(id, "failed to load embedding into vector index");
            }
        }
        Ok(())
    }

    /// Atomically insert a new memory plus its entity links. Rejects
    /// duplicate ids and dimensionality mismatches (spec.md §4.5 `put`).
    pub fn put(&self, memory: &Memory, entities: &[(Entity, u32)]) -> Result<()> {
        let embedding = memory
            .embedding
            .as_ref()
            .ok_or_else(|| StorageError::Init("memory has no embedding".to_string()))?;

        #[cfg(feature = "embeddings")]
        if embedding.len() != EMBEDDING_DIMENSIONS {
            return Err(StorageError::DimensionMismatch {
                expected: EMBEDDING_DIMENSIONS,
                got: embedding.len(),
            });
        }

        let mut writer = self.writer.lock().expect("writer mutex poisoned");
        let tx = writer.transaction()?;

        let existing: Option<String> = tx
            .query_row("SELECT id FROM memories WHERE id = ?1", params![memory.id], |row| row.get(0))
            .optional()?;
        if existing.is_some() {
            return Err(StorageError::DuplicateId(memory.id.clone()));
        }

        let artifacts_json = serde_json::to_string(&memory.artifacts)?;
        let embedding_bytes = vector_to_bytes(embedding);

        tx.execute(
            "INSERT INTO memories (
                id, session_id, timestamp, chunk_index, intent, action, outcome,
                importance, artifacts_json, has_code, has_files, has_architecture,
                success, embedding, embedded_text
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15)",
            params![
                memory.id,
                memory.session_id,
                memory.timestamp.to_rfc3339(),
                memory.chunk_index,
                memory.intent,
                memory.action,
                memory.outcome,
                memory.importance,
                artifacts_json,
                memory.flags.has_code as i64,
                memory.flags.has_files as i64,
                memory.flags.has_architecture as i64,
                memory.flags.success as i64,
                embedding_bytes,
                memory.embedded_text,
            ],
        )?;

        for (entity, weight) in entities {
            tx.execute(
                "INSERT INTO entities (entity_id, entity_type, canonical_form, surface_form)
                 VALUES (?1,?2,?3,?4)
                 ON CONFLICT(entity_id) DO UPDATE SET surface_form = excluded.surface_form",
                params![entity.id(), entity.entity_type.as_str(), entity.canonical_form, entity.surface_form],
            )?;
            tx.execute(
                "INSERT INTO memory_entity_edges (memory_id, entity_id, weight) VALUES (?1,?2,?3)",
                params![memory.id, entity.id(), weight],
            )?;
        }

        tx.commit()?;

        #[cfg(feature = "vector-search")]
        {
            let mut index = self.vector_index.lock().expect("vector index mutex poisoned");
            if let Err(e) = index.add(&memory.id, embedding) {
                tracing::warn!(id = %memory.id, error = %e, "failed to add embedding to vector index");
            }
        }

        self.invalidate_graph_cache();
        Ok(())
    }

    /// Insert a batch of memories plus their entity links in a single
    /// transaction (spec.md §5/§7: "all or none"). A memory whose id
    /// collides with one already stored is skipped and counted in
    /// [`PutBatchReport::duplicates`] rather than aborting the batch — that
    /// mirrors `put`'s own per-call behavior and keeps a retried PreCompact
    /// invocation idempotent. Any other failure rolls the whole transaction
    /// back, leaving the store exactly as it was before the call.
    pub fn put_batch(&self, items: &[(Memory, Vec<(Entity, u32)>)]) -> Result<PutBatchReport> {
        for (memory, _) in items {
            let embedding = memory
                .embedding
                .as_ref()
                .ok_or_else(|| StorageError::Init("memory has no embedding".to_string()))?;
            #[cfg(feature = "embeddings")]
            if embedding.len() != EMBEDDING_DIMENSIONS {
                return Err(StorageError::DimensionMismatch {
                    expected: EMBEDDING_DIMENSIONS,
                    got: embedding.len(),
                });
            }
        }

        let mut writer = self.writer.lock().expect("writer mutex poisoned");
        let tx = writer.transaction()?;

        let mut report = PutBatchReport::default();
        let mut stored_ids = Vec::with_capacity(items.len());

        for (memory, entities) in items {
            let embedding = memory.embedding.as_ref().expect("checked above");

            let existing: Option<String> = tx
                .query_row("SELECT id FROM memories WHERE id = ?1", params![memory.id], |row| row.get(0))
                .optional()?;
            if existing.is_some() {
                report.duplicates += 1;
                continue;
            }

            let artifacts_json = serde_json::to_string(&memory.artifacts)?;
            let embedding_bytes = vector_to_bytes(embedding);

            tx.execute(
                "INSERT INTO memories (
                    id, session_id, timestamp, chunk_index, intent, action, outcome,
                    importance, artifacts_json, has_code, has_files, has_architecture,
                    success, embedding, embedded_text
                ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15)",
                params![
                    memory.id,
                    memory.session_id,
                    memory.timestamp.to_rfc3339(),
                    memory.chunk_index,
                    memory.intent,
                    memory.action,
                    memory.outcome,
                    memory.importance,
                    artifacts_json,
                    memory.flags.has_code as i64,
                    memory.flags.has_files as i64,
                    memory.flags.has_architecture as i64,
                    memory.flags.success as i64,
                    embedding_bytes,
                    memory.embedded_text,
                ],
            )?;

            for (entity, weight) in entities {
                tx.execute(
                    "INSERT INTO entities (entity_id, entity_type, canonical_form, surface_form)
                     VALUES (?1,?2,?3,?4)
                     ON CONFLICT(entity_id) DO UPDATE SET surface_form = excluded.surface_form",
                    params![entity.id(), entity.entity_type.as_str(), entity.canonical_form, entity.surface_form],
                )?;
                tx.execute(
                    "INSERT INTO memory_entity_edges (memory_id, entity_id, weight) VALUES (?1,?2,?3)",
                    params![memory.id, entity.id(), weight],
                )?;
            }

            report.stored += 1;
            stored_ids.push(memory.id.clone());
        }

        tx.commit()?;

        #[cfg(feature = "vector-search")]
        {
            let mut index = self.vector_index.lock().expect("vector index mutex poisoned");
            for (memory, _) in items {
                if !stored_ids.contains(&memory.id) {
                    continue;
                }
                if let Some(embedding) = memory.embedding.as_ref() {
                    if let Err(e) = index.add(&memory.id, embedding) {
                        tracing::warn!(id = %memory.id, error = %e, "failed to add embedding to vector index");
                    }
                }
            }
        }

        if report.stored > 0 {
            self.invalidate_graph_cache();
        }
        Ok(report)
    }

    /// O(1) lookup by id.
    pub fn get(&self, id: &str) -> Result<Option<Memory>> {
        let reader = self.reader.lock().expect("reader mutex poisoned");
        let row = reader
            .query_row("SELECT * FROM memories WHERE id = ?1", params![id], row_to_memory)
            .optional()?;
        Ok(row)
    }

    /// Hybrid query: fuses vector search over `query_vec` with FTS5 keyword
    /// search over `query_text` via reciprocal rank fusion, returning up to
    /// `k` `(memory, fused score)` pairs with `filter` applied post-hoc
    /// (spec.md §4.5 `query`, SPEC_FULL.md's hybrid-fusion supplement). A
    /// blank `query_text` (e.g. an all-operator string sanitizing to
    /// nothing) falls back to pure vector ranking.
    #[cfg(feature = "vector-search")]
    pub fn query(&self, query_text: &str, query_vec: &[f32], k: usize, filter: &MemoryFilter) -> Result<Vec<(Memory, f32)>> {
        let pool = k.saturating_mul(4).max(k);

        let vector_hits = {
            let index = self.vector_index.lock().expect("vector index mutex poisoned");
            index
                .search(query_vec, pool)
                .map_err(|e| StorageError::Init(format!("vector search failed: {e}")))?
        };

        let keyword_hits = self.keyword_hits(query_text, pool)?;

        let fused = if keyword_hits.is_empty() {
            vector_hits
        } else {
            crate::search::HybridSearcher::new().fuse_rrf(&keyword_hits, &vector_hits)
        };

        let mut results = Vec::with_capacity(k);
        for (id, score) in fused {
            if let Some(memory) = self.get(&id)? {
                if filter.matches(&memory) {
                    results.push((memory, score));
                }
            }
            if results.len() >= k {
                break;
            }
        }
        Ok(results)
    }

    /// Keyword hits as `(id, rank-derived score)` pairs ordered best match
    /// first, for fusion with vector search in `query`. `text` is
    /// sanitized the same way as `keyword_search`'s input.
    #[cfg(feature = "vector-search")]
    fn keyword_hits(&self, text: &str, limit: usize) -> Result<Vec<(String, f32)>> {
        let match_query = crate::search::sanitize_fts5_query(text);
        if match_query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let reader = self.reader.lock().expect("reader mutex poisoned");
        let mut stmt = reader.prepare(
            "SELECT m.id, bm25(memories_fts) FROM memories m
             JOIN memories_fts fts ON m.rowid = fts.rowid
             WHERE memories_fts MATCH ?1
             ORDER BY bm25(memories_fts)
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![match_query, limit as i64], |row| {
            let id: String = row.get(0)?;
            let bm25: f64 = row.get(1)?;
            Ok((id, -bm25 as f32))
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StorageError::from)
    }

    /// Keyword search over the FTS5 index (§6.4 `keyword_search`). `text`
    /// is free-form query text, sanitized into a safe `MATCH` query before
    /// it ever reaches SQLite — arbitrary FTS5 operator characters in a
    /// real query can't break or redirect the search.
    pub fn keyword_search(&self, text: &str, limit: usize) -> Result<Vec<Memory>> {
        #[cfg(feature = "vector-search")]
        let match_query = crate::search::sanitize_fts5_query(text);
        #[cfg(not(feature = "vector-search"))]
        let match_query = text.to_string();
        if match_query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let reader = self.reader.lock().expect("reader mutex poisoned");
        let mut stmt = reader.prepare(
            "SELECT m.* FROM memories m
             JOIN memories_fts fts ON m.rowid = fts.rowid
             WHERE memories_fts MATCH ?1
             ORDER BY m.importance DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![match_query, limit as i64], row_to_memory)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StorageError::from)
    }

    /// Atomic batch removal. Orphaned entities are garbage-collected and
    /// the graph cache invalidated (spec.md §4.9).
    pub fn delete(&self, ids: &[String]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut writer = self.writer.lock().expect("writer mutex poisoned");
        let tx = writer.transaction()?;
        let mut deleted = 0;
        for id in ids {
            deleted += tx.execute("DELETE FROM memories WHERE id = ?1", params![id])?;
        }
        tx.execute(
            "DELETE FROM entities WHERE entity_id NOT IN (SELECT DISTINCT entity_id FROM memory_entity_edges)",
            [],
        )?;
        tx.commit()?;

        #[cfg(feature = "vector-search")]
        {
            let mut index = self.vector_index.lock().expect("vector index mutex poisoned");
            for id in ids {
                let _ = index.remove(id);
            }
        }

        self.invalidate_graph_cache();
        Ok(deleted)
    }

    /// Iterate all matching memories (used by the pruner and graph
    /// builder).
    pub fn scan(&self, filter: &MemoryFilter) -> Result<Vec<Memory>> {
        let reader = self.reader.lock().expect("reader mutex poisoned");
        let mut stmt = reader.prepare("SELECT * FROM memories")?;
        let rows = stmt.query_map([], row_to_memory)?;
        let mut out = Vec::new();
        for row in rows {
            let memory = row?;
            if filter.matches(&memory) {
                out.push(memory);
            }
        }
        Ok(out)
    }

    pub fn count(&self) -> Result<usize> {
        let reader = self.reader.lock().expect("reader mutex poisoned");
        let count: i64 = reader.query_row("SELECT COUNT(*) FROM memories", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn stats(&self) -> Result<Stats> {
        let memories = self.scan(&MemoryFilter::default())?;
        let total = memories.len();
        let mut by_category: HashMap<&'static str, usize> = HashMap::new();
        let mut by_flag: HashMap<&'static str, usize> = HashMap::new();
        let mut importance_sum = 0.0;

        for m in &memories {
            let category = match m.category() {
                ImportanceCategory::Low => "low",
                ImportanceCategory::Medium => "medium",
                ImportanceCategory::High => "high",
                ImportanceCategory::Critical => "critical",
            };
            *by_category.entry(category).or_insert(0) += 1;
            if m.flags.has_code {
                *by_flag.entry("has_code").or_insert(0) += 1;
            }
            if m.flags.has_files {
                *by_flag.entry("has_files").or_insert(0) += 1;
            }
            if m.flags.has_architecture {
                *by_flag.entry("has_architecture").or_insert(0) += 1;
            }
            if m.flags.success {
                *by_flag.entry("success").or_insert(0) += 1;
            }
            importance_sum += m.importance;
        }

        let avg_importance = if total > 0 { importance_sum / total as f64 } else { 0.0 };

        Ok(Stats {
            total,
            by_category,
            by_flag,
            avg_importance,
        })
    }

    /// Entity mention counts for one memory (feeds the task-context
    /// scorer's `freq(e, memory)`).
    pub fn entity_freq_for_memory(&self, memory_id: &str) -> Result<HashMap<String, u32>> {
        let reader = self.reader.lock().expect("reader mutex poisoned");
        let mut stmt =
            reader.prepare("SELECT entity_id, weight FROM memory_entity_edges WHERE memory_id = ?1")?;
        let rows = stmt.query_map(params![memory_id], |row| {
            let entity_id: String = row.get(0)?;
            let weight: i64 = row.get(1)?;
            Ok((entity_id, weight as u32))
        })?;
        rows.collect::<rusqlite::Result<HashMap<_, _>>>().map_err(StorageError::from)
    }

    /// Resolve entity ids from the query's own extracted entities to the
    /// store's canonical ids (a query entity that was never seen at
    /// ingestion simply won't be present in the graph).
    pub fn entity_ids_for(&self, entities: &[Entity]) -> Vec<String> {
        entities.iter().map(|e| e.id()).collect()
    }

    /// Build the knowledge graph fresh from a full scan (testable property
    /// 9: reconstructibility).
    pub fn build_graph(&self) -> Result<KnowledgeGraph> {
        let reader = self.reader.lock().expect("reader mutex poisoned");
        let mut stmt = reader.prepare(
            "SELECT mee.memory_id, e.entity_id, e.entity_type, e.canonical_form, e.surface_form
             FROM memory_entity_edges mee
             JOIN entities e ON e.entity_id = mee.entity_id",
        )?;
        let rows = stmt.query_map([], |row| {
            let memory_id: String = row.get(0)?;
            let entity_type: String = row.get(2)?;
            let canonical_form: String = row.get(3)?;
            let surface_form: String = row.get(4)?;
            Ok((memory_id, entity_type, canonical_form, surface_form))
        })?;

        let mut by_memory: HashMap<String, Vec<Entity>> = HashMap::new();
        for row in rows {
            let (memory_id, entity_type, canonical_form, surface_form) = row?;
            let entity = Entity {
                entity_type: parse_entity_type(&entity_type),
                surface_form,
                canonical_form,
            };
            by_memory.entry(memory_id).or_default().push(entity);
        }

        let owned: Vec<(String, Vec<Entity>)> = by_memory.into_iter().collect();
        Ok(KnowledgeGraph::build(owned.iter().map(|(id, ents)| (id.as_str(), ents.as_slice()))))
    }

    /// Graph accessor honoring the TTL cache (spec.md §4.6): rebuilds on
    /// miss, otherwise returns the cached graph. Readers never observe a
    /// partially-rebuilt graph — the swap is a single assignment.
    pub fn graph(&self) -> Result<KnowledgeGraph> {
        let mut cache = self.graph_cache.lock().expect("graph cache mutex poisoned");
        let needs_rebuild = match cache.as_ref() {
            Some(c) => c.is_stale(),
            None => true,
        };
        if needs_rebuild {
            let fresh = self.build_graph()?;
            match cache.as_mut() {
                Some(c) => c.refresh(fresh),
                None => *cache = Some(GraphCache::with_default_ttl(fresh)),
            }
        }
        Ok(cache.as_ref().expect("graph cache populated above").get().clone())
    }

    fn invalidate_graph_cache(&self) {
        let mut cache = self.graph_cache.lock().expect("graph cache mutex poisoned");
        *cache = None;
    }
}

fn parse_entity_type(s: &str) -> EntityType {
    match s {
        "FILE" => EntityType::File,
        "FUNCTION" => EntityType::Function,
        "BUG" => EntityType::Bug,
        "FEATURE" => EntityType::Feature,
        "TOOL" => EntityType::Tool,
        "ERROR" => EntityType::Error,
        "DECISION" => EntityType::Decision,
        _ => EntityType::Other,
    }
}

fn vector_to_bytes(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn bytes_to_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

fn row_to_memory(row: &rusqlite::Row) -> rusqlite::Result<Memory> {
    let timestamp_str: String = row.get("timestamp")?;
    let timestamp = DateTime::parse_from_rfc3339(&timestamp_str)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now());

    let artifacts_json: String = row.get("artifacts_json")?;
    let artifacts: Artifacts = serde_json::from_str(&artifacts_json).unwrap_or_default();

    let embedding: Option<Vec<u8>> = row.get("embedding")?;
    let embedding = embedding.map(|b| bytes_to_vector(&b));

    Ok(Memory {
        id: row.get("id")?,
        session_id: row.get("session_id")?,
        timestamp,
        chunk_index: row.get("chunk_index")?,
        intent: row.get("intent")?,
        action: row.get("action")?,
        outcome: row.get("outcome")?,
        importance: row.get("importance")?,
        artifacts,
        flags: Flags {
            has_code: row.get::<_, i64>("has_code")? != 0,
            has_files: row.get::<_, i64>("has_files")? != 0,
            has_architecture: row.get::<_, i64>("has_architecture")? != 0,
            success: row.get::<_, i64>("success")? != 0,
        },
        embedding,
        embedded_text: row.get("embedded_text")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::CodeSnippet;
    use tempfile::tempdir;

    /// Isolated on-disk store per test, following the teacher's pattern:
    /// a real file-backed `Storage` in a scratch directory rather than a
    /// `:memory:` connection (the writer/reader split needs a shared file).
    fn test_storage() -> Storage {
        let dir = tempdir().unwrap();
        Storage::open(Some(dir.path().to_path_buf())).unwrap()
    }

    fn sample_memory(id: &str, session: &str, importance: f64) -> Memory {
        Memory {
            id: id.to_string(),
            session_id: session.to_string(),
            timestamp: Utc::now(),
            chunk_index: 0,
            intent: "implement JWT auth in auth.py".to_string(),
            action: "wrote auth.py".to_string(),
            outcome: "tests pass".to_string(),
            importance,
            artifacts: Artifacts {
                code_snippets: vec![CodeSnippet {
                    language: "python".into(),
                    text: "def login(): ...".into(),
                }],
                files: vec!["auth.py".into()],
                ..Default::default()
            },
            flags: Flags {
                has_code: true,
                has_files: true,
                has_architecture: false,
                success: true,
            },
            embedding: Some(vec![0.1_f32; crate::embeddings::EMBEDDING_DIMENSIONS]),
            embedded_text: "Session abc at 2026-01-01 00:00. Files: auth.py. implement JWT auth".to_string(),
        }
    }

    #[test]
    fn put_then_get_roundtrips() {
        let storage = test_storage();
        let memory = sample_memory("m1", "s1", 12.0);
        storage.put(&memory, &[]).unwrap();

        let fetched = storage.get("m1").unwrap().unwrap();
        assert_eq!(fetched.id, "m1");
        assert_eq!(fetched.intent, memory.intent);
        assert!(fetched.embedding.is_some());
    }

    #[test]
    fn duplicate_id_is_rejected() {
        let storage = test_storage();
        let memory = sample_memory("m1", "s1", 12.0);
        storage.put(&memory, &[]).unwrap();
        let err = storage.put(&memory, &[]).unwrap_err();
        assert!(matches!(err, StorageError::DuplicateId(_)));
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let storage = test_storage();
        let mut memory = sample_memory("m1", "s1", 12.0);
        memory.embedding = Some(vec![0.1_f32; 4]);
        let err = storage.put(&memory, &[]).unwrap_err();
        assert!(matches!(err, StorageError::DimensionMismatch { .. }));
    }

    #[test]
    fn keyword_search_finds_by_intent() {
        let storage = test_storage();
        storage.put(&sample_memory("m1", "s1", 12.0), &[]).unwrap();
        let results = storage.keyword_search("\"JWT\"", 10).unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn delete_removes_memory_and_gcs_orphan_entities() {
        let storage = test_storage();
        let memory = sample_memory("m1", "s1", 12.0);
        let entity = Entity::new(EntityType::File, "auth.py");
        storage.put(&memory, &[(entity, 1)]).unwrap();

        let deleted = storage.delete(&["m1".to_string()]).unwrap();
        assert_eq!(deleted, 1);
        assert!(storage.get("m1").unwrap().is_none());

        let graph = storage.build_graph().unwrap();
        assert_eq!(graph.node_count(), 0);
    }

    #[test]
    fn stats_aggregate_by_category_and_flag() {
        let storage = test_storage();
        storage.put(&sample_memory("m1", "s1", 12.0), &[]).unwrap();
        storage.put(&sample_memory("m2", "s1", 1.0), &[]).unwrap();
        let stats = storage.stats().unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.by_category.get("high"), Some(&1));
        assert_eq!(stats.by_category.get("low"), Some(&1));
        assert_eq!(stats.by_flag.get("has_code"), Some(&2));
    }

    #[test]
    fn scan_applies_session_filter() {
        let storage = test_storage();
        storage.put(&sample_memory("m1", "s1", 12.0), &[]).unwrap();
        storage.put(&sample_memory("m2", "s2", 12.0), &[]).unwrap();
        let filter = MemoryFilter {
            session_id: Some("s1".to_string()),
            ..Default::default()
        };
        let results = storage.scan(&filter).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "m1");
    }
}
