//! SessionStart retrieval (C12): spec.md §4.8.
//!
//! Entity-aware hybrid retrieval: embed the query (no contextual prefix —
//! only ingestion-time text gets one, spec.md §4.4), pull a similarity- and
//! importance-filtered candidate pool, re-rank with the task-context scorer,
//! then prepend the most recent session memories so a just-written decision
//! is never dropped purely for scoring low on similarity.

use std::collections::HashSet;

use crate::artifacts;
use crate::entities;
use crate::memory::{ImportanceCategory, Memory};
use crate::storage::{MemoryFilter, Storage};
use crate::task_context::task_importance;

use super::PipelineError;

/// Tunable retrieval parameters (spec.md §4.8 defaults).
#[derive(Debug, Clone)]
pub struct RetrievalOptions {
    pub k_max: usize,
    pub k_recent: usize,
    pub min_importance: f64,
    pub min_similarity: f32,
    pub alpha: f64,
    pub beta: f64,
    /// Scope retrieval to one session. Defaults to `None` (search across
    /// all sessions) per SPEC_FULL.md's Open Question 1 resolution.
    pub session_id: Option<String>,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        RetrievalOptions {
            k_max: 20,
            k_recent: 4,
            min_importance: 0.0,
            min_similarity: 0.35,
            alpha: 0.6,
            beta: 0.4,
            session_id: None,
        }
    }
}

/// One retrieved memory with its scoring breakdown.
#[derive(Debug, Clone)]
pub struct RetrievedMemory {
    pub memory: Memory,
    pub similarity: f32,
    pub task_importance: f64,
    pub final_score: f64,
    /// True if this memory was prepended by the recency window rather than
    /// surfaced by similarity/task-importance ranking.
    pub is_recent: bool,
}

/// Result of one SessionStart retrieval.
#[derive(Debug, Clone)]
pub struct RetrievalReport {
    pub query: String,
    pub retrieved: Vec<RetrievedMemory>,
    /// Human-readable rendering with importance indicators, ready for
    /// re-injection into the assistant's context (spec.md §4.8 step 8).
    pub formatted: String,
}

fn indicator_for(category: ImportanceCategory) -> &'static str {
    match category {
        ImportanceCategory::Critical => "\u{1f534}",
        ImportanceCategory::High => "\u{1f7e0}",
        ImportanceCategory::Medium => "\u{1f7e1}",
        ImportanceCategory::Low => "\u{1f7e2}",
    }
}

fn format_retrieval(items: &[RetrievedMemory]) -> String {
    let mut out = String::new();
    for item in items {
        let indicator = indicator_for(item.memory.category());
        let boost_marker = if item.task_importance > item.memory.importance + f64::EPSILON {
            " (task-boosted)"
        } else {
            ""
        };
        let recent_marker = if item.is_recent { " [recent]" } else { "" };
        out.push_str(&format!(
            "{indicator}{recent_marker}{boost_marker} {}\n    → {}\n    → {}\n",
            item.memory.intent, item.memory.action, item.memory.outcome
        ));
    }
    out
}

#[cfg(all(feature = "embeddings", feature = "vector-search"))]
pub fn run(storage: &Storage, query: &str, options: &RetrievalOptions) -> Result<RetrievalReport, PipelineError> {
    use crate::embeddings::Embedder;

    let query_artifacts = artifacts::extract(query);
    let query_entities = entities::extract(query, &query_artifacts);
    let query_entity_ids: Vec<String> = query_entities.iter().map(|e| e.id()).collect();

    let embedder = Embedder::new();
    let query_embedding = embedder.embed(query)?;

    let filter = MemoryFilter {
        session_id: options.session_id.clone(),
        min_importance: Some(options.min_importance),
        ..Default::default()
    };
    let pool_size = options.k_max.saturating_mul(2).max(options.k_max);
    let candidates = storage.query(query, &query_embedding.vector, pool_size, &filter)?;

    let graph = storage.graph()?;

    let mut scored = Vec::new();
    for (memory, similarity) in candidates {
        if similarity < options.min_similarity {
            continue;
        }
        let freq = storage.entity_freq_for_memory(&memory.id)?;
        let ti = task_importance(memory.importance, &freq, &query_entity_ids, &graph);
        scored.push(RetrievedMemory {
            memory,
            similarity,
            task_importance: ti,
            final_score: 0.0,
            is_recent: false,
        });
    }

    if !scored.is_empty() {
        let (min_ti, max_ti) = scored.iter().fold((f64::MAX, f64::MIN), |(mn, mx), r| {
            (mn.min(r.task_importance), mx.max(r.task_importance))
        });
        let range = (max_ti - min_ti).max(f64::EPSILON);
        let single_candidate = scored.len() == 1;
        for r in scored.iter_mut() {
            let normalized_ti = if single_candidate {
                1.0
            } else {
                (r.task_importance - min_ti) / range
            };
            r.final_score = options.alpha * r.similarity as f64 + options.beta * normalized_ti;
        }
    }

    scored.sort_by(|a, b| b.final_score.partial_cmp(&a.final_score).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(options.k_max);

    let existing_ids: HashSet<String> = scored.iter().map(|r| r.memory.id.clone()).collect();

    let mut recent = storage.scan(&MemoryFilter {
        session_id: options.session_id.clone(),
        ..Default::default()
    })?;
    recent.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    let mut prepended = Vec::new();
    for memory in recent {
        if prepended.len() >= options.k_recent {
            break;
        }
        if existing_ids.contains(&memory.id) {
            continue;
        }
        prepended.push(RetrievedMemory {
            similarity: 0.0,
            task_importance: memory.importance,
            final_score: f64::INFINITY,
            is_recent: true,
            memory,
        });
    }

    let mut retrieved = prepended;
    retrieved.extend(scored);

    let formatted = format_retrieval(&retrieved);

    Ok(RetrievalReport {
        query: query.to_string(),
        retrieved,
        formatted,
    })
}

#[cfg(not(all(feature = "embeddings", feature = "vector-search")))]
pub fn run(_storage: &Storage, query: &str, _options: &RetrievalOptions) -> Result<RetrievalReport, PipelineError> {
    let _ = query;
    Err(PipelineError::FeatureDisabled("embeddings+vector-search"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_match_spec_defaults() {
        let options = RetrievalOptions::default();
        assert_eq!(options.k_max, 20);
        assert_eq!(options.k_recent, 4);
        assert!((options.min_similarity - 0.35).abs() < 1e-6);
        assert!((options.alpha - 0.6).abs() < 1e-6);
        assert!((options.beta - 0.4).abs() < 1e-6);
        assert!(options.session_id.is_none());
    }

    #[test]
    fn indicator_matches_category() {
        assert_eq!(indicator_for(ImportanceCategory::Critical), "\u{1f534}");
        assert_eq!(indicator_for(ImportanceCategory::Low), "\u{1f7e2}");
    }
}
