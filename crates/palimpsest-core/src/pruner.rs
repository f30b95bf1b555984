//! Pruner (C9): spec.md §4.9.
//!
//! Three policies applied in order during a sweep. This module is pure —
//! it computes a deletion *plan* over an in-memory snapshot; the caller
//! (the storage layer) is responsible for applying it atomically and for
//! the entity GC / graph-cache invalidation that follows a real deletion.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::embeddings::cosine_similarity;
use crate::memory::Memory;

/// Pruning thresholds, overridable via the optional `palimpsest.toml`
/// config layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrunePolicy {
    pub old_threshold_days: f64,
    pub low_importance_threshold: f64,
    pub redundancy_threshold: f32,
    pub max_per_session: usize,
}

impl Default for PrunePolicy {
    fn default() -> Self {
        PrunePolicy {
            old_threshold_days: 90.0,
            low_importance_threshold: 3.0,
            redundancy_threshold: 0.95,
            max_per_session: 500,
        }
    }
}

/// Result of a prune sweep (real or dry-run).
#[derive(Debug, Clone, Default)]
pub struct PruneReport {
    pub deleted_ids: Vec<String>,
    pub dry_run: bool,
}

pub struct Pruner;

impl Pruner {
    /// Compute the set of memory ids a sweep would delete, without
    /// mutating anything. `dry_run` only affects the report's flag — the
    /// plan is identical either way; it's the caller who decides whether
    /// to act on it.
    pub fn plan(memories: &[Memory], policy: &PrunePolicy, now: DateTime<Utc>, dry_run: bool) -> PruneReport {
        let mut deleted: std::collections::HashSet<String> = std::collections::HashSet::new();

        for m in memories {
            let age_days = (now - m.timestamp).num_seconds() as f64 / 86400.0;
            if age_days > policy.old_threshold_days && m.importance < policy.low_importance_threshold {
                deleted.insert(m.id.clone());
            }
        }

        let survivors: Vec<&Memory> = memories.iter().filter(|m| !deleted.contains(&m.id)).collect();
        for i in 0..survivors.len() {
            if deleted.contains(&survivors[i].id) {
                continue;
            }
            let (Some(vec_i), ..) = (survivors[i].embedding.as_ref(),) else {
                continue;
            };
            for j in (i + 1)..survivors.len() {
                if deleted.contains(&survivors[j].id) {
                    continue;
                }
                let Some(vec_j) = survivors[j].embedding.as_ref() else {
                    continue;
                };
                let sim = cosine_similarity(vec_i, vec_j);
                if sim > policy.redundancy_threshold {
                    let loser = pick_redundancy_loser(survivors[i], survivors[j]);
                    deleted.insert(loser.id.clone());
                }
            }
        }

        let survivors: Vec<&Memory> = memories.iter().filter(|m| !deleted.contains(&m.id)).collect();
        let mut by_session: HashMap<&str, Vec<&Memory>> = HashMap::new();
        for m in &survivors {
            by_session.entry(m.session_id.as_str()).or_default().push(m);
        }
        for (_session, mut session_memories) in by_session {
            if session_memories.len() <= policy.max_per_session {
                continue;
            }
            session_memories.sort_by(|a, b| {
                a.importance
                    .partial_cmp(&b.importance)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            let excess = session_memories.len() - policy.max_per_session;
            for m in session_memories.into_iter().take(excess) {
                deleted.insert(m.id.clone());
            }
        }

        PruneReport {
            deleted_ids: deleted.into_iter().collect(),
            dry_run,
        }
    }
}

/// Pick which of a redundant pair to delete: lower importance loses; ties
/// broken by recency (the older one loses).
fn pick_redundancy_loser<'a>(a: &'a Memory, b: &'a Memory) -> &'a Memory {
    if (a.importance - b.importance).abs() < f64::EPSILON {
        if a.timestamp <= b.timestamp {
            a
        } else {
            b
        }
    } else if a.importance < b.importance {
        a
    } else {
        b
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{Artifacts, Flags};
    use chrono::Duration as ChronoDuration;

    fn memory(id: &str, session: &str, importance: f64, age_days: i64, embedding: Option<Vec<f32>>) -> Memory {
        Memory {
            id: id.to_string(),
            session_id: session.to_string(),
            timestamp: Utc::now() - ChronoDuration::days(age_days),
            chunk_index: 0,
            intent: "intent".to_string(),
            action: "action".to_string(),
            outcome: "outcome".to_string(),
            importance,
            artifacts: Artifacts::default(),
            flags: Flags::default(),
            embedding,
            embedded_text: "Session x".to_string(),
        }
    }

    #[test]
    fn age_and_importance_rule_deletes_old_low_importance() {
        let memories = vec![memory("m1", "s1", 1.0, 100, None)];
        let report = Pruner::plan(&memories, &PrunePolicy::default(), Utc::now(), false);
        assert_eq!(report.deleted_ids, vec!["m1".to_string()]);
    }

    #[test]
    fn age_rule_spares_important_old_memories() {
        let memories = vec![memory("m1", "s1", 10.0, 100, None)];
        let report = Pruner::plan(&memories, &PrunePolicy::default(), Utc::now(), false);
        assert!(report.deleted_ids.is_empty());
    }

    #[test]
    fn s4_redundancy_keeps_higher_importance() {
        let v = vec![1.0_f32; 256];
        let m1 = memory("m1", "s1", 5.0, 0, Some(v.clone()));
        let m2 = memory("m2", "s1", 8.0, 0, Some(v));
        let report = Pruner::plan(&[m1, m2], &PrunePolicy::default(), Utc::now(), false);
        assert_eq!(report.deleted_ids, vec!["m1".to_string()]);
    }

    #[test]
    fn capacity_rule_trims_to_max_per_session() {
        let memories: Vec<Memory> = (0..5)
            .map(|i| memory(&format!("m{i}"), "s1", i as f64, 0, None))
            .collect();
        let policy = PrunePolicy {
            max_per_session: 3,
            ..PrunePolicy::default()
        };
        let report = Pruner::plan(&memories, &policy, Utc::now(), false);
        assert_eq!(report.deleted_ids.len(), 2);
        assert!(report.deleted_ids.contains(&"m0".to_string()));
        assert!(report.deleted_ids.contains(&"m1".to_string()));
    }

    #[test]
    fn pruning_is_monotonic_non_increasing() {
        let memories: Vec<Memory> = (0..5)
            .map(|i| memory(&format!("m{i}"), "s1", i as f64, 0, None))
            .collect();
        let report = Pruner::plan(&memories, &PrunePolicy::default(), Utc::now(), false);
        assert!(report.deleted_ids.len() <= memories.len());
    }

    #[test]
    fn dry_run_flag_is_preserved_without_changing_plan() {
        let memories = vec![memory("m1", "s1", 1.0, 100, None)];
        let report = Pruner::plan(&memories, &PrunePolicy::default(), Utc::now(), true);
        assert!(report.dry_run);
        assert_eq!(report.deleted_ids, vec!["m1".to_string()]);
    }
}
