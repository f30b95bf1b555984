//! Task-Context Scorer (C8): spec.md §4.7.
//!
//! Re-ranks a candidate memory against the current query's entities using
//! graph proximity. Never mutates `base_importance` in the store — this
//! produces a transient, query-conditional `task_importance`.

use std::collections::HashMap;

use crate::graph::{attenuation, KnowledgeGraph};

const FREQ_CAP: f64 = 3.0;
const TASK_BOOST_MIN: f64 = 0.0;
const TASK_BOOST_MAX: f64 = 2.0;

/// `relevance(e, Q)` = max over q ∈ Q of the graph-hop attenuation:
/// exact match → 1.0, 1-hop → 0.5, 2-hop → 0.25, else 0.
pub fn relevance(entity_id: &str, query_entity_ids: &[String], graph: &KnowledgeGraph) -> f64 {
    if query_entity_ids.iter().any(|q| q == entity_id) {
        return attenuation(0);
    }

    query_entity_ids
        .iter()
        .map(|q| {
            graph
                .neighbors(q, 2)
                .into_iter()
                .find(|(id, _)| id == entity_id)
                .map(|(_, att)| att)
                .unwrap_or(0.0)
        })
        .fold(0.0, f64::max)
}

/// `task_importance = base_importance · (1 + task_boost)`, where
/// `task_boost = Σ relevance(e, Q) · min(freq(e, memory), 3)`, clipped to
/// `[0, 2]` so `task_importance ≤ 3 · base_importance`.
///
/// `memory_entity_freq` maps each entity referenced by the candidate
/// memory to its mention count within that memory.
pub fn task_importance(
    base_importance: f64,
    memory_entity_freq: &HashMap<String, u32>,
    query_entity_ids: &[String],
    graph: &KnowledgeGraph,
) -> f64 {
    if query_entity_ids.is_empty() || memory_entity_freq.is_empty() {
        return base_importance;
    }

    let mut task_boost = 0.0;
    for (entity_id, freq) in memory_entity_freq {
        let rel = relevance(entity_id, query_entity_ids, graph);
        if rel > 0.0 {
            task_boost += rel * (*freq as f64).min(FREQ_CAP);
        }
    }

    let task_boost = task_boost.clamp(TASK_BOOST_MIN, TASK_BOOST_MAX);
    base_importance * (1.0 + task_boost)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Entity, EntityType};

    #[test]
    fn zero_query_entities_leaves_importance_unchanged() {
        let graph = KnowledgeGraph::empty();
        let freq = HashMap::from([("FILE:auth.py".to_string(), 1)]);
        assert_eq!(task_importance(10.0, &freq, &[], &graph), 10.0);
    }

    #[test]
    fn s2_scenario_exact_match_boosts_importance() {
        let auth = Entity::new(EntityType::File, "auth.py");
        let entities = vec![auth.clone()];
        let graph = KnowledgeGraph::build(vec![("m1", entities.as_slice())]);

        let freq = HashMap::from([(auth.id(), 1u32)]);
        let query_entities = vec![auth.id()];

        let importance = task_importance(10.0, &freq, &query_entities, &graph);
        assert!(importance > 10.0);
    }

    #[test]
    fn task_boost_clips_to_three_x_base() {
        let auth = Entity::new(EntityType::File, "auth.py");
        let entities = vec![auth.clone()];
        let graph = KnowledgeGraph::build(vec![("m1", entities.as_slice())]);

        // Exaggerated frequency to try to exceed the clip.
        let freq = HashMap::from([(auth.id(), 100u32)]);
        let query_entities = vec![auth.id()];

        let importance = task_importance(5.0, &freq, &query_entities, &graph);
        assert!(importance <= 3.0 * 5.0 + 1e-9);
    }

    #[test]
    fn unrelated_entity_gets_no_boost() {
        let auth = Entity::new(EntityType::File, "auth.py");
        let other = Entity::new(EntityType::File, "unrelated.py");
        let entities = vec![auth.clone()];
        let graph = KnowledgeGraph::build(vec![("m1", entities.as_slice())]);

        let freq = HashMap::from([(auth.id(), 1u32)]);
        let query_entities = vec![other.id()];

        assert_eq!(task_importance(10.0, &freq, &query_entities, &graph), 10.0);
    }
}
