//! Knowledge Graph (C7): spec.md §4.6.
//!
//! Nodes are entities; edges are weighted undirected co-mention relations.
//! The graph is derived state — always reconstructible from a scan of
//! memories (testable property 9) — with a TTL'd cache layered on top by
//! the storage layer (§6.3 `kg_cache/`).

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::entities::Entity;

const PAGERANK_DAMPING: f64 = 0.85;
const PAGERANK_TOLERANCE: f64 = 1e-6;
const PAGERANK_MAX_ITER: usize = 100;

/// Default TTL for the graph cache (spec.md §4.6).
pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("pagerank failed to converge after {0} iterations")]
    ConvergenceFailure(usize),
}

/// Per-node centrality scores, recomputed (or invalidated) on every graph
/// rebuild — they carry no standalone identity (spec.md §3).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Centrality {
    pub pagerank: f64,
    pub betweenness: f64,
    pub degree: f64,
}

/// An undirected, weighted co-mention graph over entities.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeGraph {
    nodes: HashMap<String, Entity>,
    adjacency: HashMap<String, HashMap<String, f64>>,
    centrality: HashMap<String, Centrality>,
}

impl KnowledgeGraph {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.adjacency.values().map(|m| m.len()).sum::<usize>() / 2
    }

    pub fn contains(&self, entity_id: &str) -> bool {
        self.nodes.contains_key(entity_id)
    }

    pub fn entity(&self, entity_id: &str) -> Option<&Entity> {
        self.nodes.get(entity_id)
    }

    pub fn centrality(&self, entity_id: &str) -> Option<Centrality> {
        self.centrality.get(entity_id).copied()
    }

    pub fn entity_ids(&self) -> impl Iterator<Item = &String> {
        self.nodes.keys()
    }

    /// Build from a scan of `(memory_id, entities)` pairs — one call per
    /// memory, covering every entity that memory references. One edge is
    /// emitted per unordered entity pair co-occurring in a memory;
    /// multiplicity adds to weight across memories (spec.md §4.6 "Build").
    pub fn build<'a>(memory_entities: impl IntoIterator<Item = (&'a str, &'a [Entity])>) -> Self {
        let mut nodes: HashMap<String, Entity> = HashMap::new();
        let mut adjacency: HashMap<String, HashMap<String, f64>> = HashMap::new();

        for (_memory_id, entities) in memory_entities {
            let mut seen_ids = HashSet::new();
            let mut unique = Vec::new();
            for e in entities {
                let id = e.id();
                if seen_ids.insert(id.clone()) {
                    nodes.entry(id.clone()).or_insert_with(|| e.clone());
                    unique.push(id);
                }
            }
            for i in 0..unique.len() {
                adjacency.entry(unique[i].clone()).or_default();
                for j in (i + 1)..unique.len() {
                    *adjacency
                        .entry(unique[i].clone())
                        .or_default()
                        .entry(unique[j].clone())
                        .or_insert(0.0) += 1.0;
                    *adjacency
                        .entry(unique[j].clone())
                        .or_default()
                        .entry(unique[i].clone())
                        .or_insert(0.0) += 1.0;
                }
            }
        }

        let mut graph = KnowledgeGraph {
            nodes,
            adjacency,
            centrality: HashMap::new(),
        };
        graph.recompute_centrality();
        graph
    }

    /// Recompute all centrality scores. On PageRank non-convergence,
    /// downgrades to degree-only centrality and warns (spec.md §7's graph
    /// error policy) rather than failing the build.
    pub fn recompute_centrality(&mut self) {
        let degree = self.degree_centrality();

        match self.pagerank() {
            Ok(pagerank) => {
                let betweenness = self.betweenness_centrality();
                self.centrality = self
                    .nodes
                    .keys()
                    .map(|id| {
                        (
                            id.clone(),
                            Centrality {
                                pagerank: pagerank.get(id).copied().unwrap_or(0.0),
                                betweenness: betweenness.get(id).copied().unwrap_or(0.0),
                                degree: degree.get(id).copied().unwrap_or(0.0),
                            },
                        )
                    })
                    .collect();
            }
            Err(err) => {
                tracing::warn!(error = %err, "pagerank failed to converge, downgrading to degree centrality");
                self.centrality = self
                    .nodes
                    .keys()
                    .map(|id| {
                        (
                            id.clone(),
                            Centrality {
                                pagerank: 0.0,
                                betweenness: 0.0,
                                degree: degree.get(id).copied().unwrap_or(0.0),
                            },
                        )
                    })
                    .collect();
            }
        }
    }

    fn degree_centrality(&self) -> HashMap<String, f64> {
        self.adjacency
            .iter()
            .map(|(id, neighbors)| (id.clone(), neighbors.values().sum()))
            .collect()
    }

    /// Power-iteration PageRank, damping 0.85, tolerance 1e-6, capped at 100
    /// iterations (spec.md §4.6). Disconnected components fall out of
    /// teleportation naturally.
    fn pagerank(&self) -> Result<HashMap<String, f64>, GraphError> {
        let n = self.nodes.len();
        if n == 0 {
            return Ok(HashMap::new());
        }

        let ids: Vec<&String> = self.nodes.keys().collect();
        let index: HashMap<&String, usize> = ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();

        let out_weight: Vec<f64> = ids
            .iter()
            .map(|id| self.adjacency.get(*id).map(|m| m.values().sum()).unwrap_or(0.0))
            .collect();

        let mut rank = vec![1.0 / n as f64; n];

        for iter in 0..PAGERANK_MAX_ITER {
            let mut next = vec![(1.0 - PAGERANK_DAMPING) / n as f64; n];

            let dangling_mass: f64 = (0..n).filter(|&i| out_weight[i] == 0.0).map(|i| rank[i]).sum();
            let dangling_share = PAGERANK_DAMPING * dangling_mass / n as f64;
            for v in next.iter_mut() {
                *v += dangling_share;
            }

            for (i, id) in ids.iter().enumerate() {
                if out_weight[i] == 0.0 {
                    continue;
                }
                if let Some(neighbors) = self.adjacency.get(*id) {
                    for (neighbor, weight) in neighbors {
                        if let Some(&j) = index.get(neighbor) {
                            next[j] += PAGERANK_DAMPING * rank[i] * (weight / out_weight[i]);
                        }
                    }
                }
            }

            let delta: f64 = next.iter().zip(rank.iter()).map(|(a, b)| (a - b).abs()).sum();
            rank = next;
            if delta < PAGERANK_TOLERANCE {
                return Ok(ids.into_iter().cloned().zip(rank).collect());
            }
            if iter == PAGERANK_MAX_ITER - 1 {
                return Err(GraphError::ConvergenceFailure(PAGERANK_MAX_ITER));
            }
        }

        Ok(ids.into_iter().cloned().zip(rank).collect())
    }

    /// Brandes' algorithm, unweighted shortest paths (edge presence only —
    /// spec.md does not specify weighted betweenness, only that it exists
    /// as an auxiliary ranking).
    fn betweenness_centrality(&self) -> HashMap<String, f64> {
        let ids: Vec<String> = self.nodes.keys().cloned().collect();
        let mut betweenness: HashMap<String, f64> = ids.iter().map(|id| (id.clone(), 0.0)).collect();

        for s in &ids {
            let mut stack = Vec::new();
            let mut predecessors: HashMap<&String, Vec<&String>> = HashMap::new();
            let mut sigma: HashMap<&String, f64> = ids.iter().map(|id| (id, 0.0)).collect();
            let mut dist: HashMap<&String, i64> = ids.iter().map(|id| (id, -1)).collect();
            sigma.insert(s, 1.0);
            dist.insert(s, 0);

            let mut queue = VecDeque::new();
            queue.push_back(s);

            while let Some(v) = queue.pop_front() {
                stack.push(v);
                if let Some(neighbors) = self.adjacency.get(v) {
                    for w in neighbors.keys() {
                        if dist[w] < 0 {
                            dist.insert(w, dist[v] + 1);
                            queue.push_back(w);
                        }
                        if dist[w] == dist[v] + 1 {
                            *sigma.get_mut(w).unwrap() += sigma[v];
                            predecessors.entry(w).or_default().push(v);
                        }
                    }
                }
            }

            let mut delta: HashMap<&String, f64> = ids.iter().map(|id| (id, 0.0)).collect();
            while let Some(w) = stack.pop() {
                if let Some(preds) = predecessors.get(w) {
                    for v in preds {
                        *delta.get_mut(v).unwrap() += (sigma[v] / sigma[w]) * (1.0 + delta[w]);
                    }
                }
                if w != s {
                    *betweenness.get_mut(w).unwrap() += delta[w];
                }
            }
        }

        // Undirected graph: each shortest path counted from both endpoints.
        for value in betweenness.values_mut() {
            *value /= 2.0;
        }
        betweenness
    }

    /// Entities within `hops` of `entity_id`, with attenuation 1.0 / 0.5 /
    /// 0.25 for 0/1/2-hop distance (spec.md §4.6). Caps at 2 hops.
    pub fn neighbors(&self, entity_id: &str, hops: u8) -> Vec<(String, f64)> {
        let hops = hops.min(2);
        if !self.nodes.contains_key(entity_id) {
            return Vec::new();
        }

        let mut visited: HashMap<String, u8> = HashMap::new();
        visited.insert(entity_id.to_string(), 0);
        let mut queue = VecDeque::new();
        queue.push_back((entity_id.to_string(), 0u8));

        while let Some((current, depth)) = queue.pop_front() {
            if depth >= hops {
                continue;
            }
            if let Some(neighbors) = self.adjacency.get(&current) {
                for neighbor in neighbors.keys() {
                    if !visited.contains_key(neighbor) {
                        visited.insert(neighbor.clone(), depth + 1);
                        queue.push_back((neighbor.clone(), depth + 1));
                    }
                }
            }
        }

        visited
            .into_iter()
            .map(|(id, depth)| (id, attenuation(depth)))
            .collect()
    }
}

/// k-hop attenuation schedule from spec.md §4.6/§4.7/GLOSSARY.
pub fn attenuation(hops: u8) -> f64 {
    match hops {
        0 => 1.0,
        1 => 0.5,
        2 => 0.25,
        _ => 0.0,
    }
}

/// TTL-gated cache around a [`KnowledgeGraph`]. Readers observe either the
/// pre- or post-rebuild graph, never a partial one (spec.md §4.6, §5): the
/// swap is a single field assignment behind `&mut self`.
pub struct GraphCache {
    graph: KnowledgeGraph,
    built_at: Instant,
    ttl: Duration,
}

impl GraphCache {
    pub fn new(graph: KnowledgeGraph, ttl: Duration) -> Self {
        Self {
            graph,
            built_at: Instant::now(),
            ttl,
        }
    }

    pub fn with_default_ttl(graph: KnowledgeGraph) -> Self {
        Self::new(graph, Duration::from_secs(DEFAULT_CACHE_TTL_SECS))
    }

    pub fn is_stale(&self) -> bool {
        self.built_at.elapsed() >= self.ttl
    }

    pub fn get(&self) -> &KnowledgeGraph {
        &self.graph
    }

    /// Replace the cached graph with a freshly rebuilt one, resetting the
    /// TTL clock.
    pub fn refresh(&mut self, graph: KnowledgeGraph) {
        self.graph = graph;
        self.built_at = Instant::now();
    }
}
