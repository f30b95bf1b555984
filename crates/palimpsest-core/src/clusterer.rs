//! Clusterer (C10): spec.md §4.10.
//!
//! Agglomerative clustering (average linkage, cosine distance) over a
//! session's memory embeddings, stopping at a distance threshold. The
//! resulting label is derived data for CLI summaries only — never a
//! retrieval signal (spec.md §4.10).

use crate::embeddings::cosine_similarity;
use crate::memory::Memory;

/// Default agglomeration stopping distance (spec.md §4.10).
pub const DEFAULT_DISTANCE_THRESHOLD: f32 = 0.4;

/// A group of memories considered topically related.
#[derive(Debug, Clone)]
pub struct Cluster {
    pub label: usize,
    pub memory_ids: Vec<String>,
}

fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}

/// Average-linkage distance between two clusters (mean pairwise distance
/// across all member embeddings).
fn average_linkage(a: &[usize], b: &[usize], embeddings: &[&Vec<f32>]) -> f32 {
    let mut total = 0.0_f32;
    let mut count = 0usize;
    for &i in a {
        for &j in b {
            total += cosine_distance(embeddings[i], embeddings[j]);
            count += 1;
        }
    }
    if count == 0 {
        f32::MAX
    } else {
        total / count as f32
    }
}

/// Cluster the embedded memories of one session. Memories without an
/// embedding are skipped (they cannot participate in a distance metric)
/// and are not returned in any cluster.
pub fn cluster_session(memories: &[Memory], distance_threshold: f32) -> Vec<Cluster> {
    let embedded: Vec<(&Memory, &Vec<f32>)> = memories
        .iter()
        .filter_map(|m| m.embedding.as_ref().map(|e| (m, e)))
        .collect();

    if embedded.is_empty() {
        return Vec::new();
    }

    let embeddings: Vec<&Vec<f32>> = embedded.iter().map(|(_, e)| *e).collect();
    let mut clusters: Vec<Vec<usize>> = (0..embedded.len()).map(|i| vec![i]).collect();

    loop {
        if clusters.len() <= 1 {
            break;
        }

        let mut best: Option<(usize, usize, f32)> = None;
        for i in 0..clusters.len() {
            for j in (i + 1)..clusters.len() {
                let dist = average_linkage(&clusters[i], &clusters[j], &embeddings);
                if best.map(|(_, _, d)| dist < d).unwrap_or(true) {
                    best = Some((i, j, dist));
                }
            }
        }

        match best {
            Some((i, j, dist)) if dist <= distance_threshold => {
                let merged = clusters[j].clone();
                clusters[i].extend(merged);
                clusters.remove(j);
            }
            _ => break,
        }
    }

    clusters
        .into_iter()
        .enumerate()
        .map(|(label, indices)| Cluster {
            label,
            memory_ids: indices.into_iter().map(|i| embedded[i].0.id.clone()).collect(),
        })
        .collect()
}
