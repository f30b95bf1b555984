//! PreCompact orchestration (C11): spec.md §4.11.
//!
//! Transcript → bounded window → chunks → per-chunk artifacts/score/entities
//! → contextual-prefix embedding → store → prune sweep → cluster summary.
//! Re-running on the same transcript is safe: duplicate content-addressed
//! ids are skipped rather than erroring, so a host that retries a failed
//! PreCompact hook doesn't double-ingest.
//!
//! Every chunk in one invocation is embedded before any of them are
//! written, and the whole batch lands in a single store transaction
//! (spec.md §5/§7): a persistent embedder failure partway through aborts
//! before the transaction opens, and any store-level failure mid-batch
//! rolls the transaction back, so the store never ends up holding only
//! some of a batch.

use crate::artifacts;
use crate::chunk::{bound_transcript, chunk_transcript};
use crate::config::Config;
use crate::entities;
use crate::memory::{Flags, Memory};
use crate::pruner::{PruneReport, Pruner};
use crate::score::score_chunk_with_weights;
use crate::storage::{MemoryFilter, Storage};

use super::PipelineError;

/// Default bound on transcript length before chunking (spec.md §4.11).
pub const DEFAULT_MAX_TRANSCRIPT_MESSAGES: usize = 1000;

/// Input to one PreCompact run.
#[derive(Debug, Clone)]
pub struct PreCompactRequest {
    pub session_id: String,
    /// Raw line-delimited JSON transcript (spec.md §6.2).
    pub transcript_jsonl: String,
    pub max_transcript_messages: usize,
}

impl PreCompactRequest {
    pub fn new(session_id: impl Into<String>, transcript_jsonl: impl Into<String>) -> Self {
        PreCompactRequest {
            session_id: session_id.into(),
            transcript_jsonl: transcript_jsonl.into(),
            max_transcript_messages: DEFAULT_MAX_TRANSCRIPT_MESSAGES,
        }
    }
}

/// Outcome of one PreCompact run.
#[derive(Debug, Clone, Default)]
pub struct PreCompactReport {
    pub chunks_seen: usize,
    pub memories_stored: usize,
    pub duplicates_skipped: usize,
    pub clusters_formed: usize,
    pub pruned: Option<PruneReport>,
}

/// Success/failure determination for a chunk (spec.md §4.1 step 3's dual
/// signal): surface markers in the outcome text, corroborated or
/// overridden by the chunk's aggregated tool-result success flag. A tool
/// failure always wins over an optimistic surface marker; a tool success
/// still requires the absence of a failure marker in the text.
fn outcome_indicates_success(outcome: &str, tool_result_success: Option<bool>) -> bool {
    let lower = outcome.to_lowercase();
    let failed = ["error", "failed", "failure", "exception"];
    let succeeded = ["pass", "fixed", "resolved", "works now", "done", "all green"];
    let surface_failed = failed.iter().any(|f| lower.contains(f));
    let surface_succeeded = succeeded.iter().any(|s| lower.contains(s));

    match tool_result_success {
        Some(false) => false,
        Some(true) => !surface_failed,
        None => !surface_failed && surface_succeeded,
    }
}

#[cfg(feature = "embeddings")]
pub fn run(storage: &Storage, request: &PreCompactRequest, config: &Config) -> Result<PreCompactReport, PipelineError> {
    use crate::embeddings::{build_contextual_prefix, Embedder};

    let messages = crate::transcript::parse_jsonl(&request.transcript_jsonl);
    let bounded = bound_transcript(messages, request.max_transcript_messages);
    let chunks = chunk_transcript(&bounded);

    let weights = config
        .scorer
        .as_ref()
        .map(|c| c.apply(crate::score::ScorerWeights::default()))
        .unwrap_or_default();

    let embedder = Embedder::new();
    let mut report = PreCompactReport {
        chunks_seen: chunks.len(),
        ..Default::default()
    };

    // Build every chunk's Memory and embed it before touching the store
    // (spec.md §5/§7: "on persistent failure, abort the batch... Store
    // must be untouched"). A persistent embedder failure on chunk N must
    // not leave chunks 1..N-1 already committed, so nothing is written
    // until the whole batch is prepared.
    let mut prepared = Vec::with_capacity(chunks.len());
    for chunk in &chunks {
        let combined = format!("{}\n{}\n{}", chunk.intent, chunk.raw_action, chunk.outcome);
        let chunk_artifacts = artifacts::extract(&combined);
        let chunk_entities = entities::extract(&combined, &chunk_artifacts);

        let importance = score_chunk_with_weights(
            &chunk.intent,
            &chunk.action,
            &chunk.outcome,
            &chunk_artifacts,
            chunk.tool_call_count,
            0.0,
            &weights,
        );

        let flags = Flags {
            has_code: !chunk_artifacts.code_snippets.is_empty(),
            has_files: !chunk_artifacts.files.is_empty(),
            has_architecture: !chunk_artifacts.architecture.is_empty(),
            success: outcome_indicates_success(&chunk.outcome, chunk.tool_result_success),
        };

        let embedded_text = build_contextual_prefix(
            &request.session_id,
            chunk.timestamp,
            &chunk_artifacts.files,
            &chunk.intent,
            &chunk.raw_action,
            &chunk.outcome,
        );

        let embedding = embedder
            .embed(&embedded_text)
            .or_else(|_| embedder.embed(&embedded_text))?;

        let memory = Memory {
            id: Memory::compute_id(&request.session_id, chunk.chunk_index, &chunk.intent),
            session_id: request.session_id.clone(),
            timestamp: chunk.timestamp,
            chunk_index: chunk.chunk_index,
            intent: chunk.intent.clone(),
            action: chunk.action.clone(),
            outcome: chunk.outcome.clone(),
            importance,
            artifacts: chunk_artifacts,
            flags,
            embedding: Some(embedding.vector),
            embedded_text,
        };

        let entity_links: Vec<(crate::entities::Entity, u32)> =
            chunk_entities.into_iter().map(|e| (e, 1u32)).collect();

        prepared.push((memory, entity_links));
    }

    // One transaction for the whole batch: either every new memory in this
    // PreCompact invocation lands, or (on a non-duplicate failure) none do.
    let batch = storage.put_batch(&prepared)?;
    report.memories_stored = batch.stored;
    report.duplicates_skipped = batch.duplicates;

    let policy = config
        .pruner
        .as_ref()
        .map(|c| c.apply(crate::pruner::PrunePolicy::default()))
        .unwrap_or_default();
    let all_memories = storage.scan(&MemoryFilter::default())?;
    let prune_report = Pruner::plan(&all_memories, &policy, chrono::Utc::now(), false);
    if !prune_report.deleted_ids.is_empty() {
        storage.delete(&prune_report.deleted_ids)?;
    }
    report.pruned = Some(prune_report);

    let session_filter = MemoryFilter {
        session_id: Some(request.session_id.clone()),
        ..Default::default()
    };
    let session_memories = storage.scan(&session_filter)?;
    report.clusters_formed =
        crate::clusterer::cluster_session(&session_memories, crate::clusterer::DEFAULT_DISTANCE_THRESHOLD).len();

    Ok(report)
}

#[cfg(not(feature = "embeddings"))]
pub fn run(_storage: &Storage, _request: &PreCompactRequest, _config: &Config) -> Result<PreCompactReport, PipelineError> {
    Err(PipelineError::FeatureDisabled("embeddings"))
}

#[cfg(all(test, feature = "embeddings"))]
mod tests {
    use super::*;

    #[test]
    fn outcome_success_heuristic_requires_positive_marker_without_failure() {
        assert!(outcome_indicates_success("all tests pass", None));
        assert!(!outcome_indicates_success("tests failed with an error", None));
        assert!(!outcome_indicates_success("", None));
    }

    #[test]
    fn a_failing_tool_result_overrides_an_optimistic_surface_marker() {
        assert!(!outcome_indicates_success("looks done", Some(false)));
    }

    #[test]
    fn a_successful_tool_result_is_not_enough_with_a_failure_marker_present() {
        assert!(!outcome_indicates_success("error, but it seems fixed now", Some(true)));
    }

    #[test]
    fn a_successful_tool_result_confirms_an_otherwise_silent_outcome() {
        assert!(outcome_indicates_success("wrapped up the change", Some(true)));
    }
}
