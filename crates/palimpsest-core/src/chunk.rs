//! Chunker (C4): transcript messages → Intent/Action/Outcome triples.
//!
//! See spec.md §4.1. The algorithm walks messages in order, starting a
//! candidate chunk at each user turn and folding the assistant's reply plus
//! any tool activity into the action, until the next user turn. Within one
//! user turn's action span, a natural-boundary pass (step 4) may further
//! split the span into several chunks sharing the same intent, with a
//! grouping cap (step 5) keeping a burst of related file writes together.

use std::sync::OnceLock;

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use thiserror::Error;

use crate::memory::{ACTION_CAP, INTENT_CAP, OUTCOME_CAP};
use crate::transcript::{TranscriptMessage, TranscriptRole};

/// Errors the chunker can surface. Per spec.md §4.1 the contract never
/// fails on arbitrary input — this exists only for pathologically large
/// transcripts the caller asked to bound elsewhere.
#[derive(Debug, Error)]
pub enum ChunkerError {
    #[error("transcript has {0} messages, exceeding the configured maximum")]
    TooManyMessages(usize),
}

/// One Intent/Action/Outcome triple, ready for scoring and extraction.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub chunk_index: i64,
    pub timestamp: DateTime<Utc>,
    pub intent: String,
    pub action: String,
    pub outcome: String,
    /// Untruncated action text, used to build `embedded_text` (spec.md §4.1
    /// step 6: "`embedded_text` uses the full action before truncation").
    pub raw_action: String,
    /// Count of tool invocations folded into this chunk's action span, fed
    /// to the `tool_usage_intensity` scorer signal.
    pub tool_call_count: u32,
    /// Aggregated tool-result success flag for this chunk's action span
    /// (spec.md §4.1 step 3's "tool result success flags" signal). `None`
    /// when no folded message carried a tool result at all; `Some(false)`
    /// if any tool call in the span failed, else `Some(true)`.
    pub tool_result_success: Option<bool>,
}

fn outcome_marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(done|fixed|tests? pass(?:ed|ing)?|all green|error|failed|resolved|works now)\b[^.\n]*[.\n]?",
        )
        .unwrap()
    })
}

fn decision_marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(decided to|chose|will use|going with)\b").unwrap())
}

fn file_mention_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b[\w./-]+\.[A-Za-z]{1,6}\b").unwrap())
}

/// Beyond this gap between consecutive tool calls, assume a topic shift
/// (spec.md §4.1 step 4's "long gap in tool-call locality").
fn tool_gap_threshold() -> Duration {
    Duration::minutes(5)
}

/// Grouping cap (spec.md §4.1 step 5): up to this many consecutive
/// file-write operations stay folded into one chunk before overflowing
/// into a new one.
const FILE_OP_GROUP_CAP: u32 = 5;

/// Extract the trailing sentence(s) describing success/completion/failure
/// from an action span (spec.md §4.1 step 3).
fn extract_outcome(action: &str) -> String {
    let mut matches: Vec<&str> = Vec::new();
    for m in outcome_marker_re().find_iter(action) {
        matches.push(m.as_str().trim());
    }
    matches.join(" ")
}

fn truncate(text: &str, cap: usize) -> String {
    crate::memory::Memory::truncate_with_marker(text, cap)
}

/// Content hash used for adjacent-duplicate detection (spec.md §4.1 step 7).
fn dedup_key(intent: &str, action: &str) -> (String, String) {
    (intent.to_string(), action.to_string())
}

/// Split a transcript into Intent/Action/Outcome chunks.
///
/// Empty input yields empty output. Every emitted chunk has a non-empty
/// `intent`. If the transcript has no user turn at all, the whole
/// transcript is treated as one action span (itself subject to the
/// natural-boundary override) under an intent inferred from the first
/// message, so the "intent always non-empty" contract holds.
pub fn chunk_transcript(messages: &[TranscriptMessage]) -> Vec<Chunk> {
    if messages.is_empty() {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut chunk_index: i64 = 0;
    let mut last_key: Option<(String, String)> = None;
    let default_ts = Utc::now();

    // No user turn anywhere: treat the whole transcript as one action span
    // under an inferred intent, so `intent` is never empty.
    if !messages.iter().any(|m| m.is_user()) {
        let intent = messages
            .first()
            .map(|m| {
                if m.content.trim().is_empty() {
                    "(no user turn present in transcript)".to_string()
                } else {
                    truncate(&m.content, INTENT_CAP)
                }
            })
            .unwrap_or_else(|| "(no user turn present in transcript)".to_string());
        let ts = messages.first().and_then(|m| m.timestamp).unwrap_or(default_ts);
        let span = &messages[1.min(messages.len())..];

        for (seg_start, seg_end) in natural_boundaries(span) {
            let (action_raw, tool_calls, tool_result_success) = fold_action(&span[seg_start..seg_end]);
            let outcome = extract_outcome(&action_raw);
            let key = dedup_key(&intent, &action_raw);
            if last_key.as_ref() == Some(&key) {
                last_key = Some(key);
                continue;
            }
            chunks.push(Chunk {
                chunk_index,
                timestamp: ts,
                intent: intent.clone(),
                action: truncate(&action_raw, ACTION_CAP),
                outcome: truncate(&outcome, OUTCOME_CAP),
                raw_action: action_raw,
                tool_call_count: tool_calls,
                tool_result_success,
            });
            chunk_index += 1;
            last_key = Some(key);
        }
        return chunks;
    }

    let mut i = 0;
    while i < messages.len() {
        if !messages[i].is_user() {
            i += 1;
            continue;
        }

        let intent_raw = messages[i].content.clone();
        let intent = truncate(&intent_raw, INTENT_CAP);
        let ts = messages[i].timestamp.unwrap_or(default_ts);
        let start = i + 1;
        let mut end = start;
        while end < messages.len() && !messages[end].is_user() {
            end += 1;
        }

        let span = &messages[start..end];
        for (seg_start, seg_end) in natural_boundaries(span) {
            let (action_raw, tool_calls, tool_result_success) = fold_action(&span[seg_start..seg_end]);
            let outcome_raw = extract_outcome(&action_raw);
            let action = truncate(&action_raw, ACTION_CAP);
            let outcome = truncate(&outcome_raw, OUTCOME_CAP);

            let key = dedup_key(&intent, &action);
            if last_key.as_ref() != Some(&key) {
                chunks.push(Chunk {
                    chunk_index,
                    timestamp: ts,
                    intent: intent.clone(),
                    action,
                    outcome,
                    raw_action: action_raw,
                    tool_call_count: tool_calls,
                    tool_result_success,
                });
                chunk_index += 1;
            }
            last_key = Some(key);
        }

        i = end;
    }

    chunks
}

/// Partition one action span into natural-boundary segments (spec.md §4.1
/// steps 4-5): a repeated decision marker, a fresh run of file-write
/// operations following unrelated content, or a long gap between tool
/// calls each start a new segment. A single unbroken run of file-write
/// operations is grouped into one segment up to [`FILE_OP_GROUP_CAP`]
/// before it overflows into the next.
///
/// Returns `(start, end)` index ranges into `span`, always covering the
/// whole span and always yielding at least one range (possibly `(0, 0)`
/// for an empty span).
fn natural_boundaries(span: &[TranscriptMessage]) -> Vec<(usize, usize)> {
    let mut boundaries = Vec::new();
    let mut seg_start = 0usize;

    let mut run_length: u32 = 0;
    let mut file_op_seen_in_segment = false;
    let mut was_file_op_prev = false;
    let mut seen_decision = false;
    let mut last_tool_ts: Option<DateTime<Utc>> = None;

    for (i, msg) in span.iter().enumerate() {
        let is_tool = matches!(msg.role, TranscriptRole::Tool) || msg.tool_name.is_some();
        let is_file_op = is_tool && file_mention_re().is_match(&msg.content);
        let has_decision = decision_marker_re().is_match(&msg.content);

        let mut split_before = false;
        if i > seg_start {
            if has_decision && seen_decision {
                split_before = true;
            } else if is_file_op && !was_file_op_prev && file_op_seen_in_segment {
                split_before = true;
            } else if is_file_op && was_file_op_prev && run_length >= FILE_OP_GROUP_CAP {
                split_before = true;
            }
            if !split_before && is_tool {
                if let (Some(ts), Some(last)) = (msg.timestamp, last_tool_ts) {
                    if ts.signed_duration_since(last) > tool_gap_threshold() {
                        split_before = true;
                    }
                }
            }
        }

        if split_before {
            boundaries.push((seg_start, i));
            seg_start = i;
            run_length = 0;
            file_op_seen_in_segment = false;
            was_file_op_prev = false;
            seen_decision = false;
        }

        if is_file_op {
            run_length = if was_file_op_prev { run_length + 1 } else { 1 };
            was_file_op_prev = true;
            file_op_seen_in_segment = true;
        } else {
            run_length = 0;
            was_file_op_prev = false;
        }
        if has_decision {
            seen_decision = true;
        }
        if is_tool {
            if let Some(ts) = msg.timestamp {
                last_tool_ts = Some(ts);
            }
        }
    }

    boundaries.push((seg_start, span.len()));
    boundaries
}

/// Fold a span of non-user messages into one action string, counting tool
/// invocations and aggregating their success flags along the way.
fn fold_action(span: &[TranscriptMessage]) -> (String, u32, Option<bool>) {
    let mut parts = Vec::new();
    let mut tool_calls = 0u32;
    let mut any_success = false;
    let mut any_failure = false;
    let mut any_signal = false;

    for msg in span {
        if !msg.content.trim().is_empty() {
            parts.push(msg.content.clone());
        }
        if matches!(msg.role, TranscriptRole::Tool) || msg.tool_name.is_some() {
            tool_calls += 1;
        }
        if let Some(ok) = msg.tool_result_succeeded() {
            any_signal = true;
            if ok {
                any_success = true;
            } else {
                any_failure = true;
            }
        }
    }

    let tool_result_success = if !any_signal {
        None
    } else if any_failure {
        Some(false)
    } else {
        Some(any_success)
    };

    (parts.join("\n"), tool_calls, tool_result_success)
}

/// Enforce the `max_transcript_messages` bound from spec.md §4.11: on
/// overflow, keep the most recent window rather than erroring.
pub fn bound_transcript(
    messages: Vec<TranscriptMessage>,
    max_transcript_messages: usize,
) -> Vec<TranscriptMessage> {
    if messages.len() <= max_transcript_messages {
        return messages;
    }
    let skip = messages.len() - max_transcript_messages;
    messages.into_iter().skip(skip).collect()
}
