//! Memory data model
//!
//! A [`Memory`] is the atomic unit persisted by the pipeline: an
//! Intent/Action/Outcome triple produced by the [`crate::chunk`] module,
//! enriched with artifacts, flags, importance, and an embedding.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use content_hash::short_hash;

/// Soft cap on `intent` length before truncation (chars).
pub const INTENT_CAP: usize = 500;
/// Soft cap on `action` length before truncation (chars).
pub const ACTION_CAP: usize = 1000;
/// Soft cap on `outcome` length before truncation (chars).
pub const OUTCOME_CAP: usize = 300;

/// A single code block captured from a transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeSnippet {
    pub language: String,
    pub text: String,
}

/// Structured evidence pulled out of a chunk's intent/action/outcome text.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifacts {
    pub code_snippets: Vec<CodeSnippet>,
    /// Normalized, deduplicated, forward-slash paths.
    pub files: Vec<String>,
    pub commands: Vec<String>,
    pub errors: Vec<String>,
    pub architecture: Vec<String>,
}

impl Artifacts {
    pub fn is_empty(&self) -> bool {
        self.code_snippets.is_empty()
            && self.files.is_empty()
            && self.commands.is_empty()
            && self.errors.is_empty()
            && self.architecture.is_empty()
    }
}

/// Fast-filtering booleans derived from a memory's artifacts and outcome.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Flags {
    pub has_code: bool,
    pub has_files: bool,
    pub has_architecture: bool,
    pub success: bool,
}

/// Importance category boundaries from spec.md §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportanceCategory {
    Low,
    Medium,
    High,
    Critical,
}

impl ImportanceCategory {
    pub fn from_score(importance: f64) -> Self {
        if importance >= 20.0 {
            ImportanceCategory::Critical
        } else if importance >= 10.0 {
            ImportanceCategory::High
        } else if importance >= 5.0 {
            ImportanceCategory::Medium
        } else {
            ImportanceCategory::Low
        }
    }
}

/// The atomic unit of memory (spec.md §3).
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Memory {
    /// Stable, content-addressed id: hash of `(session_id, chunk_index, intent)`.
    pub id: String,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub chunk_index: i64,

    pub intent: String,
    pub action: String,
    pub outcome: String,

    pub importance: f64,

    pub artifacts: Artifacts,
    pub flags: Flags,

    /// Dense embedding vector (dimensionality D, enforced by the store).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// Exact string fed to the embedder (contextual prefix + summary).
    pub embedded_text: String,
}

impl Memory {
    /// Content-addressed id per spec.md §3: stable across re-runs, depends
    /// only on `(session_id, chunk_index, intent)`.
    pub fn compute_id(session_id: &str, chunk_index: i64, intent: &str) -> String {
        let basis = format!("{session_id}\u{1}{chunk_index}\u{1}{intent}");
        short_hash(basis.as_bytes())
    }

    pub fn category(&self) -> ImportanceCategory {
        ImportanceCategory::from_score(self.importance)
    }

    /// Truncate a field to `cap` chars, appending an ellipsis marker when
    /// truncation occurred. Operates on char boundaries, not bytes.
    pub fn truncate_with_marker(text: &str, cap: usize) -> String {
        if text.chars().count() <= cap {
            return text.to_string();
        }
        let mut truncated: String = text.chars().take(cap).collect();
        truncated.push_str("…");
        truncated
    }
}

/// Minimal dependency-free FNV-1a hash, used only to derive stable content
/// addresses — this is not a cryptographic context, just a stable id.
mod content_hash {
    pub fn short_hash(bytes: &[u8]) -> String {
        let mut hash: u64 = 0xcbf29ce484222325;
        for &b in bytes {
            hash ^= b as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }
        format!("{hash:016x}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_is_stable_and_depends_only_on_triple() {
        let a = Memory::compute_id("sess-1", 0, "implement JWT auth");
        let b = Memory::compute_id("sess-1", 0, "implement JWT auth");
        assert_eq!(a, b);

        let c = Memory::compute_id("sess-1", 1, "implement JWT auth");
        assert_ne!(a, c);

        let d = Memory::compute_id("sess-2", 0, "implement JWT auth");
        assert_ne!(a, d);
    }

    #[test]
    fn category_boundaries_match_spec() {
        assert_eq!(ImportanceCategory::from_score(0.0), ImportanceCategory::Low);
        assert_eq!(ImportanceCategory::from_score(4.99), ImportanceCategory::Low);
        assert_eq!(ImportanceCategory::from_score(5.0), ImportanceCategory::Medium);
        assert_eq!(ImportanceCategory::from_score(9.99), ImportanceCategory::Medium);
        assert_eq!(ImportanceCategory::from_score(10.0), ImportanceCategory::High);
        assert_eq!(ImportanceCategory::from_score(19.99), ImportanceCategory::High);
        assert_eq!(ImportanceCategory::from_score(20.0), ImportanceCategory::Critical);
    }

    #[test]
    fn truncate_adds_marker_only_when_needed() {
        assert_eq!(Memory::truncate_with_marker("short", 10), "short");
        let long = "a".repeat(20);
        let truncated = Memory::truncate_with_marker(&long, 10);
        assert_eq!(truncated.chars().count(), 11);
        assert!(truncated.ends_with('…'));
    }
}
