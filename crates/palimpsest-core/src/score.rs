//! Importance Scorer (C2): spec.md §4.2.
//!
//! `importance = Σ wᵢ · signalᵢ(chunk) · recency_decay(age)`. Pure and
//! total — never raises, returns 0.0 for degenerate input.

use std::sync::OnceLock;

use regex::Regex;

use crate::memory::Artifacts;

const W_DECISION_MARKER: f64 = 10.0;
const W_ERROR_RESOLUTION: f64 = 8.0;
const W_LEARNING: f64 = 7.0;
const W_FILE_CREATION: f64 = 6.0;
const W_TEST_SUCCESS: f64 = 5.0;
const W_TOOL_USAGE: f64 = 0.5;
const W_CODE_PRESENCE: f64 = 2.0;
const W_ARCHITECTURE: f64 = 4.0;
const W_FILE_OPS: f64 = 0.3;

const TOOL_USAGE_CAP: f64 = 10.0;
const FILE_OPS_CAP: f64 = 15.0;

/// Overridable weights, matching spec.md §4.2's defaults. Exposed for the
/// optional `palimpsest.toml` config layer (SPEC_FULL.md "Configuration").
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScorerWeights {
    pub decision_marker: f64,
    pub error_resolution: f64,
    pub learning: f64,
    pub file_creation: f64,
    pub test_success: f64,
    pub tool_usage_intensity: f64,
    pub code_presence: f64,
    pub architecture: f64,
    pub file_ops_count: f64,
}

impl Default for ScorerWeights {
    fn default() -> Self {
        ScorerWeights {
            decision_marker: W_DECISION_MARKER,
            error_resolution: W_ERROR_RESOLUTION,
            learning: W_LEARNING,
            file_creation: W_FILE_CREATION,
            test_success: W_TEST_SUCCESS,
            tool_usage_intensity: W_TOOL_USAGE,
            code_presence: W_CODE_PRESENCE,
            architecture: W_ARCHITECTURE,
            file_ops_count: W_FILE_OPS,
        }
    }
}

fn decision_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(decided to|chose|will use|going with)\b").unwrap()
    })
}

fn error_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(error|exception|traceback|failed|failure)\b").unwrap())
}

fn resolution_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(fixed|resolved|works now|solved)\b").unwrap())
}

fn learning_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(learned|discovered|turns out|realized)\b").unwrap())
}

fn creation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(created?|new file|added) \b").unwrap())
}

fn test_success_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(tests? pass(?:ed|ing)?|all green|exit code 0|exit(?:ed)? 0)\b").unwrap()
    })
}

/// `0.5^(days_old/30)`, spec.md §4.2's non-linear recency multiplier.
pub fn recency_decay(age_days: f64) -> f64 {
    0.5_f64.powf(age_days.max(0.0) / 30.0)
}

/// Compute importance for one chunk. `tool_call_count` is the number of
/// tool invocations observed in the action span; `age_days` is the elapsed
/// time since ingestion (0 for a just-ingested chunk — the scorer runs once
/// at ingestion per spec.md §3, so this is almost always 0 in practice, but
/// the signature stays general for re-scoring / tests).
pub fn score_chunk(
    intent: &str,
    action: &str,
    outcome: &str,
    artifacts: &Artifacts,
    tool_call_count: u32,
    age_days: f64,
) -> f64 {
    score_chunk_with_weights(
        intent,
        action,
        outcome,
        artifacts,
        tool_call_count,
        age_days,
        &ScorerWeights::default(),
    )
}

pub fn score_chunk_with_weights(
    intent: &str,
    action: &str,
    outcome: &str,
    artifacts: &Artifacts,
    tool_call_count: u32,
    age_days: f64,
    weights: &ScorerWeights,
) -> f64 {
    let combined = format!("{intent}\n{action}\n{outcome}");
    if combined.trim().is_empty() {
        return 0.0;
    }

    let mut total = 0.0;

    if decision_re().is_match(intent) || decision_re().is_match(action) {
        total += weights.decision_marker;
    }

    if error_token_re().is_match(&combined) && resolution_token_re().is_match(&combined) {
        total += weights.error_resolution;
    }

    if learning_re().is_match(&combined) {
        total += weights.learning;
    }

    if creation_re().is_match(&combined) && !artifacts.files.is_empty() {
        total += weights.file_creation;
    }

    if test_success_re().is_match(&combined) {
        total += weights.test_success;
    }

    total += weights.tool_usage_intensity * (tool_call_count as f64).min(TOOL_USAGE_CAP);

    if !artifacts.code_snippets.is_empty() {
        total += weights.code_presence;
    }

    if !artifacts.architecture.is_empty() {
        total += weights.architecture;
    }

    total += weights.file_ops_count * (artifacts.files.len() as f64).min(FILE_OPS_CAP);

    (total * recency_decay(age_days)).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::CodeSnippet;

    fn artifacts_with_file() -> Artifacts {
        Artifacts {
            files: vec!["auth.py".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn zero_for_empty_chunk() {
        assert_eq!(score_chunk("", "", "", &Artifacts::default(), 0, 0.0), 0.0);
    }

    #[test]
    fn s1_scenario_scores_high() {
        let artifacts = Artifacts {
            code_snippets: vec![CodeSnippet {
                language: "python".into(),
                text: "def login(): ...".into(),
            }],
            files: vec!["auth.py".into()],
            ..Default::default()
        };
        let score = score_chunk(
            "implement JWT auth in auth.py",
            "created auth.py with JWT logic",
            "tests pass",
            &artifacts,
            1,
            0.0,
        );
        assert!(score >= 10.0, "expected high-category score, got {score}");
    }

    #[test]
    fn recency_decay_halves_every_30_days() {
        assert!((recency_decay(0.0) - 1.0).abs() < 1e-9);
        assert!((recency_decay(30.0) - 0.5).abs() < 1e-9);
        assert!((recency_decay(60.0) - 0.25).abs() < 1e-9);
    }

    #[test]
    fn decay_applies_multiplicatively_not_additively() {
        let artifacts = artifacts_with_file();
        let fresh = score_chunk("decided to use postgres", "", "", &artifacts, 0, 0.0);
        let aged = score_chunk("decided to use postgres", "", "", &artifacts, 0, 30.0);
        assert!((aged - fresh / 2.0).abs() < 1e-9);
    }

    #[test]
    fn tool_usage_is_capped() {
        let artifacts = Artifacts::default();
        let score = score_chunk("go", "did stuff", "", &artifacts, 100, 0.0);
        assert!((score - 0.5 * 10.0).abs() < 1e-9);
    }
}
