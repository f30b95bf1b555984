//! Transcript message types (§6.2).
//!
//! Transcripts are line-delimited JSON; the pipeline must tolerate extra
//! fields on each line, so deserialization is loose by design — unknown
//! fields are simply ignored rather than rejected.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Coarse role tag for a transcript line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptRole {
    User,
    Assistant,
    Tool,
    /// Anything the host emits that doesn't map to the three known roles.
    #[serde(other)]
    Other,
}

/// One line of a JSONL transcript.
///
/// Deliberately permissive: only `role` and `content` are required, every
/// other field is optional and extra keys present in the source JSON are
/// dropped rather than causing a parse error (spec.md §6.2).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TranscriptMessage {
    pub role: TranscriptRole,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tool_name: Option<String>,
    #[serde(default)]
    pub tool_result: Option<serde_json::Value>,
}

impl TranscriptMessage {
    pub fn is_user(&self) -> bool {
        matches!(self.role, TranscriptRole::User)
    }

    /// Best-effort success signal from a tool result payload: an explicit
    /// `ok`/`success` boolean, or an absent/zero `exit_code`.
    pub fn tool_result_succeeded(&self) -> Option<bool> {
        let value = self.tool_result.as_ref()?;
        if let Some(b) = value.get("success").and_then(|v| v.as_bool()) {
            return Some(b);
        }
        if let Some(b) = value.get("ok").and_then(|v| v.as_bool()) {
            return Some(b);
        }
        if let Some(code) = value.get("exit_code").and_then(|v| v.as_i64()) {
            return Some(code == 0);
        }
        None
    }
}

/// Parse a JSONL transcript, skipping blank lines and lines that fail to
/// parse (a malformed line is a per-chunk extraction error, not fatal —
/// spec.md §7).
pub fn parse_jsonl(text: &str) -> Vec<TranscriptMessage> {
    text.lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<TranscriptMessage>(line) {
            Ok(msg) => Some(msg),
            Err(err) => {
                tracing::warn!(error = %err, "skipping malformed transcript line");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tolerates_unknown_fields() {
        let line = r#"{"role":"user","content":"hi","extra_field":{"nested":true},"ts":"2026-01-01T00:00:00Z"}"#;
        let msgs = parse_jsonl(line);
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].content, "hi");
        assert!(msgs[0].is_user());
    }

    #[test]
    fn skips_malformed_lines_without_failing() {
        let text = "{\"role\":\"user\",\"content\":\"ok\"}\nnot json\n";
        let msgs = parse_jsonl(text);
        assert_eq!(msgs.len(), 1);
    }

    #[test]
    fn tool_result_success_from_exit_code() {
        let msg = TranscriptMessage {
            role: TranscriptRole::Tool,
            content: String::new(),
            timestamp: None,
            tool_name: Some("bash".into()),
            tool_result: Some(serde_json::json!({"exit_code": 0})),
        };
        assert_eq!(msg.tool_result_succeeded(), Some(true));
    }
}
