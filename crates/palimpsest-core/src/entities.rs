//! Entity Extractor (C3): typed, canonicalized mentions (spec.md §3, §4.3).
//!
//! Rule-based (regex + lexicon) by deliberate choice — see SPEC_FULL.md's
//! Open Question resolutions. Pure: the same text always yields the same
//! entities in the same order.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::memory::Artifacts;

/// Typed entity vocabulary from spec.md §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntityType {
    File,
    Function,
    Bug,
    Feature,
    Tool,
    Error,
    Decision,
    Other,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::File => "FILE",
            EntityType::Function => "FUNCTION",
            EntityType::Bug => "BUG",
            EntityType::Feature => "FEATURE",
            EntityType::Tool => "TOOL",
            EntityType::Error => "ERROR",
            EntityType::Decision => "DECISION",
            EntityType::Other => "OTHER",
        }
    }
}

/// A recognized, canonicalized mention. `(entity_type, canonical_form)` is
/// the dedup key (spec.md §3 invariant).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub entity_type: EntityType,
    pub surface_form: String,
    pub canonical_form: String,
}

impl Entity {
    pub fn new(entity_type: EntityType, surface_form: impl Into<String>) -> Self {
        let surface_form = surface_form.into();
        let canonical_form = canonicalize(entity_type, &surface_form);
        Entity {
            entity_type,
            surface_form,
            canonical_form,
        }
    }

    /// Stable id derived from the `(type, canonical_form)` dedup key.
    pub fn id(&self) -> String {
        format!("{}:{}", self.entity_type.as_str(), self.canonical_form)
    }
}

fn canonicalize(entity_type: EntityType, surface_form: &str) -> String {
    match entity_type {
        EntityType::File => surface_form.replace('\\', "/").to_lowercase(),
        EntityType::Function => surface_form
            .trim_end_matches("()")
            .trim()
            .to_lowercase(),
        _ => surface_form.trim().to_string(),
    }
}

fn function_call_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b([A-Za-z_][A-Za-z0-9_]*)\s*\(").unwrap())
}

fn bug_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b((?:bug|issue|jira|gh)[-_#]\s?\d+)\b").unwrap())
}

fn tool_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(cargo|npm|pytest|git|docker|make|rustc|pip|yarn|kubectl)\b").unwrap()
    })
}

fn feature_marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(feature|implement(?:ed|ing)?|add(?:ed|ing)?)\s+([a-z][a-z0-9 _-]{2,40})").unwrap())
}

fn decision_marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(?:decided to|chose to|will use|going with)\s+([a-z0-9][a-z0-9 _/.\-]{2,60})")
            .unwrap()
    })
}

const COMMON_WORDS: &[&str] = &[
    "if", "for", "while", "match", "return", "fn", "let", "print", "println", "self", "super",
];

/// Extract entities from chunk text and previously-extracted artifacts.
/// Artifacts are consulted so FILE/ERROR entities reuse the same
/// normalization the artifact extractor already performed.
pub fn extract(text: &str, artifacts: &Artifacts) -> Vec<Entity> {
    let mut entities = Vec::new();
    let mut seen = std::collections::HashSet::new();

    let mut push = |entity: Entity, seen: &mut std::collections::HashSet<String>| {
        let key = entity.id();
        if seen.insert(key) {
            entities.push(entity);
        }
    };

    for file in &artifacts.files {
        push(Entity::new(EntityType::File, file.clone()), &mut seen);
    }

    for caps in function_call_re().captures_iter(text) {
        if let Some(name) = caps.get(1) {
            let name = name.as_str();
            if COMMON_WORDS.contains(&name.to_lowercase().as_str()) {
                continue;
            }
            push(Entity::new(EntityType::Function, name), &mut seen);
        }
    }

    for caps in bug_id_re().captures_iter(text) {
        if let Some(m) = caps.get(1) {
            push(Entity::new(EntityType::Bug, m.as_str()), &mut seen);
        }
    }

    for error in &artifacts.errors {
        let first_line = error.lines().next().unwrap_or(error);
        push(Entity::new(EntityType::Error, first_line), &mut seen);
    }

    for caps in tool_re().captures_iter(text) {
        if let Some(m) = caps.get(1) {
            push(Entity::new(EntityType::Tool, m.as_str()), &mut seen);
        }
    }

    for caps in feature_marker_re().captures_iter(text) {
        if let Some(m) = caps.get(2) {
            push(Entity::new(EntityType::Feature, m.as_str().trim()), &mut seen);
        }
    }

    for caps in decision_marker_re().captures_iter(text) {
        if let Some(m) = caps.get(1) {
            push(Entity::new(EntityType::Decision, m.as_str().trim()), &mut seen);
        }
    }

    entities
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_entities_canonicalize_lowercase_slashes() {
        let entity = Entity::new(EntityType::File, "Src\\Auth.PY");
        assert_eq!(entity.canonical_form, "src/auth.py");
    }

    #[test]
    fn dedup_key_is_type_and_canonical_form() {
        let a = Entity::new(EntityType::File, "auth.py");
        let b = Entity::new(EntityType::File, "AUTH.PY");
        assert_eq!(a.id(), b.id());
    }

    #[test]
    fn extracts_function_calls_skipping_keywords() {
        let artifacts = Artifacts::default();
        let entities = extract("called validate_token() then if(true) return", &artifacts);
        assert!(entities
            .iter()
            .any(|e| e.entity_type == EntityType::Function && e.canonical_form == "validate_token"));
        assert!(!entities
            .iter()
            .any(|e| e.entity_type == EntityType::Function && e.canonical_form == "if"));
    }

    #[test]
    fn extracts_tool_mentions() {
        let artifacts = Artifacts::default();
        let entities = extract("ran cargo test then git commit", &artifacts);
        assert!(entities
            .iter()
            .any(|e| e.entity_type == EntityType::Tool && e.canonical_form == "cargo"));
    }

    #[test]
    fn extracts_decision_markers() {
        let artifacts = Artifacts::default();
        let entities = extract("We decided to use sqlite for storage", &artifacts);
        assert!(entities.iter().any(|e| e.entity_type == EntityType::Decision));
    }
}
