//! Keyword search over the FTS5 external-content index (§6.4 `keyword_search`).

use std::sync::OnceLock;

use regex::Regex;

/// FTS5 query syntax treats a handful of characters as operators. Strip
/// them so arbitrary user text can't break or inject into the MATCH query.
fn fts5_operator_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"["*^:{}()\-]"#).unwrap())
}

/// Sanitize free text into a safe FTS5 `MATCH` query: strip operator
/// characters, then AND together the remaining terms.
pub fn sanitize_fts5_query(text: &str) -> String {
    let cleaned = fts5_operator_re().replace_all(text, " ");
    cleaned
        .split_whitespace()
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{t}\""))
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// Build a sanitized MATCH query from an explicit keyword list (§6.4
/// `keyword_search`), ORing the terms together rather than ANDing them —
/// any one of the supplied keywords is enough to match.
pub fn sanitize_keywords(keywords: &[String]) -> String {
    keywords
        .iter()
        .flat_map(|k| k.split_whitespace())
        .map(|t| fts5_operator_re().replace_all(t, "").to_string())
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{t}\""))
        .collect::<Vec<_>>()
        .join(" OR ")
}

/// Thin wrapper documenting the keyword-search contract; the actual FTS5
/// query execution lives on [`crate::storage::Storage`], which owns the
/// connection these queries run against.
pub struct KeywordSearcher;

impl KeywordSearcher {
    pub fn build_match_query(text: &str) -> String {
        sanitize_fts5_query(text)
    }

    pub fn build_keywords_query(keywords: &[String]) -> String {
        sanitize_keywords(keywords)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_operator_characters() {
        let query = sanitize_fts5_query("auth.py OR \"drop table\" -- injected");
        assert!(!query.contains('"') || query.matches('"').count() % 2 == 0);
        assert!(!query.contains("--"));
    }

    #[test]
    fn ands_terms_from_free_text() {
        let query = sanitize_fts5_query("fix login bug");
        assert_eq!(query, "\"fix\" AND \"login\" AND \"bug\"");
    }

    #[test]
    fn ors_explicit_keywords() {
        let query = sanitize_keywords(&["auth".to_string(), "login".to_string()]);
        assert_eq!(query, "\"auth\" OR \"login\"");
    }

    #[test]
    fn empty_input_yields_empty_query() {
        assert_eq!(sanitize_fts5_query(""), "");
        assert_eq!(sanitize_keywords(&[]), "");
    }
}
