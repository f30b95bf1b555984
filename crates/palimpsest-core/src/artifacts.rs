//! Artifact Extractor (C1).
//!
//! Pattern-driven extraction of code blocks, file paths, shell commands,
//! errors/tracebacks, and architecture mentions from chunk text. Pure and
//! total: any input produces an `Artifacts` bundle, never an error.

use std::sync::OnceLock;

use regex::Regex;

use crate::memory::{Artifacts, CodeSnippet};

fn fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```([A-Za-z0-9_+-]*)\n(.*?)```").unwrap())
}

fn file_path_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?x)
            \b
            (?: [A-Za-z0-9_.\-]+ / )*          # optional directories
            [A-Za-z0-9_\-]+                     # file stem
            \.
            (?:rs|py|js|ts|tsx|jsx|go|rb|java|kt|swift|c|h|cc|cpp|hpp|
               toml|yaml|yml|json|md|txt|sh|sql|lock|cfg|ini|env)
            \b
            ",
        )
        .unwrap()
    })
}

fn shell_prompt_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*[$#>]\s*(.+)$").unwrap())
}

fn error_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^\s*(error|traceback|exception)\b").unwrap())
}

fn architecture_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(architecture|pattern|decided|design|strategy)\b").unwrap()
    })
}

const SHELL_LANGS: &[&str] = &["bash", "sh", "shell", "zsh", "console"];

/// Split text on sentence-ish boundaries. Heuristic only, not locale-aware.
fn split_sentences(text: &str) -> Vec<&str> {
    text.split_inclusive(['.', '\n'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
}

/// Extract all artifact categories from a block of text.
pub fn extract(text: &str) -> Artifacts {
    let mut artifacts = Artifacts::default();

    for caps in fence_re().captures_iter(text) {
        let lang = caps.get(1).map(|m| m.as_str()).unwrap_or("");
        let body = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        let lang = if lang.is_empty() {
            detect_language_heuristic(body)
        } else {
            lang.to_string()
        };

        if SHELL_LANGS.contains(&lang.as_str()) {
            for line in body.lines() {
                let trimmed = line.trim();
                if !trimmed.is_empty() {
                    artifacts.commands.push(trimmed.to_string());
                }
            }
        }

        artifacts.code_snippets.push(CodeSnippet {
            language: lang,
            text: body.trim_end().to_string(),
        });
    }

    let mut seen_files = std::collections::HashSet::new();
    for m in file_path_re().find_iter(text) {
        let normalized = normalize_path(m.as_str());
        if seen_files.insert(normalized.clone()) {
            artifacts.files.push(normalized);
        }
    }

    for line in text.lines() {
        if let Some(caps) = shell_prompt_re().captures(line) {
            if let Some(cmd) = caps.get(1) {
                artifacts.commands.push(cmd.as_str().trim().to_string());
            }
        }
    }

    let mut lines = text.lines().peekable();
    let mut current_error: Option<Vec<String>> = None;
    while let Some(line) = lines.next() {
        if error_re().is_match(line) {
            if let Some(block) = current_error.take() {
                artifacts.errors.push(block.join("\n"));
            }
            current_error = Some(vec![line.trim().to_string()]);
        } else if let Some(block) = current_error.as_mut() {
            let is_continuation = line.starts_with(' ')
                || line.starts_with('\t')
                || line.trim_start().starts_with("at ");
            if is_continuation && !line.trim().is_empty() {
                block.push(line.trim().to_string());
            } else {
                artifacts.errors.push(block.join("\n"));
                current_error = None;
            }
        }
    }
    if let Some(block) = current_error {
        artifacts.errors.push(block.join("\n"));
    }

    for sentence in split_sentences(text) {
        if architecture_re().is_match(sentence) {
            artifacts.architecture.push(sentence.to_string());
        }
    }

    artifacts
}

/// Fallback language guess for an unlabeled fence, based on keyword presence.
fn detect_language_heuristic(body: &str) -> String {
    let probes: &[(&str, &[&str])] = &[
        ("rust", &["fn ", "let mut", "impl ", "pub struct"]),
        ("python", &["def ", "import ", "self.", "elif "]),
        ("javascript", &["const ", "function ", "=>", "require("]),
        ("typescript", &["interface ", ": string", ": number"]),
        ("bash", &["#!/bin/bash", "#!/bin/sh", "echo "]),
        ("sql", &["SELECT ", "INSERT INTO", "CREATE TABLE"]),
    ];
    for (lang, keywords) in probes {
        if keywords.iter().any(|k| body.contains(k)) {
            return lang.to_string();
        }
    }
    "text".to_string()
}
