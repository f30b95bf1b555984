//! Transcript fixtures for the end-to-end scenarios (spec.md §8 S1–S6).

/// One JSONL line for a transcript message.
fn line(role: &str, content: &str) -> String {
    serde_json::json!({ "role": role, "content": content }).to_string()
}

fn transcript(turns: &[(&str, &str)]) -> String {
    turns.iter().map(|(role, content)| line(role, content)).collect::<Vec<_>>().join("\n")
}

/// S1 — fresh ingestion: one user turn naming a file, one assistant turn
/// ending in a test-success marker.
pub fn s1_jwt_auth() -> String {
    transcript(&[
        ("user", "implement JWT auth in auth.py"),
        (
            "assistant",
            "Created auth.py with JWT encode/decode helpers. Ran the test suite: tests pass",
        ),
    ])
}

/// S4 — two sessions' worth of an identical fix, for the redundancy pruner.
pub fn login_bug_fix() -> String {
    transcript(&[
        ("user", "fix login bug"),
        ("assistant", "Patched the session check. tests pass"),
    ])
}

/// S5 — two memories sharing an entity (`jwt.py`) one hop apart.
pub fn s5_auth_and_jwt() -> String {
    transcript(&[
        ("user", "wire up auth.py to call into jwt.py for token checks"),
        ("assistant", "Updated auth.py to import jwt.py. tests pass"),
    ])
}

pub fn s5_jwt_and_session() -> String {
    transcript(&[
        ("user", "refactor jwt.py to share token state with session.py"),
        ("assistant", "jwt.py now delegates to session.py. tests pass"),
    ])
}

/// S6 — the same bug under investigation in two different sessions. Worded
/// distinctly enough that the redundancy pruner (a near-duplicate check,
/// not the scenario under test here) doesn't collapse them into one.
pub fn timeout_bug_session_a() -> String {
    transcript(&[
        ("user", "investigate timeout bug in the request handler"),
        ("assistant", "Found the timeout bug is a missing deadline on the connection pool. Still working on a fix."),
    ])
}

pub fn timeout_bug_session_b() -> String {
    transcript(&[
        ("user", "continue investigating the timeout bug from yesterday"),
        ("assistant", "Traced the timeout to a retry loop with no backoff in the upstream client. tests pass"),
    ])
}

/// An off-topic transcript with no shared vocabulary, for the quality-gate
/// scenario (S3).
pub fn off_topic_query() -> &'static str {
    "discuss favorite colors"
}
