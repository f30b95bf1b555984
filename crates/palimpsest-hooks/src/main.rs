//! Palimpsest lifecycle hook dispatcher.
//!
//! The host pipes one JSON event object to stdin and reads one JSON response
//! from stdout, once, per invocation (spec.md §6.1) — unlike the teacher's
//! persistent JSON-RPC-over-stdio server loop, this binary does one thing and
//! exits. Logging goes to `debug.log` so stdout stays reserved for the single
//! response object the host reads.
//!
//! The top-level `catch_unwind` plus the `{status: "error"}` envelope make
//! this process incapable of blocking the host: any panic, any pipeline
//! error, any malformed input all resolve to a clean non-zero exit (for
//! input-shape failures) or a graceful `status: "ok"` degradation, per
//! spec.md §7.

use std::io::Read;
use std::panic::{self, AssertUnwindSafe};

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use palimpsest_core::config::load_config;
use palimpsest_core::pipeline::{precompact, session_start};
use palimpsest_core::storage::{default_store_dir, Storage};

/// Tagged lifecycle event from the host, per spec.md §6.1/§6.2.
#[derive(Debug, Deserialize)]
#[serde(tag = "hook_event_name")]
enum HookEvent {
    PreCompact {
        session_id: String,
        transcript_path: String,
        #[allow(dead_code)]
        trigger: Option<String>,
    },
    SessionStart {
        session_id: String,
        task_query: String,
        #[allow(dead_code)]
        matcher: Option<String>,
    },
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum HookResponse {
    PreCompact {
        status: &'static str,
        memories_stored: usize,
        pruned: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    SessionStart {
        additional_context: String,
        memories_injected: usize,
    },
    Error {
        status: &'static str,
        error: String,
    },
}

/// `debug.log` lives next to `memory_db/` (spec.md §6.3), not inside it.
fn log_dir() -> Option<std::path::PathBuf> {
    default_store_dir().ok().and_then(|p| p.parent().map(|p| p.to_path_buf()))
}

fn init_logging() -> tracing_appender::non_blocking::WorkerGuard {
    let dir = log_dir();
    if let Some(dir) = &dir {
        let _ = std::fs::create_dir_all(dir);
    }
    let (writer, guard) = match &dir {
        Some(dir) => tracing_appender::non_blocking(tracing_appender::rolling::never(dir, "debug.log")),
        None => tracing_appender::non_blocking(std::io::stderr()),
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with_writer(writer)
        .with_target(false)
        .with_ansi(false)
        .init();

    guard
}

fn read_stdin() -> std::io::Result<String> {
    let mut buf = String::new();
    std::io::stdin().read_to_string(&mut buf)?;
    Ok(buf)
}

fn run_precompact(storage: &Storage, session_id: String, transcript_path: &str) -> HookResponse {
    let transcript_jsonl = match std::fs::read_to_string(transcript_path) {
        Ok(text) => text,
        Err(err) => {
            error!(transcript_path, %err, "failed to read transcript file");
            return HookResponse::Error {
                status: "error",
                error: format!("could not read transcript file: {err}"),
            };
        }
    };

    let config = load_config();
    let request = precompact::PreCompactRequest::new(session_id, transcript_jsonl);

    match precompact::run(storage, &request, &config) {
        Ok(report) => {
            info!(
                memories_stored = report.memories_stored,
                duplicates_skipped = report.duplicates_skipped,
                chunks_seen = report.chunks_seen,
                clusters_formed = report.clusters_formed,
                "PreCompact complete"
            );
            HookResponse::PreCompact {
                status: "ok",
                memories_stored: report.memories_stored,
                pruned: report.pruned.map(|p| p.deleted_ids.len()).unwrap_or(0),
                error: None,
            }
        }
        Err(err) => {
            // Pipeline errors degrade gracefully rather than blocking the
            // host (spec.md §7) — `precompact::run` embeds the whole batch
            // before writing it in one store transaction, so a failure here
            // left the store untouched, and reporting "ok" with zero
            // progress and an explanatory error is honest.
            warn!(%err, "PreCompact failed, degrading gracefully");
            HookResponse::PreCompact {
                status: "ok",
                memories_stored: 0,
                pruned: 0,
                error: Some(err.to_string()),
            }
        }
    }
}

fn run_session_start(storage: &Storage, session_id: String, task_query: &str) -> HookResponse {
    let config = load_config();
    let mut options = config
        .retrieval
        .map(|r| session_start::RetrievalOptions {
            k_max: r.k_max.unwrap_or(20),
            k_recent: r.k_recent.unwrap_or(4),
            min_importance: r.min_importance.unwrap_or(0.0),
            min_similarity: r.min_similarity.unwrap_or(0.35),
            alpha: r.alpha.unwrap_or(0.6),
            beta: r.beta.unwrap_or(0.4),
            session_id: None,
        })
        .unwrap_or_default();
    // Cross-session by default (spec.md S6) — session_id only identifies the
    // caller for logging, it is never threaded into the retrieval filter.
    options.session_id = None;
    let _ = &session_id;

    match session_start::run(storage, task_query, &options) {
        Ok(report) => {
            info!(memories_injected = report.retrieved.len(), "SessionStart complete");
            HookResponse::SessionStart {
                additional_context: report.formatted,
                memories_injected: report.retrieved.len(),
            }
        }
        Err(err) => {
            warn!(%err, "SessionStart retrieval failed, returning empty context");
            HookResponse::SessionStart {
                additional_context: String::new(),
                memories_injected: 0,
            }
        }
    }
}

fn dispatch(raw_input: &str) -> HookResponse {
    let event: HookEvent = match serde_json::from_str(raw_input) {
        Ok(event) => event,
        Err(err) => {
            error!(%err, "malformed hook event on stdin");
            return HookResponse::Error {
                status: "error",
                error: format!("malformed hook event: {err}"),
            };
        }
    };

    let storage = match Storage::open(None) {
        Ok(storage) => storage,
        Err(err) => {
            error!(%err, "failed to open memory store");
            return HookResponse::Error {
                status: "error",
                error: format!("failed to open memory store: {err}"),
            };
        }
    };

    match event {
        HookEvent::PreCompact {
            session_id,
            transcript_path,
            ..
        } => run_precompact(&storage, session_id, &transcript_path),
        HookEvent::SessionStart {
            session_id,
            task_query,
            ..
        } => run_session_start(&storage, session_id, &task_query),
    }
}

fn main() {
    let _guard = init_logging();

    let raw_input = match read_stdin() {
        Ok(input) => input,
        Err(err) => {
            eprintln!("failed to read stdin: {err}");
            std::process::exit(1);
        }
    };

    let response = panic::catch_unwind(AssertUnwindSafe(|| dispatch(&raw_input))).unwrap_or_else(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        error!(panic = %message, "hook dispatcher panicked");
        HookResponse::Error {
            status: "error",
            error: format!("internal error: {message}"),
        }
    });

    // Only input-shape failures (malformed event, unreadable store) are
    // fatal per spec.md §7; pipeline-level failures are folded into an "ok"
    // envelope above and always exit 0.
    let is_input_shape_error = matches!(&response, HookResponse::Error { .. });

    match serde_json::to_string(&response) {
        Ok(json) => println!("{json}"),
        Err(err) => {
            eprintln!("failed to serialize hook response: {err}");
            std::process::exit(1);
        }
    }

    if is_input_shape_error {
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precompact_event_parses_from_host_shape() {
        let raw = r#"{
            "session_id": "s1",
            "transcript_path": "/tmp/t.jsonl",
            "hook_event_name": "PreCompact",
            "trigger": "auto"
        }"#;
        let event: HookEvent = serde_json::from_str(raw).unwrap();
        assert!(matches!(event, HookEvent::PreCompact { .. }));
    }

    #[test]
    fn session_start_event_parses_from_host_shape() {
        let raw = r#"{
            "session_id": "s1",
            "task_query": "fix bug",
            "hook_event_name": "SessionStart",
            "matcher": "resume"
        }"#;
        let event: HookEvent = serde_json::from_str(raw).unwrap();
        assert!(matches!(event, HookEvent::SessionStart { .. }));
    }

    #[test]
    fn malformed_event_is_an_error_response() {
        let response = dispatch("not json");
        assert!(matches!(response, HookResponse::Error { .. }));
    }
}
