//! Isolated on-disk memory store for one test.
//!
//! Each test gets its own temp directory and SQLite file, so the tests can
//! run concurrently without interfering (teacher pattern: `TestDatabaseManager`).

use tempfile::TempDir;

use palimpsest_core::config::Config;
use palimpsest_core::pipeline::{precompact, session_start};
use palimpsest_core::storage::Storage;

pub struct TestStore {
    pub storage: Storage,
    _temp_dir: TempDir,
}

impl TestStore {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp directory");
        let db_dir = temp_dir.path().join("memory_db");
        let storage = Storage::open(Some(db_dir)).expect("failed to open test storage");

        TestStore {
            storage,
            _temp_dir: temp_dir,
        }
    }

    /// Run PreCompact ingestion with default configuration.
    pub fn ingest(
        &self,
        session_id: &str,
        transcript_jsonl: &str,
    ) -> Result<precompact::PreCompactReport, palimpsest_core::PipelineError> {
        let request = precompact::PreCompactRequest::new(session_id, transcript_jsonl);
        precompact::run(&self.storage, &request, &Config::default())
    }

    /// Run SessionStart retrieval with the given options.
    pub fn retrieve(
        &self,
        query: &str,
        options: &session_start::RetrievalOptions,
    ) -> Result<session_start::RetrievalReport, palimpsest_core::PipelineError> {
        session_start::run(&self.storage, query, options)
    }
}

impl Default for TestStore {
    fn default() -> Self {
        Self::new()
    }
}
