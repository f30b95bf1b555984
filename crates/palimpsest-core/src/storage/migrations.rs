//! Schema migrations, applied in order against `PRAGMA user_version`.

/// One schema migration.
pub struct Migration {
    pub version: i64,
    pub description: &'static str,
    pub up: &'static str,
}

const MIGRATION_V1_UP: &str = r#"
CREATE TABLE IF NOT EXISTS memories (
    rowid           INTEGER PRIMARY KEY,
    id              TEXT NOT NULL UNIQUE,
    session_id      TEXT NOT NULL,
    timestamp       TEXT NOT NULL,
    chunk_index     INTEGER NOT NULL,
    intent          TEXT NOT NULL,
    action          TEXT NOT NULL,
    outcome         TEXT NOT NULL,
    importance      REAL NOT NULL,
    artifacts_json  TEXT NOT NULL,
    has_code        INTEGER NOT NULL DEFAULT 0,
    has_files       INTEGER NOT NULL DEFAULT 0,
    has_architecture INTEGER NOT NULL DEFAULT 0,
    success         INTEGER NOT NULL DEFAULT 0,
    embedding       BLOB,
    embedded_text   TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_memories_session ON memories(session_id);
CREATE INDEX IF NOT EXISTS idx_memories_timestamp ON memories(timestamp);
CREATE INDEX IF NOT EXISTS idx_memories_importance ON memories(importance);

CREATE TABLE IF NOT EXISTS entities (
    entity_id       TEXT PRIMARY KEY,
    entity_type     TEXT NOT NULL,
    canonical_form  TEXT NOT NULL,
    surface_form    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS memory_entity_edges (
    memory_id   TEXT NOT NULL,
    entity_id   TEXT NOT NULL,
    weight      INTEGER NOT NULL DEFAULT 1,
    PRIMARY KEY (memory_id, entity_id),
    FOREIGN KEY (memory_id) REFERENCES memories(id) ON DELETE CASCADE,
    FOREIGN KEY (entity_id) REFERENCES entities(entity_id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_edges_entity ON memory_entity_edges(entity_id);
"#;

const MIGRATION_V2_UP: &str = r#"
CREATE VIRTUAL TABLE IF NOT EXISTS memories_fts USING fts5(
    intent, action, outcome,
    content='memories',
    content_rowid='rowid'
);

CREATE TRIGGER IF NOT EXISTS memories_fts_insert AFTER INSERT ON memories BEGIN
    INSERT INTO memories_fts(rowid, intent, action, outcome)
    VALUES (new.rowid, new.intent, new.action, new.outcome);
END;

CREATE TRIGGER IF NOT EXISTS memories_fts_delete AFTER DELETE ON memories BEGIN
    INSERT INTO memories_fts(memories_fts, rowid, intent, action, outcome)
    VALUES ('delete', old.rowid, old.intent, old.action, old.outcome);
END;

CREATE TRIGGER IF NOT EXISTS memories_fts_update AFTER UPDATE ON memories BEGIN
    INSERT INTO memories_fts(memories_fts, rowid, intent, action, outcome)
    VALUES ('delete', old.rowid, old.intent, old.action, old.outcome);
    INSERT INTO memories_fts(rowid, intent, action, outcome)
    VALUES (new.rowid, new.intent, new.action, new.outcome);
END;
"#;

/// All migrations, applied in ascending version order against the
/// database's `PRAGMA user_version`.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "initial schema: memories, entities, memory_entity_edges",
        up: MIGRATION_V1_UP,
    },
    Migration {
        version: 2,
        description: "FTS5 external-content index over intent/action/outcome",
        up: MIGRATION_V2_UP,
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_ordered_and_contiguous() {
        for (i, m) in MIGRATIONS.iter().enumerate() {
            assert_eq!(m.version, (i + 1) as i64);
        }
    }
}
