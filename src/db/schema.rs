//! SQL DDL for the record store.
//!
//! Defines `memory_index`, its `memory_fts` (FTS5) mirror, `causal_edges`, and
//! `schema_meta`. All DDL uses `IF NOT EXISTS` for idempotent initialization.

use rusqlite::Connection;

const SCHEMA_SQL: &str = r#"
-- Indexed records
CREATE TABLE IF NOT EXISTS memory_index (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL DEFAULT '',
    body TEXT NOT NULL DEFAULT '',
    trigger_phrases TEXT,
    path TEXT NOT NULL DEFAULT '',
    folder TEXT NOT NULL DEFAULT '',
    importance_weight REAL,
    importance_tier TEXT NOT NULL DEFAULT 'normal'
        CHECK(importance_tier IN ('constitutional','critical','important','normal','temporary','deprecated')),
    archived INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_memory_archived ON memory_index(archived);
CREATE INDEX IF NOT EXISTS idx_memory_tier ON memory_index(importance_tier);
CREATE INDEX IF NOT EXISTS idx_memory_folder ON memory_index(folder);

-- Full-text mirror, maintained by the write helpers in store::sqlite
CREATE VIRTUAL TABLE IF NOT EXISTS memory_fts USING fts5(
    title,
    body,
    trigger_phrases,
    path,
    id UNINDEXED
);

-- Causal graph
CREATE TABLE IF NOT EXISTS causal_edges (
    id TEXT PRIMARY KEY,
    source_id TEXT NOT NULL REFERENCES memory_index(id) ON DELETE CASCADE,
    target_id TEXT NOT NULL REFERENCES memory_index(id) ON DELETE CASCADE,
    relation TEXT NOT NULL
        CHECK(relation IN ('caused','derived_from','enabled','contradicts','supersedes','supports')),
    strength REAL NOT NULL DEFAULT 1.0 CHECK(strength >= 0.0 AND strength <= 1.0),
    created_at TEXT NOT NULL,
    UNIQUE(source_id, target_id, relation)
);

CREATE INDEX IF NOT EXISTS idx_edges_source ON causal_edges(source_id);
CREATE INDEX IF NOT EXISTS idx_edges_target ON causal_edges(target_id);

-- Schema metadata
CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Initialize all schema tables. Idempotent (uses IF NOT EXISTS).
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;

    Ok(())
}
