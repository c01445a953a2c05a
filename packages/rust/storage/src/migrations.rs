//! SQL migration definitions for the segment repo database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a set of SQL statements executed as one batch.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: segments with row hash",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version   INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Accumulated segments, in merge order
CREATE TABLE IF NOT EXISTS segments (
    position              INTEGER PRIMARY KEY AUTOINCREMENT,
    row_hash              TEXT NOT NULL UNIQUE,
    segment_id            TEXT,
    run_id                TEXT,
    source_file           TEXT,
    title                 TEXT NOT NULL,
    content               TEXT NOT NULL,
    tags_json             TEXT,
    summary               TEXT,
    summary_quality_score TEXT,
    confidence_score      TEXT,
    needs_attention       INTEGER,
    title_lang            TEXT,
    merged_at             TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_segments_title ON segments(title);
CREATE INDEX IF NOT EXISTS idx_segments_run_id ON segments(run_id);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
