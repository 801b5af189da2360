//! Embedded SQL migrations and runner.
//!
//! Each migration is a `&str` constant applied in version order inside its
//! own transaction; `schema_migrations` records what has run.

use rusqlite::Connection;
use onair_core::{Error, Result};

/// V1: document collections.
const V1_INITIAL: &str = r#"
CREATE TABLE studios (
    id         TEXT PRIMARY KEY,
    body       TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE rundowns (
    id         TEXT PRIMARY KEY,
    studio_id  TEXT NOT NULL REFERENCES studios(id),
    active     INTEGER NOT NULL DEFAULT 0,
    body       TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE segments (
    id         TEXT PRIMARY KEY,
    rundown_id TEXT NOT NULL REFERENCES rundowns(id) ON DELETE CASCADE,
    rank       REAL NOT NULL,
    body       TEXT NOT NULL
);

CREATE TABLE parts (
    id         TEXT PRIMARY KEY,
    rundown_id TEXT NOT NULL REFERENCES rundowns(id) ON DELETE CASCADE,
    segment_id TEXT NOT NULL REFERENCES segments(id) ON DELETE CASCADE,
    rank       REAL NOT NULL,
    body       TEXT NOT NULL
);

CREATE TABLE pieces (
    id         TEXT PRIMARY KEY,
    rundown_id TEXT NOT NULL REFERENCES rundowns(id) ON DELETE CASCADE,
    part_id    TEXT NOT NULL REFERENCES parts(id) ON DELETE CASCADE,
    body       TEXT NOT NULL
);

CREATE TABLE adlib_pieces (
    id         TEXT PRIMARY KEY,
    rundown_id TEXT NOT NULL REFERENCES rundowns(id) ON DELETE CASCADE,
    part_id    TEXT NOT NULL REFERENCES parts(id) ON DELETE CASCADE,
    rank       REAL NOT NULL DEFAULT 0,
    body       TEXT NOT NULL
);

CREATE TABLE baseline_objects (
    rundown_id TEXT NOT NULL REFERENCES rundowns(id) ON DELETE CASCADE,
    id         TEXT NOT NULL,
    position   INTEGER NOT NULL,
    body       TEXT NOT NULL,
    PRIMARY KEY (rundown_id, id)
);

CREATE INDEX idx_rundowns_studio   ON rundowns(studio_id);
CREATE INDEX idx_segments_rundown  ON segments(rundown_id);
CREATE INDEX idx_parts_rundown     ON parts(rundown_id);
CREATE INDEX idx_parts_segment     ON parts(segment_id);
CREATE INDEX idx_pieces_part       ON pieces(part_id);
CREATE INDEX idx_pieces_rundown    ON pieces(rundown_id);
CREATE INDEX idx_adlib_pieces_part ON adlib_pieces(part_id);
"#;

/// V2: persisted device timeline and per-device stats.
const V2_TIMELINE: &str = r#"
CREATE TABLE timeline_objects (
    studio_id  TEXT NOT NULL,
    id         TEXT NOT NULL,
    position   INTEGER NOT NULL,
    body       TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (studio_id, id)
);

CREATE TABLE timeline_stats (
    studio_id    TEXT NOT NULL,
    device_id    TEXT NOT NULL,
    object_count INTEGER NOT NULL,
    hash         TEXT NOT NULL,
    updated_at   INTEGER NOT NULL,
    PRIMARY KEY (studio_id, device_id)
);
"#;

/// V3: at most one active rundown per studio.
const V3_SINGLE_ACTIVE: &str = r#"
CREATE UNIQUE INDEX idx_rundowns_single_active ON rundowns(studio_id) WHERE active = 1;
"#;

/// Ordered list of (version, sql) pairs.
const MIGRATIONS: &[(i64, &str)] = &[
    (1, V1_INITIAL),
    (2, V2_TIMELINE),
    (3, V3_SINGLE_ACTIVE),
];

/// Run all pending migrations on `conn`.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version    INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
    )
    .map_err(|e| Error::database(format!("Failed to create schema_migrations: {e}")))?;

    for &(version, sql) in MIGRATIONS {
        let applied: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM schema_migrations WHERE version = ?1",
                [version],
                |row| row.get(0),
            )
            .map_err(|e| Error::database(e.to_string()))?;
        if applied {
            continue;
        }

        let tx = conn
            .unchecked_transaction()
            .map_err(|e| Error::database(e.to_string()))?;
        tx.execute_batch(sql)
            .map_err(|e| Error::database(format!("Migration V{version} failed: {e}")))?;
        tx.execute("INSERT INTO schema_migrations (version) VALUES (?1)", [version])
            .map_err(|e| Error::database(e.to_string()))?;
        tx.commit().map_err(|e| Error::database(e.to_string()))?;

        tracing::debug!(version, "Applied migration");
    }

    Ok(())
}

/// Highest applied migration version.
pub fn current_version(conn: &Connection) -> Result<i64> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )
    .map_err(|e| Error::database(e.to_string()))
}
