//! Part documents.

use rusqlite::Connection;
use onair_core::{Error, Part, PartId, Result, RundownId, SegmentId};

use crate::document::{encode, query_doc, query_docs};

pub fn upsert_part(conn: &Connection, part: &Part) -> Result<()> {
    conn.execute(
        "INSERT INTO parts (id, rundown_id, segment_id, rank, body) VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(id) DO UPDATE SET
            rundown_id = excluded.rundown_id,
            segment_id = excluded.segment_id,
            rank = excluded.rank,
            body = excluded.body",
        rusqlite::params![
            part.id.as_str(),
            part.rundown_id.as_str(),
            part.segment_id.as_str(),
            part.rank,
            encode(part)?
        ],
    )
    .map_err(|e| Error::database(e.to_string()))?;
    Ok(())
}

pub fn get_part(conn: &Connection, id: &PartId) -> Result<Option<Part>> {
    query_doc(conn, "SELECT body FROM parts WHERE id = ?1", [id.as_str()])
}

/// Parts of a rundown in playout order: segment rank, then part rank.
pub fn list_parts(conn: &Connection, rundown_id: &RundownId) -> Result<Vec<Part>> {
    query_docs(
        conn,
        "SELECT p.body FROM parts p
         JOIN segments s ON s.id = p.segment_id
         WHERE p.rundown_id = ?1
         ORDER BY s.rank, s.id, p.rank, p.id",
        [rundown_id.as_str()],
    )
}

pub fn list_parts_in_segment(conn: &Connection, segment_id: &SegmentId) -> Result<Vec<Part>> {
    query_docs(
        conn,
        "SELECT body FROM parts WHERE segment_id = ?1 ORDER BY rank, id",
        [segment_id.as_str()],
    )
}

/// Delete a part; its pieces and ad-libs cascade.
pub fn delete_part(conn: &Connection, id: &PartId) -> Result<bool> {
    let n = conn
        .execute("DELETE FROM parts WHERE id = ?1", [id.as_str()])
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}
