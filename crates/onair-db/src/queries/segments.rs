//! Segment documents.

use rusqlite::Connection;
use onair_core::{Error, Result, RundownId, Segment, SegmentId};

use crate::document::{encode, query_doc, query_docs};

pub fn upsert_segment(conn: &Connection, segment: &Segment) -> Result<()> {
    conn.execute(
        "INSERT INTO segments (id, rundown_id, rank, body) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(id) DO UPDATE SET
            rundown_id = excluded.rundown_id,
            rank = excluded.rank,
            body = excluded.body",
        rusqlite::params![
            segment.id.as_str(),
            segment.rundown_id.as_str(),
            segment.rank,
            encode(segment)?
        ],
    )
    .map_err(|e| Error::database(e.to_string()))?;
    Ok(())
}

pub fn get_segment(conn: &Connection, id: &SegmentId) -> Result<Option<Segment>> {
    query_doc(conn, "SELECT body FROM segments WHERE id = ?1", [id.as_str()])
}

/// Segments of a rundown in rank order.
pub fn list_segments(conn: &Connection, rundown_id: &RundownId) -> Result<Vec<Segment>> {
    query_docs(
        conn,
        "SELECT body FROM segments WHERE rundown_id = ?1 ORDER BY rank, id",
        [rundown_id.as_str()],
    )
}

/// Delete a segment; its parts and their pieces cascade.
pub fn delete_segment(conn: &Connection, id: &SegmentId) -> Result<bool> {
    let n = conn
        .execute("DELETE FROM segments WHERE id = ?1", [id.as_str()])
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}
