//! Rundown baseline objects (always on while the rundown is active).

use rusqlite::Connection;
use onair_core::{Error, Result, RundownId, TimelineObject};

use crate::document::{encode, query_docs};

/// Replace the baseline of a rundown, preserving the given order.
pub fn replace_baseline(
    conn: &Connection,
    rundown_id: &RundownId,
    objects: &[TimelineObject],
) -> Result<()> {
    conn.execute(
        "DELETE FROM baseline_objects WHERE rundown_id = ?1",
        [rundown_id.as_str()],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    let mut stmt = conn
        .prepare(
            "INSERT INTO baseline_objects (rundown_id, id, position, body) VALUES (?1, ?2, ?3, ?4)",
        )
        .map_err(|e| Error::database(e.to_string()))?;
    for (position, obj) in objects.iter().enumerate() {
        stmt.execute(rusqlite::params![
            rundown_id.as_str(),
            obj.id,
            position as i64,
            encode(obj)?
        ])
        .map_err(|e| Error::database(e.to_string()))?;
    }
    Ok(())
}

pub fn list_baseline(conn: &Connection, rundown_id: &RundownId) -> Result<Vec<TimelineObject>> {
    query_docs(
        conn,
        "SELECT body FROM baseline_objects WHERE rundown_id = ?1 ORDER BY position",
        [rundown_id.as_str()],
    )
}
