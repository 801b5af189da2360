//! Persisted device timeline and per-device stats.

use chrono::Utc;
use rusqlite::Connection;
use onair_core::{Error, Result, StudioId, TimelineObject, TimelineStat};

use crate::document::{encode, query_docs};

/// Persisted timeline objects of a studio, in compile order.
pub fn list_timeline(conn: &Connection, studio_id: &StudioId) -> Result<Vec<TimelineObject>> {
    query_docs(
        conn,
        "SELECT body FROM timeline_objects WHERE studio_id = ?1 ORDER BY position, id",
        [studio_id.as_str()],
    )
}

/// Persisted timeline objects with their stored JSON bodies, for diffing.
pub fn list_timeline_bodies(
    conn: &Connection,
    studio_id: &StudioId,
) -> Result<Vec<(String, i64, String)>> {
    let mut stmt = conn
        .prepare("SELECT id, position, body FROM timeline_objects WHERE studio_id = ?1")
        .map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map([studio_id.as_str()], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
        })
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}

/// Insert or replace one timeline object at `position`.
pub fn upsert_timeline_object(
    conn: &Connection,
    studio_id: &StudioId,
    position: i64,
    obj: &TimelineObject,
) -> Result<()> {
    conn.execute(
        "INSERT INTO timeline_objects (studio_id, id, position, body, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(studio_id, id) DO UPDATE SET
            position = excluded.position,
            body = excluded.body,
            updated_at = excluded.updated_at",
        rusqlite::params![
            studio_id.as_str(),
            obj.id,
            position,
            encode(obj)?,
            Utc::now().to_rfc3339()
        ],
    )
    .map_err(|e| Error::database(e.to_string()))?;
    Ok(())
}

pub fn delete_timeline_object(conn: &Connection, studio_id: &StudioId, id: &str) -> Result<bool> {
    let n = conn
        .execute(
            "DELETE FROM timeline_objects WHERE studio_id = ?1 AND id = ?2",
            [studio_id.as_str(), id],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

pub fn list_stats(conn: &Connection, studio_id: &StudioId) -> Result<Vec<TimelineStat>> {
    let mut stmt = conn
        .prepare(
            "SELECT device_id, object_count, hash, updated_at FROM timeline_stats
             WHERE studio_id = ?1 ORDER BY device_id",
        )
        .map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map([studio_id.as_str()], |row| {
            Ok(TimelineStat {
                device_id: row.get(0)?,
                object_count: row.get::<_, i64>(1)? as usize,
                hash: row.get(2)?,
                updated_at: row.get(3)?,
            })
        })
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}

pub fn upsert_stat(conn: &Connection, studio_id: &StudioId, stat: &TimelineStat) -> Result<()> {
    conn.execute(
        "INSERT INTO timeline_stats (studio_id, device_id, object_count, hash, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(studio_id, device_id) DO UPDATE SET
            object_count = excluded.object_count,
            hash = excluded.hash,
            updated_at = excluded.updated_at",
        rusqlite::params![
            studio_id.as_str(),
            stat.device_id,
            stat.object_count as i64,
            stat.hash,
            stat.updated_at
        ],
    )
    .map_err(|e| Error::database(e.to_string()))?;
    Ok(())
}

pub fn delete_stat(conn: &Connection, studio_id: &StudioId, device_id: &str) -> Result<bool> {
    let n = conn
        .execute(
            "DELETE FROM timeline_stats WHERE studio_id = ?1 AND device_id = ?2",
            [studio_id.as_str(), device_id],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Decode one stored body; used when comparing against freshly compiled output.
pub fn decode_body(body: &str) -> Result<TimelineObject> {
    serde_json::from_str(body).map_err(|e| Error::database(format!("corrupt timeline body: {e}")))
}
