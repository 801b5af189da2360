//! Studio documents.

use chrono::Utc;
use rusqlite::Connection;
use onair_core::{Error, Result, Studio, StudioId};

use crate::document::{encode, query_doc, query_docs};

/// Insert or replace a studio.
pub fn upsert_studio(conn: &Connection, studio: &Studio) -> Result<()> {
    conn.execute(
        "INSERT INTO studios (id, body, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(id) DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at",
        rusqlite::params![studio.id.as_str(), encode(studio)?, Utc::now().to_rfc3339()],
    )
    .map_err(|e| Error::database(e.to_string()))?;
    Ok(())
}

pub fn get_studio(conn: &Connection, id: &StudioId) -> Result<Option<Studio>> {
    query_doc(conn, "SELECT body FROM studios WHERE id = ?1", [id.as_str()])
}

pub fn list_studios(conn: &Connection) -> Result<Vec<Studio>> {
    query_docs(conn, "SELECT body FROM studios ORDER BY id", [])
}
