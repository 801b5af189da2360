//! Ad-lib piece documents.

use rusqlite::Connection;
use onair_core::{AdLibPiece, AdLibPieceId, Error, PartId, Result, RundownId};

use crate::document::{encode, query_doc, query_docs};

pub fn upsert_adlib(conn: &Connection, adlib: &AdLibPiece) -> Result<()> {
    conn.execute(
        "INSERT INTO adlib_pieces (id, rundown_id, part_id, rank, body) VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(id) DO UPDATE SET
            rundown_id = excluded.rundown_id,
            part_id = excluded.part_id,
            rank = excluded.rank,
            body = excluded.body",
        rusqlite::params![
            adlib.id.as_str(),
            adlib.rundown_id.as_str(),
            adlib.part_id.as_str(),
            adlib.rank,
            encode(adlib)?
        ],
    )
    .map_err(|e| Error::database(e.to_string()))?;
    Ok(())
}

pub fn get_adlib(conn: &Connection, id: &AdLibPieceId) -> Result<Option<AdLibPiece>> {
    query_doc(conn, "SELECT body FROM adlib_pieces WHERE id = ?1", [id.as_str()])
}

pub fn list_adlibs_for_part(conn: &Connection, part_id: &PartId) -> Result<Vec<AdLibPiece>> {
    query_docs(
        conn,
        "SELECT body FROM adlib_pieces WHERE part_id = ?1 ORDER BY rank, id",
        [part_id.as_str()],
    )
}

pub fn list_adlibs_for_rundown(conn: &Connection, rundown_id: &RundownId) -> Result<Vec<AdLibPiece>> {
    query_docs(
        conn,
        "SELECT body FROM adlib_pieces WHERE rundown_id = ?1 ORDER BY rank, id",
        [rundown_id.as_str()],
    )
}

pub fn delete_adlibs_for_part(conn: &Connection, part_id: &PartId) -> Result<usize> {
    conn.execute("DELETE FROM adlib_pieces WHERE part_id = ?1", [part_id.as_str()])
        .map_err(|e| Error::database(e.to_string()))
}
