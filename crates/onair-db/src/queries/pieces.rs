//! Piece documents.

use rusqlite::Connection;
use onair_core::{Error, PartId, Piece, PieceId, Result, RundownId};

use crate::document::{encode, query_doc, query_docs};

pub fn upsert_piece(conn: &Connection, piece: &Piece) -> Result<()> {
    conn.execute(
        "INSERT INTO pieces (id, rundown_id, part_id, body) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(id) DO UPDATE SET
            rundown_id = excluded.rundown_id,
            part_id = excluded.part_id,
            body = excluded.body",
        rusqlite::params![
            piece.id.as_str(),
            piece.rundown_id.as_str(),
            piece.part_id.as_str(),
            encode(piece)?
        ],
    )
    .map_err(|e| Error::database(e.to_string()))?;
    Ok(())
}

pub fn get_piece(conn: &Connection, id: &PieceId) -> Result<Option<Piece>> {
    query_doc(conn, "SELECT body FROM pieces WHERE id = ?1", [id.as_str()])
}

pub fn list_pieces_for_part(conn: &Connection, part_id: &PartId) -> Result<Vec<Piece>> {
    query_docs(
        conn,
        "SELECT body FROM pieces WHERE part_id = ?1 ORDER BY rowid",
        [part_id.as_str()],
    )
}

/// Every piece in a rundown, in insertion order.
pub fn list_pieces_for_rundown(conn: &Connection, rundown_id: &RundownId) -> Result<Vec<Piece>> {
    query_docs(
        conn,
        "SELECT body FROM pieces WHERE rundown_id = ?1 ORDER BY rowid",
        [rundown_id.as_str()],
    )
}

pub fn delete_piece(conn: &Connection, id: &PieceId) -> Result<bool> {
    let n = conn
        .execute("DELETE FROM pieces WHERE id = ?1", [id.as_str()])
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Delete every piece on a part; returns how many were removed.
pub fn delete_pieces_for_part(conn: &Connection, part_id: &PartId) -> Result<usize> {
    conn.execute("DELETE FROM pieces WHERE part_id = ?1", [part_id.as_str()])
        .map_err(|e| Error::database(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{get_conn, init_memory_pool};
    use crate::queries::{parts, rundowns, segments, studios};
    use onair_core::{InfiniteMode, Part, Rundown, Segment, Studio};

    #[test]
    fn pieces_keep_insertion_order_and_fields() {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();
        studios::upsert_studio(&conn, &Studio::new("studio0", "A")).unwrap();
        rundowns::upsert_rundown(&conn, &Rundown::new("ro1", "studio0")).unwrap();
        segments::upsert_segment(&conn, &Segment::new("s1", "ro1", 0.0)).unwrap();
        parts::upsert_part(&conn, &Part::new("p1", "ro1", "s1", 0.0)).unwrap();

        let mut a = Piece::new("b_piece", "ro1", "p1", "gfx")
            .with_infinite_mode(InfiniteMode::OutOnNextPart);
        a.infinite_id = Some(PieceId::from("b_piece"));
        upsert_piece(&conn, &a).unwrap();
        upsert_piece(&conn, &Piece::new("a_piece", "ro1", "p1", "cam")).unwrap();

        let pieces = list_pieces_for_part(&conn, &PartId::from("p1")).unwrap();
        assert_eq!(pieces[0].id, PieceId::from("b_piece"));
        assert_eq!(pieces[0].infinite_mode, InfiniteMode::OutOnNextPart);
        assert_eq!(list_pieces_for_rundown(&conn, &RundownId::from("ro1")).unwrap().len(), 2);

        assert_eq!(delete_pieces_for_part(&conn, &PartId::from("p1")).unwrap(), 2);
        assert!(get_piece(&conn, &PieceId::from("a_piece")).unwrap().is_none());
    }
}
