//! Rundown documents, including the playout pointers.

use chrono::Utc;
use rusqlite::Connection;
use onair_core::{Error, Result, Rundown, RundownId, StudioId};

use crate::document::{encode, is_constraint_violation, query_doc, query_docs};

/// Insert or replace a rundown.
///
/// Fails with [`Error::Conflict`] if this would make a second rundown active
/// in the same studio.
pub fn upsert_rundown(conn: &Connection, rundown: &Rundown) -> Result<()> {
    conn.execute(
        "INSERT INTO rundowns (id, studio_id, active, body, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(id) DO UPDATE SET
            studio_id = excluded.studio_id,
            active = excluded.active,
            body = excluded.body,
            updated_at = excluded.updated_at",
        rusqlite::params![
            rundown.id.as_str(),
            rundown.studio_id.as_str(),
            rundown.active,
            encode(rundown)?,
            Utc::now().to_rfc3339()
        ],
    )
    .map_err(|e| {
        if is_constraint_violation(&e) && rundown.active {
            Error::Conflict(format!(
                "another rundown is already active in studio {}",
                rundown.studio_id
            ))
        } else {
            Error::database(e.to_string())
        }
    })?;
    Ok(())
}

pub fn get_rundown(conn: &Connection, id: &RundownId) -> Result<Option<Rundown>> {
    query_doc(conn, "SELECT body FROM rundowns WHERE id = ?1", [id.as_str()])
}

pub fn list_rundowns(conn: &Connection, studio_id: &StudioId) -> Result<Vec<Rundown>> {
    query_docs(
        conn,
        "SELECT body FROM rundowns WHERE studio_id = ?1 ORDER BY id",
        [studio_id.as_str()],
    )
}

/// The active rundown in a studio, if any.
pub fn get_active_rundown(conn: &Connection, studio_id: &StudioId) -> Result<Option<Rundown>> {
    query_doc(
        conn,
        "SELECT body FROM rundowns WHERE studio_id = ?1 AND active = 1",
        [studio_id.as_str()],
    )
}

/// Delete a rundown and, by cascade, everything it owns.
pub fn delete_rundown(conn: &Connection, id: &RundownId) -> Result<bool> {
    let n = conn
        .execute("DELETE FROM rundowns WHERE id = ?1", [id.as_str()])
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{get_conn, init_memory_pool};
    use crate::queries::studios::upsert_studio;
    use onair_core::{PartId, Studio};

    fn setup() -> crate::pool::PooledConnection {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();
        upsert_studio(&conn, &Studio::new("studio0", "A")).unwrap();
        conn
    }

    #[test]
    fn pointers_roundtrip() {
        let conn = setup();
        let mut rundown = Rundown::new("ro1", "studio0");
        rundown.next_part_id = Some(PartId::from("p1"));
        upsert_rundown(&conn, &rundown).unwrap();

        let got = get_rundown(&conn, &RundownId::from("ro1")).unwrap().unwrap();
        assert_eq!(got.next_part_id, Some(PartId::from("p1")));
        assert!(get_active_rundown(&conn, &StudioId::from("studio0"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn second_active_rundown_conflicts() {
        let conn = setup();
        let mut a = Rundown::new("ro1", "studio0");
        a.active = true;
        upsert_rundown(&conn, &a).unwrap();

        let mut b = Rundown::new("ro2", "studio0");
        upsert_rundown(&conn, &b).unwrap();
        b.active = true;
        let err = upsert_rundown(&conn, &b).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        let active = get_active_rundown(&conn, &StudioId::from("studio0"))
            .unwrap()
            .unwrap();
        assert_eq!(active.id, RundownId::from("ro1"));
    }

    #[test]
    fn delete_reports_existence() {
        let conn = setup();
        upsert_rundown(&conn, &Rundown::new("ro1", "studio0")).unwrap();
        assert!(delete_rundown(&conn, &RundownId::from("ro1")).unwrap());
        assert!(!delete_rundown(&conn, &RundownId::from("ro1")).unwrap());
    }
}
