//! JSON body encoding shared by the query modules.

use onair_core::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Serialize a document to its stored JSON body.
pub fn encode<T: Serialize>(doc: &T) -> Result<String> {
    serde_json::to_string(doc).map_err(|e| Error::Internal(format!("encode document: {e}")))
}

/// Decode a JSON body read from column `idx` of `row`.
pub fn decode_column<T: DeserializeOwned>(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let body: String = row.get(idx)?;
    serde_json::from_str(&body).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Whether a rusqlite error is a constraint violation (unique, foreign key).
pub fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

/// Run a query returning JSON bodies in the first column.
pub fn query_docs<T, P>(conn: &rusqlite::Connection, sql: &str, params: P) -> Result<Vec<T>>
where
    T: DeserializeOwned,
    P: rusqlite::Params,
{
    let mut stmt = conn.prepare(sql).map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map(params, |row| decode_column(row, 0))
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<T>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}

/// Run a query returning at most one JSON body.
pub fn query_doc<T, P>(conn: &rusqlite::Connection, sql: &str, params: P) -> Result<Option<T>>
where
    T: DeserializeOwned,
    P: rusqlite::Params,
{
    match conn.query_row(sql, params, |row| decode_column(row, 0)) {
        Ok(doc) => Ok(Some(doc)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}
