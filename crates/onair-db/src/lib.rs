//! onair-db: document persistence for rundowns, parts, pieces and timelines.
//!
//! Documents are stored as JSON bodies keyed by id, with the owner and
//! ordering columns the playout engine queries on pulled out alongside.
//! Callers that need an atomic batch open a transaction with
//! [`rusqlite::Connection::unchecked_transaction`] and pass it to the query
//! functions, which all take `&Connection`.

pub mod document;
pub mod migrations;
pub mod pool;
pub mod queries;

pub use pool::{get_conn, init_memory_pool, init_pool, DbPool, PooledConnection};
