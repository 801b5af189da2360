//! Rundown data model.
//!
//! Documents persisted by the store and consumed by the playout engine:
//! studios and their layer mappings, rundowns, segments, parts, pieces,
//! ad-lib pieces, and the compiled timeline objects.

mod part;
mod piece;
mod rundown;
mod studio;
mod timeline;

pub use part::*;
pub use piece::*;
pub use rundown::*;
pub use studio::*;
pub use timeline::*;
