//! onair-core: shared types, IDs, errors, configuration, and event system.
//!
//! This crate is the foundational dependency for all other onair crates,
//! providing typed identifiers, a unified error type with numeric codes,
//! the rundown/part/piece/timeline data model, application configuration,
//! a clock abstraction and a broadcast event bus.

pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod ids;
pub mod model;
pub mod rank;
pub mod response;

// Re-export the most commonly used items at the crate root.
pub use clock::{Clock, ManualClock, SystemClock, Time};
pub use error::{Error, Result};
pub use ids::*;
pub use model::*;
pub use response::ClientResponse;
