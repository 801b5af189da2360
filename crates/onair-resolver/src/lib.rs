//! onair-resolver: temporal expression resolution for device timelines.
//!
//! - [`expr`] parses `#id.start + 200` style expressions.
//! - [`resolve`] turns a set of [`TimelineObject`](onair_core::TimelineObject)s
//!   into absolute start/end times, flagging objects it cannot place.
//! - [`layer_state_at`] answers "what is on each layer at time T".
//! - [`snap_now`] pins `now` triggers to a concrete epoch.

pub mod expr;
pub mod resolver;
pub mod state;

pub use expr::{parse, parse_logical, referenced_ids, rename_references, ParseError};
pub use resolver::{
    reset_now, resolve, snap_now, Resolution, ResolveOptions, Resolved, Unresolved,
    UnresolvedReason,
};
pub use state::layer_state_at;
