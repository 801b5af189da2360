//! onair-playout: the playout controller.
//!
//! - [`service`] runs the rundown state machine (activate, take, hold,
//!   next-part moves, ad-libs), ingest, and gateway playback callbacks.
//! - [`infinites`] propagates pieces that outlive their part.
//! - [`timeline`] compiles the studio timeline; [`lookahead`] adds
//!   preloads for upcoming content.
//! - [`store`] persists the timeline with per-device change stats.
//! - [`blueprint`] is the pluggable content generator seam.

pub mod actions;
pub mod blueprint;
pub mod context;
pub mod debounce;
pub mod infinites;
pub mod locks;
pub mod lookahead;
pub mod notify;
pub mod ordering;
pub mod service;
pub mod store;
pub mod timeline;

pub use actions::UserActions;
pub use blueprint::{Blueprint, BlueprintOutput, BlueprintRegistry, PassthroughBlueprint};
pub use context::BlueprintContext;
pub use notify::Notifier;
pub use ordering::Playlist;
pub use service::PlayoutService;
pub use store::TimelineDiff;
pub use timeline::{compile_timeline, CompileInput, CompileOptions};
