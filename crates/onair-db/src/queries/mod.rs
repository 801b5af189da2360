//! Query modules, one per collection.

pub mod adlibs;
pub mod baseline;
pub mod parts;
pub mod pieces;
pub mod rundowns;
pub mod segments;
pub mod studios;
pub mod timeline;
