//! Onair - broadcast rundown playout controller
//!
//! This library crate exposes config loading and fixture import for the
//! binary and for integration testing.

pub mod config;
pub mod fixture;
