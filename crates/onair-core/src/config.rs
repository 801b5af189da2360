//! Application configuration types.
//!
//! The top-level [`Config`] struct carries the playout tunables and the
//! database location. Every section defaults sensibly so a completely empty
//! `{}` (or empty TOML file) is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::Error;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub playout: PlayoutConfig,
    pub database: DatabaseConfig,
}

impl Config {
    /// Deserialize a `Config` from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::Validation(format!("config parse error: {e}")))
    }

    /// Load configuration from a JSON file path, falling back to defaults if
    /// the path is `None` or the file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.playout.min_take_span_ms == 0 {
            warnings.push("playout.min_take_span_ms is 0; rapid double takes will not be filtered".into());
        }
        if self.playout.recompute_debounce_ms == 0 {
            warnings.push(
                "playout.recompute_debounce_ms is 0; bursty ingest will recompute on every update"
                    .into(),
            );
        }
        if self.playout.max_lookahead_parts == 0 {
            warnings.push("playout.max_lookahead_parts is 0; lookahead is effectively disabled".into());
        }
        if !(self.playout.rank_epsilon > 0.0) {
            warnings.push(format!(
                "playout.rank_epsilon must be positive (got {})",
                self.playout.rank_epsilon
            ));
        }
        if !self.playout.strict_mappings {
            warnings.push(
                "playout.strict_mappings is off; objects on unmapped layers will be dropped".into(),
            );
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Playout state machine and timeline compiler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayoutConfig {
    /// Minimum interval between two takes on the same rundown.
    pub min_take_span_ms: u64,
    /// Quiet period before a coalesced recompute runs.
    pub recompute_debounce_ms: u64,
    /// How many parts ahead the lookahead planner searches.
    pub max_lookahead_parts: usize,
    /// Halt compilation on objects whose layer has no mapping.
    pub strict_mappings: bool,
    /// Smallest gap between adjacent ranks before a rebalance.
    pub rank_epsilon: f64,
}

impl Default for PlayoutConfig {
    fn default() -> Self {
        Self {
            min_take_span_ms: 1000,
            recompute_debounce_ms: 1000,
            max_lookahead_parts: 10,
            strict_mappings: true,
            rank_epsilon: 1e-9,
        }
    }
}

/// Database settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("onair.db"),
        }
    }
}
