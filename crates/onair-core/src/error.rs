//! Unified error type for onair.
//!
//! All crates funnel their failures into [`Error`], which carries enough
//! context for the user-action layer to derive the numeric code surfaced to
//! callers via [`Error::code`].

use std::fmt;

/// Unified error type covering all failure modes in onair.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested entity could not be found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g. "rundown", "part").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// Request data failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The operation conflicts with existing state (e.g. another rundown is
    /// already active in the studio).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The rundown is not in a state that permits the operation.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The operation was issued too soon after a previous one.
    #[error("Too soon: {0}")]
    TooSoon(String),

    /// Studio or mapping configuration is missing or unusable.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The blueprint returned an error or invalid output.
    #[error("Blueprint error: {0}")]
    Blueprint(String),

    /// The timeline could not be compiled.
    #[error("Timeline error: {0}")]
    Timeline(String),

    /// A database operation failed.
    #[error("Database error: {source}")]
    Database {
        /// The underlying database error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Numeric code surfaced to callers of user actions.
    pub fn code(&self) -> u16 {
        match self {
            Error::NotFound { .. } => 404,
            Error::Validation(_) => 400,
            Error::Conflict(_) => 409,
            Error::InvalidState(_) => 412,
            Error::TooSoon(_) => 429,
            Error::Configuration(_) => 500,
            Error::Blueprint(_) => 502,
            Error::Timeline(_) => 500,
            Error::Database { .. } => 500,
            Error::Io { .. } => 500,
            Error::Internal(_) => 500,
        }
    }

    /// Whether this is an expected operator/user error rather than a fault.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Error::NotFound { .. }
                | Error::Validation(_)
                | Error::Conflict(_)
                | Error::InvalidState(_)
                | Error::TooSoon(_)
        )
    }

    /// Convenience constructor for [`Error::NotFound`].
    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Error::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Convenience constructor for [`Error::Database`].
    pub fn database(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Error::Database {
            source: source.into(),
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
