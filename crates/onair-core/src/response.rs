//! Structured result returned to callers of user actions.
//!
//! Internal code propagates [`Error`] with `?`; only the outermost
//! command handler turns a `Result` into a [`ClientResponse`].

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Success payload or numeric-coded failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ClientResponse<T> {
    /// The action succeeded.
    Success { result: T },
    /// The action failed; `code` mirrors [`Error::code`].
    Error { code: u16, message: String },
}

impl<T> ClientResponse<T> {
    /// Wrap a successful value.
    pub fn success(result: T) -> Self {
        ClientResponse::Success { result }
    }

    /// Build a failure from an error.
    pub fn error(err: &Error) -> Self {
        ClientResponse::Error {
            code: err.code(),
            message: err.to_string(),
        }
    }

    /// Whether this is a success.
    pub fn is_success(&self) -> bool {
        matches!(self, ClientResponse::Success { .. })
    }

    /// The failure code, if any.
    pub fn error_code(&self) -> Option<u16> {
        match self {
            ClientResponse::Success { .. } => None,
            ClientResponse::Error { code, .. } => Some(*code),
        }
    }

    /// Consume and return the success value, if any.
    pub fn into_result(self) -> Option<T> {
        match self {
            ClientResponse::Success { result } => Some(result),
            ClientResponse::Error { .. } => None,
        }
    }
}

impl<T> From<Result<T>> for ClientResponse<T> {
    fn from(res: Result<T>) -> Self {
        match res {
            Ok(v) => ClientResponse::success(v),
            Err(e) => {
                if e.is_user_error() {
                    tracing::info!(code = e.code(), "User action rejected: {e}");
                } else {
                    tracing::error!(code = e.code(), "User action failed: {e}");
                }
                ClientResponse::error(&e)
            }
        }
    }
}
