//! twfs Protocol - remote API model and operation contract.
//!
//! This crate defines:
//! - JSON models of statuses, users and direct messages
//! - The REST endpoint table
//! - The `TwitterApi` trait the filesystem translator drives
//! - The `FetchError` taxonomy for failed remote operations

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod api;
pub mod endpoints;
pub mod model;

pub use api::TwitterApi;
pub use model::{ApiErrorBody, DirectMessage, Status, User, UserPage};

use thiserror::Error;

/// Errors from remote operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Connection could not be established or broke mid-request
    #[error("Transport failure: {0}")]
    TransportFailure(String),

    /// TLS handshake or certificate failure
    #[error("TLS failure: {0}")]
    TlsFailure(String),

    /// The transport gave up waiting
    #[error("Request timed out")]
    Timeout,

    /// Credentials rejected
    #[error("Authentication failed: {0}")]
    AuthFailure(String),

    /// Rate limit window exhausted
    #[error("Rate limited (resets at {reset_at:?})")]
    RateLimited {
        /// Unix seconds at which the window resets, if reported
        reset_at: Option<i64>,
    },

    /// The service refused the request
    #[error("Remote rejected request ({status}): {reason}")]
    RemoteRejected {
        /// HTTP status code
        status: u16,
        /// Service-provided reason
        reason: String,
    },

    /// Response body could not be decoded
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

impl FetchError {
    /// Returns true if the remote resource does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchError::RemoteRejected { status: 404, .. })
    }

    /// Returns true if retrying later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FetchError::TransportFailure(_) | FetchError::Timeout | FetchError::RateLimited { .. }
        )
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        FetchError::MalformedResponse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_classification() {
        let err = FetchError::RemoteRejected {
            status: 404,
            reason: "No status found with that ID.".into(),
        };
        assert!(err.is_not_found());
        assert!(!err.is_transient());
        assert!(FetchError::Timeout.is_transient());
    }

    #[test]
    fn test_json_error_is_malformed() {
        let err: FetchError = serde_json::from_str::<Status>("{").unwrap_err().into();
        assert!(matches!(err, FetchError::MalformedResponse(_)));
    }
}
