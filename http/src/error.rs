//! Error types for the reqwest-backed client

use thiserror::Error;

/// Errors produced by [`ReqwestClient`](crate::ReqwestClient)
///
/// Cloneable so it can live inside `RequestState::Error` snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HttpError {
    /// The request was cancelled before it settled
    #[error("Request cancelled")]
    Cancelled,

    /// The URL could not be parsed or joined with the base URL
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl {
        /// URL as given in the request config
        url: String,
        /// Parser message
        reason: String,
    },

    /// Building the underlying client failed
    #[error("Client build failed: {0}")]
    Build(String),

    /// Network or protocol failure
    #[error("Request failed: {0}")]
    Transport(String),

    /// Server answered with a non-success status
    #[error("HTTP error (status {status}): {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, lossily decoded
        body: String,
    },

    /// Response body exceeded the configured limit
    #[error("Response too large (>{0} bytes)")]
    TooLarge(usize),

    /// Response body was not valid JSON
    #[error("Response parsing failed: {0}")]
    Decode(String),
}

impl HttpError {
    /// Status code for [`HttpError::Status`]
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}
