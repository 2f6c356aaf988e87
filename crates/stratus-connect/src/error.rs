//! Error types for collaborator clients.

use thiserror::Error;

/// Result type alias for collaborator calls.
pub type ConnectResult<T> = Result<T, ConnectError>;

/// Errors raised while talking to an external collaborator.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// Transport-level failure (connect, timeout, TLS).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-2xx response. The message is the raw response body so that
    /// provider-specific diagnostic detail is preserved verbatim.
    #[error("{0}")]
    Api(String),

    /// Response body could not be decoded into the expected shape.
    #[error("decode error: {0}")]
    Decode(String),
}

impl ConnectError {
    /// Build an `Api` error from a status code and response body, falling
    /// back to the status line when the body is empty.
    pub fn from_response(status: reqwest::StatusCode, body: String) -> Self {
        if body.is_empty() {
            ConnectError::Api(status.to_string())
        } else {
            ConnectError::Api(body)
        }
    }
}
