//! Error types for the label index.

use thiserror::Error;

/// Result type alias for label operations.
pub type LabelResult<T> = Result<T, LabelError>;

/// Errors that can occur during label operations.
#[derive(Debug, Error)]
pub enum LabelError {
    #[error("not found: {0}")]
    NotFound(String),

    /// The label-type string names no known resource type.
    #[error("unsupported label type: {0}")]
    UnsupportedType(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    /// Provider tag sync failed; only ever logged, never surfaced to the
    /// primary operation's caller.
    #[error("csp tag sync failed: {0}")]
    TagSync(String),

    #[error("state store error: {0}")]
    State(#[from] stratus_state::StateError),
}
