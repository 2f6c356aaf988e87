//! Error types for the Stratus resource store.

use thiserror::Error;

/// Result type alias for resource store operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur during resource store operations.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to open database: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    Conflict(String),

    #[error("validation error: {0}")]
    Validation(String),

    /// A collaborator call failed. The message keeps the collaborator's
    /// raw diagnostic text.
    #[error("{0}")]
    Collaborator(String),
}

impl StateError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StateError::NotFound(_))
    }
}
