//! Error types for provisioning workflows.
//!
//! Collaborator errors keep the raw response detail in the message
//! (`"<action> <id> failed: <detail>"`) so provider-specific diagnostics
//! survive all the way to the bulk-operation status strings.

use thiserror::Error;

/// Result type alias for provisioning operations.
pub type ProvisionResult<T> = Result<T, ProvisionError>;

/// Errors that can occur while driving a provisioning workflow.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("already exists: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// The operator withdrew a held creation; the bare record is gone.
    #[error("{0}")]
    Withdrawn(String),

    /// The adaptive-backoff poll ran out of deadline. The record stays in
    /// its last-observed state so the caller can retry.
    #[error("deadline exceeded: {0}")]
    DeadlineExceeded(String),

    #[error("{0}")]
    Collaborator(String),

    #[error("state store error: {0}")]
    State(#[from] stratus_state::StateError),

    #[error("label index error: {0}")]
    Label(#[from] stratus_label::LabelError),
}

impl ProvisionError {
    pub fn is_not_found(&self) -> bool {
        match self {
            ProvisionError::NotFound(_) => true,
            ProvisionError::State(e) => e.is_not_found(),
            _ => false,
        }
    }
}

/// Build the standard collaborator-failure message.
pub(crate) fn collaborator_failure(
    action: &str,
    id: &str,
    detail: impl std::fmt::Display,
) -> ProvisionError {
    ProvisionError::Collaborator(format!("{action} {id} failed: {detail}"))
}
