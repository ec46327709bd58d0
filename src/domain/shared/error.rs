//! Domain errors

use thiserror::Error;

/// Rule violations inside the call domain
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A negotiation or connection state change the session does not allow
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}
