//! Domain error types

use thiserror::Error;

/// Domain-level errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Invalid target kind: {0}")]
    InvalidTargetKind(String),

    #[error("Invalid label selector: {0}")]
    InvalidSelector(String),

    #[error("Partial transform failed for tool {tool}: {reason}")]
    PartialTransform { tool: String, reason: String },

    #[error("Invalid phase transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Operation cancelled")]
    Cancelled,
}

impl DomainError {
    /// Check if this error represents a cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DomainError::Cancelled)
    }
}
