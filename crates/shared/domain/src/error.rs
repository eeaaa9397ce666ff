//! Domain-level errors.
//!
//! These errors represent malformed contract input (sort orders, schema
//! descriptors). They are independent of any storage backend.

use thiserror::Error;

/// Domain-specific errors for contract violations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Validation failed for a field or input
    #[error("Validation error: {0}")]
    Validation(String),

    /// A resource schema descriptor could not be parsed
    #[error("Invalid resource schema: {0}")]
    InvalidSchema(String),
}

impl DomainError {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        DomainError::Validation(msg.into())
    }

    /// Create a schema error
    pub fn invalid_schema(msg: impl Into<String>) -> Self {
        DomainError::InvalidSchema(msg.into())
    }
}

/// Result type alias for domain operations
pub type DomainResult<T> = Result<T, DomainError>;
