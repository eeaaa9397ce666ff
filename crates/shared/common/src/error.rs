//! Unified error handling for every data provider.
//!
//! Backends, decorators and the factory all report failures through
//! [`AppError`], so callers can decide retry policy without knowing which
//! backend served the call.

use std::fmt::Display;

use domain::DomainError;
use thiserror::Error;

/// Application error types.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    // Resource errors
    #[error("{resource} record not found: {id}")]
    NotFound { resource: String, id: String },

    #[error("Unknown resource: {0}")]
    UnknownResource(String),

    // Backend errors
    #[error("{operation} on {resource} failed: {message}")]
    BackendOperationFailed {
        resource: String,
        operation: String,
        message: String,
    },

    // Configuration
    #[error("Unknown provider type: {0}")]
    UnknownProviderType(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // Validation
    #[error("{0}")]
    Validation(String),

    // Internal
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Get stable error code for callers
    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotFound { .. } => "NOT_FOUND",
            AppError::UnknownResource(_) => "UNKNOWN_RESOURCE",
            AppError::BackendOperationFailed { .. } => "BACKEND_OPERATION_FAILED",
            AppError::UnknownProviderType(_) => "UNKNOWN_PROVIDER_TYPE",
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// True when the error reports a missing record
    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::NotFound { .. })
    }
}

// =============================================================================
// Domain Error Conversion
// =============================================================================

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) => AppError::Validation(msg),
            DomainError::InvalidSchema(msg) => AppError::Configuration(msg),
        }
    }
}

/// Result type alias
pub type AppResult<T> = Result<T, AppError>;

/// Extension trait for Option -> AppError conversion
pub trait OptionExt<T> {
    fn ok_or_not_found(self, resource: &str, id: impl Display) -> AppResult<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_not_found(self, resource: &str, id: impl Display) -> AppResult<T> {
        self.ok_or_else(|| AppError::not_found(resource, id))
    }
}

/// Convenience constructors
impl AppError {
    pub fn not_found(resource: impl Into<String>, id: impl Display) -> Self {
        AppError::NotFound {
            resource: resource.into(),
            id: id.to_string(),
        }
    }

    /// Wrap an underlying store failure with operation context
    pub fn backend(
        resource: impl Into<String>,
        operation: impl Into<String>,
        source: impl Display,
    ) -> Self {
        AppError::BackendOperationFailed {
            resource: resource.into(),
            operation: operation.into(),
            message: source.to_string(),
        }
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        AppError::Configuration(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        AppError::Internal(msg.into())
    }
}
