//! Domain-specific error types following panic-free policy.

use thiserror::Error;

/// Errors that can occur while constructing domain values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A required identity field was absent or empty
    #[error("{field} parameter is required")]
    MissingField { field: &'static str },
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
