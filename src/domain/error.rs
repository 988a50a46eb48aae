//! Domain errors

use thiserror::Error;

/// Errors reported by charge point services
#[derive(Debug, Clone, Error)]
pub enum DomainError {
    #[error("Storage error: {0}")]
    StorageError(String),
}

/// Result type for domain operations
pub type DomainResult<T> = Result<T, DomainError>;
