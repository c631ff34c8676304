//! Error types for cluster configuration changes

use thiserror::Error;

/// Result type for configuration change operations
pub type ConfigurationResult<T> = Result<T, ConfigurationError>;

/// Errors surfaced by the change coordinator and the operation appliers
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// The change request itself is invalid, or validating the requested
    /// operations against the current configuration failed
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Another change is already in progress, or the configuration changed
    /// between validation and persist
    #[error("Concurrent modification: {0}")]
    ConcurrentModification(String),

    /// The request was sent to a member that is not the coordinator and was
    /// not marked as forced
    #[error("Operation not allowed: {0}")]
    OperationNotAllowed(String),

    /// Any other unexpected failure
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConfigurationError {
    /// Fold any error into the `InvalidRequest` class, preserving an already
    /// classified invalid request unchanged. Used when request evaluation or
    /// simulation fails: the caller only ever sees a validation failure.
    pub fn into_invalid_request(self) -> Self {
        match self {
            err @ ConfigurationError::InvalidRequest(_) => err,
            other => ConfigurationError::InvalidRequest(other.to_string()),
        }
    }
}
