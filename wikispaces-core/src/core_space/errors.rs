//! Error types for the namespace registry

use super::space::ValidationError;
use super::types::{SpaceId, UserId};
use thiserror::Error;

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors surfaced by the repository, the synchronizer and the store
#[derive(Error, Debug)]
pub enum RegistryError {
    /// Entity construction or mutation rejected a value
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// `create` was called with a space that is already persisted
    #[error("Space already exists: {0}")]
    AlreadyExists(SpaceId),

    /// The space to operate on is absent or not persisted
    #[error("No such space: {0}")]
    NotFound(String),

    /// The acting user lacks the rights for the operation
    #[error("Permission denied: {user} cannot {action}")]
    PermissionDenied { user: String, action: String },

    /// No schema ships for the configured store engine
    #[error("Unsupported store backend: {0}")]
    UnsupportedBackend(String),

    /// A uniqueness constraint rejected the write
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A stored user reference no longer resolves to an account
    #[error("Unknown user: {0}")]
    UnknownUser(UserId),

    /// Store operation failed
    #[error("Store error: {0}")]
    Store(String),

    /// Audit log sink failed
    #[error("Audit log error: {0}")]
    Audit(String),

    /// Collaborator call (group membership, listener) failed
    #[error("Collaborator error: {0}")]
    Collaborator(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl RegistryError {
    pub fn permission_denied(user: impl Into<String>, action: impl Into<String>) -> Self {
        RegistryError::PermissionDenied { user: user.into(), action: action.into() }
    }
}

impl From<rusqlite::Error> for RegistryError {
    fn from(e: rusqlite::Error) -> Self {
        match &e {
            rusqlite::Error::SqliteFailure(failure, message)
                if failure.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                RegistryError::Conflict(message.clone().unwrap_or_else(|| e.to_string()))
            }
            _ => RegistryError::Store(e.to_string()),
        }
    }
}

impl From<r2d2::Error> for RegistryError {
    fn from(e: r2d2::Error) -> Self {
        RegistryError::Store(format!("connection pool: {}", e))
    }
}

impl From<serde_json::Error> for RegistryError {
    fn from(e: serde_json::Error) -> Self {
        RegistryError::Serialization(e.to_string())
    }
}

/// True when a statement failed only because its table has not been created yet
pub(crate) fn is_missing_table(e: &rusqlite::Error) -> bool {
    matches!(e, rusqlite::Error::SqliteFailure(_, Some(message)) if message.starts_with("no such table"))
}
