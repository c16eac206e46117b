//! Error taxonomy shared by both storage backends and the dispatcher.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Storage operation errors.
///
/// Backends report the most specific variant they can; the dispatcher
/// forwards whatever the backend returned without rewriting it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("creation failed: {0}")]
    CreationFailed(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("unknown storage type for location: {0}")]
    ClassificationUnknown(String),
    #[error("invalid location: {0}")]
    InvalidLocation(String),
}

impl StorageError {
    /// Stable machine-readable code, for bridge layers that reject with a code
    /// and a message.
    pub fn code(&self) -> &'static str {
        match self {
            StorageError::NotFound(_) => "not_found",
            StorageError::PermissionDenied(_) => "permission_denied",
            StorageError::Unsupported(_) => "unsupported",
            StorageError::CreationFailed(_) => "creation_failed",
            StorageError::Io(_) => "io",
            StorageError::ClassificationUnknown(_) => "classification_unknown",
            StorageError::InvalidLocation(_) => "invalid_location",
        }
    }

    /// Human-readable detail without the variant prefix.
    pub fn detail(&self) -> &str {
        match self {
            StorageError::NotFound(s)
            | StorageError::PermissionDenied(s)
            | StorageError::Unsupported(s)
            | StorageError::CreationFailed(s)
            | StorageError::Io(s)
            | StorageError::ClassificationUnknown(s)
            | StorageError::InvalidLocation(s) => s,
        }
    }

    /// Returns true for `NotFound`.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::NotFound => StorageError::NotFound(err.to_string()),
            ErrorKind::PermissionDenied => StorageError::PermissionDenied(err.to_string()),
            ErrorKind::Unsupported => StorageError::Unsupported(err.to_string()),
            _ => StorageError::Io(err.to_string()),
        }
    }
}
