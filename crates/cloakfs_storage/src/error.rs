//! Error types for backing-store operations.

use std::io;
use thiserror::Error;

/// Result type for backing-store operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur in a backing store.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error from the host filesystem.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A write or truncate with impossible coordinates.
    #[error("invalid store access: {message}")]
    InvalidAccess {
        /// Description of the rejected access.
        message: String,
    },
}

impl StorageError {
    /// Creates an invalid-access error.
    pub fn invalid_access(message: impl Into<String>) -> Self {
        Self::InvalidAccess {
            message: message.into(),
        }
    }
}
