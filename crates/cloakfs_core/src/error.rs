//! Error types for the CloakFS core.

use cloakfs_cipher::CipherError;
use cloakfs_codec::CodecError;
use cloakfs_storage::StorageError;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Transport-independent classification of a [`CoreError`].
///
/// Callers binding the core to a host filesystem translate these to
/// their own error space (errno, NTSTATUS, …).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A named algorithm or key is absent.
    NotFound,
    /// A descriptor is present but no compatible implementation exists.
    Unsupported,
    /// Wrong password or corrupted wrapped key.
    BadKey,
    /// MAC mismatch or structurally invalid block.
    Integrity,
    /// The backing store failed.
    Io,
    /// The RNG failed while strong bytes were required.
    Entropy,
    /// A caller violated a precondition.
    Invalid,
}

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Backing-store error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Cipher-layer error.
    #[error("cipher error: {0}")]
    Cipher(#[from] CipherError),

    /// Base-conversion or alphabet error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// A block failed its MAC check or is structurally invalid.
    #[error("integrity failure in block {block}")]
    Integrity {
        /// Index of the offending block (`u64::MAX` for the header).
        block: u64,
    },

    /// An encoded name failed its embedded checksum on decode.
    #[error("checksum mismatch in filename decode")]
    BadName,

    /// The file handle saw an earlier unrecoverable error; only close
    /// is still valid.
    #[error("file handle degraded by earlier {kind:?} error")]
    Degraded {
        /// Kind of the error that degraded the handle.
        kind: ErrorKind,
    },

    /// The file handle is closed.
    #[error("file is closed")]
    Closed,

    /// The volume configuration names an algorithm with no compatible
    /// implementation.
    #[error("unsupported volume configuration: {message}")]
    Unsupported {
        /// What could not be satisfied.
        message: String,
    },

    /// The volume configuration is structurally invalid.
    #[error("invalid volume configuration: {message}")]
    BadConfig {
        /// Description of the problem.
        message: String,
    },

    /// A caller violated a precondition.
    #[error("invalid argument: {message}")]
    Invalid {
        /// Description of the violated precondition.
        message: String,
    },
}

impl CoreError {
    /// Creates an unsupported-configuration error.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported {
            message: message.into(),
        }
    }

    /// Creates a bad-configuration error.
    pub fn bad_config(message: impl Into<String>) -> Self {
        Self::BadConfig {
            message: message.into(),
        }
    }

    /// Creates an invalid-argument error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// The transport-independent kind of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Storage(StorageError::Io(_)) => ErrorKind::Io,
            Self::Storage(StorageError::InvalidAccess { .. }) => ErrorKind::Invalid,
            Self::Cipher(CipherError::NotFound { .. }) => ErrorKind::NotFound,
            Self::Cipher(CipherError::Unsupported { .. }) => ErrorKind::Unsupported,
            Self::Cipher(CipherError::BadKey) => ErrorKind::BadKey,
            Self::Cipher(CipherError::Entropy) => ErrorKind::Entropy,
            Self::Cipher(CipherError::Invalid { .. }) | Self::Codec(_) => ErrorKind::Invalid,
            Self::Integrity { .. } | Self::BadName => ErrorKind::Integrity,
            Self::Degraded { kind } => *kind,
            Self::Closed | Self::Invalid { .. } | Self::BadConfig { .. } => ErrorKind::Invalid,
            Self::Unsupported { .. } => ErrorKind::Unsupported,
        }
    }
}
