//! Error types for cipher operations.

use thiserror::Error;

/// Result type for cipher operations.
pub type CipherResult<T> = Result<T, CipherError>;

/// Errors that can occur during cipher construction and use.
#[derive(Debug, Error)]
pub enum CipherError {
    /// No algorithm registered under the requested family name.
    #[error("no cipher registered for family {family:?}")]
    NotFound {
        /// The family name that was looked up.
        family: String,
    },

    /// An algorithm exists but cannot satisfy the requested descriptor.
    #[error("no compatible implementation for descriptor {descriptor}")]
    Unsupported {
        /// Rendered form of the rejected descriptor.
        descriptor: String,
    },

    /// Key unwrap failed its integrity check, or the wrapped blob is
    /// structurally wrong. Treated as an authentication failure.
    #[error("key integrity check failed")]
    BadKey,

    /// The strong entropy source failed while key-grade bytes were
    /// required.
    #[error("entropy source failure")]
    Entropy,

    /// A caller-violated precondition.
    #[error("invalid argument: {message}")]
    Invalid {
        /// Description of the violated precondition.
        message: String,
    },
}

impl CipherError {
    /// Creates a not-found error.
    pub fn not_found(family: impl Into<String>) -> Self {
        Self::NotFound {
            family: family.into(),
        }
    }

    /// Creates an unsupported-descriptor error.
    pub fn unsupported(descriptor: impl ToString) -> Self {
        Self::Unsupported {
            descriptor: descriptor.to_string(),
        }
    }

    /// Creates an invalid-argument error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}
