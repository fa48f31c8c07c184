//! Error types for codec operations.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur during base conversion or alphabet mapping.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// A symbol width outside the supported 1..=8 bit range.
    #[error("invalid symbol width: {bits} bits (must be 1..=8)")]
    InvalidSymbolWidth {
        /// The rejected width.
        bits: u32,
    },

    /// An input byte outside the active alphabet.
    #[error("invalid character in encoded input: {byte:#04x}")]
    InvalidChar {
        /// The offending byte.
        byte: u8,
    },

    /// Encoded input whose length is impossible for the alphabet.
    #[error("invalid encoded length: {len}")]
    InvalidLength {
        /// The rejected length.
        len: usize,
    },
}
