//! # CloakFS Codec
//!
//! Reversible re-packing of byte streams between power-of-two
//! alphabets, plus the filesystem-safe alphabets used by encrypted
//! names.
//!
//! The name codec encrypts a path component and then re-packs the
//! ciphertext into 6-bit (or 5-bit) symbols mapped onto an alphabet
//! that contains neither `/` nor `.`. This crate owns that re-packing
//! and mapping; it knows nothing about ciphers.
//!
//! ## Example
//!
//! ```
//! use cloakfs_codec::{change_base_2, b64_to_ascii, ascii_to_b64};
//!
//! let mut symbols = change_base_2(b"secret", 8, 6).unwrap();
//! b64_to_ascii(&mut symbols);
//! // `symbols` is now a filesystem-safe name fragment.
//! ascii_to_b64(&mut symbols).unwrap();
//! let raw = change_base_2(&symbols, 6, 8).unwrap();
//! assert_eq!(&raw[..6], b"secret");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod alphabet;
mod base;
mod error;

pub use alphabet::{
    ascii_to_b32, ascii_to_b64, b32_to_ascii, b64_to_ascii, decode_standard_b64, B32_ALPHABET,
    B64_ALPHABET,
};
pub use base::{
    b256_to_b32_len, b256_to_b64_len, b32_to_b256_len, b64_to_b256_len, change_base_2,
    change_base_2_inline, converted_len,
};
pub use error::{CodecError, CodecResult};
