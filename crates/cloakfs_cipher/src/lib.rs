//! # CloakFS Cipher
//!
//! The cipher layer of CloakFS: a polymorphic contract over symmetric
//! block/stream encryption, keyed MACs and password-based key
//! derivation, plus the registry that instantiates a concrete family
//! from a descriptor found in a volume configuration.
//!
//! ## Security model
//!
//! - Key material lives in shared, opaque [`CipherKey`] handles and is
//!   zeroized when the last handle drops
//! - Key comparison is constant-time
//! - Keys at rest are wrapped under another key with an embedded keyed
//!   checksum; a checksum mismatch is an authentication failure
//! - Two entropy tiers: the OS CSPRNG for keys, a fast generator for
//!   IVs and MAC salts
//!
//! ## Usage
//!
//! ```
//! use cloakfs_cipher::registry;
//!
//! let cipher = registry().new_cipher_by_name("aes", 256).unwrap();
//! let key = cipher.new_random_key().unwrap();
//!
//! let mut block = vec![0u8; 64];
//! cipher.block_encode(&mut block, 7, &key).unwrap();
//! cipher.block_decode(&mut block, 7, &key).unwrap();
//! assert_eq!(block, vec![0u8; 64]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod aes;
mod cipher;
mod descriptor;
mod entropy;
mod error;
mod key;
mod null;
mod registry;

pub use aes::AesCipher;
pub use cipher::Cipher;
pub use descriptor::Descriptor;
pub use entropy::fill_random;
pub use error::{CipherError, CipherResult};
pub use key::{decode_key_from_string, encode_key_to_string, CipherKey};
pub use null::NullCipher;
pub use registry::{registry, CipherAlgorithm, Constructor, Range, Registry};
