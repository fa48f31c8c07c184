//! # CloakFS Core
//!
//! The stateful core of CloakFS, a transparent stackable encrypting
//! filesystem layer:
//!
//! - Volume configuration persisted in the ciphertext root and treated
//!   as ground truth on open
//! - Filename codecs turning plaintext path components into
//!   filesystem-safe ciphertext and back, with optional directory-IV
//!   chaining
//! - The block-oriented encrypted file layer translating arbitrary
//!   byte-offset reads and writes into aligned, IV-chained cipher
//!   operations with per-block MAC verification
//!
//! Host-OS mounting, password prompting and CLI tooling are external
//! collaborators; the core exposes only synchronous calls over the
//! [`cloakfs_storage::BackingStore`] abstraction.
//!
//! ## Usage
//!
//! ```
//! use cloakfs_core::{Volume, VolumeParams};
//! use cloakfs_storage::MemoryStore;
//! use std::sync::Arc;
//!
//! let params = VolumeParams {
//!     kdf_iterations: 64, // fixed count; 0 would calibrate
//!     ..VolumeParams::default()
//! };
//! let volume = Volume::create(&params, b"correct horse").unwrap();
//!
//! let store = Arc::new(MemoryStore::new());
//! let file = volume.open_file(store).unwrap();
//! file.write(0, b"plaintext bytes").unwrap();
//!
//! let mut buf = [0u8; 15];
//! file.read(0, &mut buf).unwrap();
//! assert_eq!(&buf, b"plaintext bytes");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod file;
mod names;
mod volume;

pub use config::{VolumeConfig, CONFIG_FILE_NAME};
pub use error::{CoreError, CoreResult, ErrorKind};
pub use file::{EncryptedFile, FileOptions, HEADER_BLOCK_INDEX};
pub use names::{
    decode_path, encode_path, name_registry, BlockNameCodec, NameCodec, NameCodecConstructor,
    NameCodecInfo, NameCodecRegistry, NullNameCodec, StreamNameCodec,
};
pub use volume::{Volume, VolumeParams};
