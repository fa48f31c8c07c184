//! Filename codecs.
//!
//! A name codec turns one plaintext path component into a
//! filesystem-safe ciphertext string and back. Codecs register in a
//! catalog of the same shape as the cipher registry and are
//! constructed per volume from the descriptor stored in its
//! configuration.
//!
//! When directory-IV chaining is enabled, an IV accumulator evolves as
//! a path is walked: each component's MAC is mixed into the chain, so
//! equal names in different directories encrypt differently while the
//! whole mapping stays deterministic.

mod block;
mod null;
mod path;
mod stream;

pub use block::BlockNameCodec;
pub use null::NullNameCodec;
pub use path::{decode_path, encode_path};
pub use stream::StreamNameCodec;

use crate::error::{CoreError, CoreResult};
use cloakfs_cipher::{Cipher, CipherKey, Descriptor};

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tracing::warn;

/// Operations of a filename codec.
///
/// `iv` is the directory chain accumulator. Codecs built without
/// chaining ignore and never update it; chained codecs read the current
/// value and replace it with the MAC-derived successor so sibling and
/// child names see deterministic but distinct IVs.
pub trait NameCodec: Send + Sync {
    /// The descriptor this codec advertises.
    fn descriptor(&self) -> Descriptor;

    /// Exact upper bound on the encoded length of a `plain_len` byte
    /// name.
    fn max_encoded_name_len(&self, plain_len: usize) -> usize;

    /// Exact upper bound on the decoded length of an `enc_len` byte
    /// encoded name.
    fn max_decoded_name_len(&self, enc_len: usize) -> usize;

    /// Encrypts and encodes one path component.
    ///
    /// # Errors
    ///
    /// Returns an error on cipher failure or an empty name.
    fn encode_name(&self, plaintext: &[u8], iv: Option<&mut u64>) -> CoreResult<Vec<u8>>;

    /// Decodes and decrypts one path component.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::BadName`](crate::CoreError::BadName) when
    /// the embedded checksum does not match the recovered plaintext,
    /// and [`CoreError::Invalid`](crate::CoreError::Invalid) on
    /// structurally impossible input.
    fn decode_name(&self, encoded: &[u8], iv: Option<&mut u64>) -> CoreResult<Vec<u8>>;
}

/// Metadata describing a registered name-codec family.
#[derive(Debug, Clone)]
pub struct NameCodecInfo {
    /// Family name used for lookup.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Descriptor the implementation advertises.
    pub descriptor: Descriptor,
}

/// Constructor signature for registered name-codec families.
pub type NameCodecConstructor =
    fn(&Descriptor, Arc<dyn Cipher>, CipherKey, bool) -> CoreResult<Arc<dyn NameCodec>>;

struct Entry {
    info: NameCodecInfo,
    constructor: NameCodecConstructor,
}

/// A catalog of name-codec families keyed by name.
#[derive(Default)]
pub struct NameCodecRegistry {
    entries: RwLock<HashMap<String, Entry>>,
}

impl NameCodecRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with the built-in families registered.
    #[must_use]
    pub fn with_builtins() -> Self {
        let registry = Self::new();

        registry.register(
            NameCodecInfo {
                name: NullNameCodec::FAMILY.to_string(),
                description: "No encryption of filenames".to_string(),
                descriptor: NullNameCodec::current_descriptor(),
            },
            |_, _, _, _| Ok(Arc::new(NullNameCodec)),
        );
        registry.register(
            NameCodecInfo {
                name: BlockNameCodec::FAMILY.to_string(),
                description: "Block encoding with base64 output".to_string(),
                descriptor: BlockNameCodec::current_descriptor(),
            },
            |_, cipher, key, chained| Ok(Arc::new(BlockNameCodec::new(cipher, key, chained, false))),
        );
        registry.register(
            NameCodecInfo {
                name: BlockNameCodec::FAMILY32.to_string(),
                description: "Block encoding with base32 output for case-insensitive systems"
                    .to_string(),
                descriptor: BlockNameCodec::current_descriptor32(),
            },
            |_, cipher, key, chained| Ok(Arc::new(BlockNameCodec::new(cipher, key, chained, true))),
        );
        registry.register(
            NameCodecInfo {
                name: StreamNameCodec::FAMILY.to_string(),
                description: "Stream encoding, preserves name length".to_string(),
                descriptor: StreamNameCodec::current_descriptor(),
            },
            |_, cipher, key, chained| Ok(Arc::new(StreamNameCodec::new(cipher, key, chained))),
        );

        registry
    }

    /// Registers a family. A duplicate name silently replaces the
    /// previous entry.
    pub fn register(&self, info: NameCodecInfo, constructor: NameCodecConstructor) {
        let name = info.name.clone();
        self.entries.write().insert(name, Entry { info, constructor });
    }

    /// Lists registered families.
    #[must_use]
    pub fn list_codecs(&self) -> Vec<NameCodecInfo> {
        let entries = self.entries.read();
        let mut infos: Vec<NameCodecInfo> = entries.values().map(|e| e.info.clone()).collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    /// Constructs a codec for a descriptor found in a volume
    /// configuration.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Unsupported`](crate::CoreError::Unsupported)
    /// when no registered family satisfies the descriptor.
    pub fn new_codec(
        &self,
        descriptor: &Descriptor,
        cipher: Arc<dyn Cipher>,
        key: CipherKey,
        chained_iv: bool,
    ) -> CoreResult<Arc<dyn NameCodec>> {
        let entries = self.entries.read();
        let entry = entries
            .get(&descriptor.family)
            .ok_or_else(|| CoreError::unsupported(format!("no name codec {}", descriptor)))?;

        if !entry.info.descriptor.implements(descriptor) {
            warn!(
                requested = %descriptor,
                available = %entry.info.descriptor,
                "incompatible name codec descriptor"
            );
            return Err(CoreError::unsupported(format!(
                "no compatible name codec for {descriptor}"
            )));
        }
        (entry.constructor)(descriptor, cipher, key, chained_iv)
    }
}

/// The process-wide name-codec registry, initialized with the built-in
/// families on first use.
pub fn name_registry() -> &'static NameCodecRegistry {
    static REGISTRY: OnceLock<NameCodecRegistry> = OnceLock::new();
    REGISTRY.get_or_init(NameCodecRegistry::with_builtins)
}
