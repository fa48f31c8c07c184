//! The cipher registry.
//!
//! A registry is an explicit object so tests and embedders can build
//! their own catalog; [`registry`] exposes the process-wide instance
//! with the built-in families pre-registered.

use crate::aes::AesCipher;
use crate::cipher::Cipher;
use crate::descriptor::Descriptor;
use crate::error::CipherResult;
use crate::null::NullCipher;

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tracing::warn;

/// An inclusive numeric range with a step, used for allowed key and
/// block sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    /// Smallest allowed value.
    pub min: u32,
    /// Largest allowed value.
    pub max: u32,
    /// Allowed values step from `min` in these increments.
    pub step: u32,
}

impl Range {
    /// Creates a range.
    #[must_use]
    pub const fn new(min: u32, max: u32, step: u32) -> Self {
        Self { min, max, step }
    }

    /// Whether `value` lies in the range on a step boundary.
    #[must_use]
    pub fn contains(&self, value: u32) -> bool {
        value >= self.min
            && value <= self.max
            && (self.step <= 1 || (value - self.min) % self.step == 0)
    }
}

/// Metadata describing a registered cipher family.
#[derive(Debug, Clone)]
pub struct CipherAlgorithm {
    /// Family name used for lookup.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Descriptor the implementation advertises.
    pub descriptor: Descriptor,
    /// Allowed key lengths in bits.
    pub key_lengths: Range,
    /// Allowed file block sizes in bytes.
    pub block_sizes: Range,
    /// Whether a stream mode is offered.
    pub has_stream_mode: bool,
}

/// Constructor signature for registered families. A `key_bits` of 0
/// selects the family default.
pub type Constructor = fn(&Descriptor, u32) -> CipherResult<Arc<dyn Cipher>>;

struct Entry {
    info: CipherAlgorithm,
    constructor: Constructor,
    hidden: bool,
}

/// A catalog of cipher families keyed by name.
#[derive(Default)]
pub struct Registry {
    entries: RwLock<HashMap<String, Entry>>,
}

impl Registry {
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
            CipherAlgorithm {
                name: AesCipher::FAMILY.to_string(),
                description: "AES: 16 byte block cipher".to_string(),
                descriptor: AesCipher::current_descriptor(),
                key_lengths: Range::new(128, 256, 64),
                block_sizes: Range::new(64, 4096, 16),
                has_stream_mode: true,
            },
            false,
            |_, key_bits| {
                let bits = if key_bits == 0 {
                    AesCipher::DEFAULT_KEY_BITS
                } else {
                    key_bits
                };
                Ok(Arc::new(AesCipher::new(bits)?))
            },
        );

        registry.register(
            CipherAlgorithm {
                name: NullCipher::FAMILY.to_string(),
                description: "Null: no encryption".to_string(),
                descriptor: NullCipher::current_descriptor(),
                key_lengths: Range::new(0, 0, 1),
                block_sizes: Range::new(64, 4096, 16),
                has_stream_mode: true,
            },
            true,
            |_, _| Ok(Arc::new(NullCipher)),
        );

        registry
    }

    /// Registers a family. A duplicate name silently replaces the
    /// previous entry.
    pub fn register(&self, info: CipherAlgorithm, hidden: bool, constructor: Constructor) {
        let name = info.name.clone();
        self.entries.write().insert(
            name,
            Entry {
                info,
                constructor,
                hidden,
            },
        );
    }

    /// Lists registered algorithms. Hidden entries are suppressed
    /// unless `include_hidden` is set.
    #[must_use]
    pub fn list_algorithms(&self, include_hidden: bool) -> Vec<CipherAlgorithm> {
        let entries = self.entries.read();
        let mut algorithms: Vec<CipherAlgorithm> = entries
            .values()
            .filter(|e| include_hidden || !e.hidden)
            .map(|e| e.info.clone())
            .collect();
        algorithms.sort_by(|a, b| a.name.cmp(&b.name));
        algorithms
    }

    /// Looks up the record for a family name, hidden or not.
    #[must_use]
    pub fn algorithm(&self, name: &str) -> Option<CipherAlgorithm> {
        self.entries.read().get(name).map(|e| e.info.clone())
    }

    /// Constructs a cipher for a descriptor found in a volume
    /// configuration. `key_bits == 0` selects the family default.
    ///
    /// Returns `None` when no registered family satisfies the
    /// descriptor, or the key length is out of range, or construction
    /// fails.
    #[must_use]
    pub fn new_cipher(&self, descriptor: &Descriptor, key_bits: u32) -> Option<Arc<dyn Cipher>> {
        let entries = self.entries.read();
        let entry = entries.get(&descriptor.family)?;

        if !entry.info.descriptor.implements(descriptor) {
            warn!(
                requested = %descriptor,
                available = %entry.info.descriptor,
                "incompatible cipher descriptor"
            );
            return None;
        }
        if key_bits != 0 && !entry.info.key_lengths.contains(key_bits) {
            return None;
        }
        (entry.constructor)(descriptor, key_bits).ok()
    }

    /// Constructs a cipher by family name at its current version.
    #[must_use]
    pub fn new_cipher_by_name(&self, name: &str, key_bits: u32) -> Option<Arc<dyn Cipher>> {
        let descriptor = self.algorithm(name)?.descriptor;
        self.new_cipher(&descriptor, key_bits)
    }
}

/// The process-wide registry, initialized with the built-in families on
/// first use.
pub fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(Registry::with_builtins)
}
