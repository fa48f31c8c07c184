//! Opaque, shared, zeroized key material.

use crate::cipher::Cipher;
use crate::error::CipherResult;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

/// Key material owned by a [`CipherKey`]. Zeroized when the last handle
/// is released.
struct KeyMaterial {
    bytes: Vec<u8>,
}

impl Drop for KeyMaterial {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

/// An opaque handle to per-volume key material.
///
/// Handles are cheap to clone and share one underlying buffer; the
/// buffer is zeroized when the final handle drops. The raw bytes are
/// only reachable from cipher implementations inside this crate.
#[derive(Clone)]
pub struct CipherKey {
    material: Arc<KeyMaterial>,
}

impl CipherKey {
    /// Wraps raw material in a shared handle. Crate-internal: keys are
    /// created by cipher implementations, never from caller-supplied
    /// bytes.
    pub(crate) fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            material: Arc::new(KeyMaterial { bytes }),
        }
    }

    pub(crate) fn bytes(&self) -> &[u8] {
        &self.material.bytes
    }

    /// Length of the key material in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.material.bytes.len()
    }

    /// Whether the handle carries no material (the null cipher's key).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.material.bytes.is_empty()
    }

    /// Constant-time equality of the underlying material.
    ///
    /// A length mismatch returns `false` immediately; lengths are not
    /// secret.
    #[must_use]
    pub fn ct_eq(&self, other: &CipherKey) -> bool {
        self.len() == other.len() && bool::from(self.bytes().ct_eq(other.bytes()))
    }
}

impl std::fmt::Debug for CipherKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CipherKey")
            .field("bytes", &"[REDACTED]")
            .field("len", &self.len())
            .finish()
    }
}

/// Wraps `key` under `wrapping_key` and renders the blob as standard
/// base 64, for embedding in text configuration documents.
///
/// # Errors
///
/// Propagates wrap failures from the cipher.
pub fn encode_key_to_string(
    cipher: &dyn Cipher,
    key: &CipherKey,
    wrapping_key: &CipherKey,
) -> CipherResult<String> {
    let blob = cipher.write_key(key, wrapping_key)?;
    Ok(STANDARD.encode(blob))
}

/// Inverse of [`encode_key_to_string`], with the integrity check
/// enabled.
///
/// # Errors
///
/// Returns [`CipherError::BadKey`](crate::CipherError::BadKey) on a
/// malformed blob or checksum mismatch.
pub fn decode_key_from_string(
    cipher: &dyn Cipher,
    text: &str,
    wrapping_key: &CipherKey,
) -> CipherResult<CipherKey> {
    let blob = STANDARD
        .decode(text.trim())
        .map_err(|_| crate::CipherError::BadKey)?;
    cipher.read_key(&blob, wrapping_key, true)
}
