//! Shared helpers for CloakFS benchmarks.

use cloakfs_cipher::{registry, Cipher, CipherKey};
use std::sync::Arc;

/// Deterministic pseudo-data of the given size.
#[must_use]
pub fn pattern_data(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 251) as u8).collect()
}

/// An AES-256 cipher with a fixed-cost test key.
#[must_use]
pub fn bench_cipher() -> (Arc<dyn Cipher>, CipherKey) {
    let cipher = registry()
        .new_cipher_by_name("aes", 256)
        .expect("aes is always registered");
    let key = cipher
        .new_key_from_password(b"bench password", 1000, 0, b"bench salt")
        .expect("fixed-count derivation cannot fail")
        .0;
    (cipher, key)
}
