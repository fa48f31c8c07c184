//! The hidden `null` cipher family.
//!
//! Identity transforms with a zero-length key. Kept out of default
//! enumeration; exists so the upper layers can be exercised without
//! real cryptography and to back the no-encryption migration path.

use crate::cipher::Cipher;
use crate::descriptor::Descriptor;
use crate::error::CipherResult;
use crate::key::CipherKey;

/// Identity cipher.
pub struct NullCipher;

impl NullCipher {
    /// Registry family name.
    pub const FAMILY: &'static str = "null";

    /// The descriptor this implementation advertises.
    #[must_use]
    pub fn current_descriptor() -> Descriptor {
        Descriptor::new(Self::FAMILY, 1, 0)
    }
}

impl Cipher for NullCipher {
    fn descriptor(&self) -> Descriptor {
        Self::current_descriptor()
    }

    fn new_key_from_password(
        &self,
        _password: &[u8],
        iterations: u32,
        _target_duration_ms: u64,
        _salt: &[u8],
    ) -> CipherResult<(CipherKey, u32)> {
        Ok((CipherKey::from_bytes(Vec::new()), iterations.max(1)))
    }

    fn new_random_key(&self) -> CipherResult<CipherKey> {
        Ok(CipherKey::from_bytes(Vec::new()))
    }

    fn read_key(
        &self,
        _blob: &[u8],
        _wrapping_key: &CipherKey,
        _check: bool,
    ) -> CipherResult<CipherKey> {
        Ok(CipherKey::from_bytes(Vec::new()))
    }

    fn write_key(&self, _key: &CipherKey, _wrapping_key: &CipherKey) -> CipherResult<Vec<u8>> {
        Ok(Vec::new())
    }

    fn key_size(&self) -> usize {
        0
    }

    fn encoded_key_size(&self) -> usize {
        0
    }

    fn cipher_block_size(&self) -> usize {
        16
    }

    fn mac_64(&self, _data: &[u8], _key: &CipherKey, chained_iv: Option<&mut u64>) -> u64 {
        if let Some(iv) = chained_iv {
            *iv = 0;
        }
        0
    }

    fn stream_encode(&self, _buf: &mut [u8], _iv: u64, _key: &CipherKey) -> CipherResult<()> {
        Ok(())
    }

    fn stream_decode(&self, _buf: &mut [u8], _iv: u64, _key: &CipherKey) -> CipherResult<()> {
        Ok(())
    }

    fn block_encode(&self, _buf: &mut [u8], _iv: u64, _key: &CipherKey) -> CipherResult<()> {
        Ok(())
    }

    fn block_decode(&self, _buf: &mut [u8], _iv: u64, _key: &CipherKey) -> CipherResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn everything_is_identity() {
        let c = NullCipher;
        let key = c.new_random_key().unwrap();

        let mut buf = b"plaintext".to_vec();
        c.block_encode(&mut buf, 42, &key).unwrap();
        assert_eq!(buf, b"plaintext");
        c.stream_encode(&mut buf, 42, &key).unwrap();
        assert_eq!(buf, b"plaintext");
        assert_eq!(c.mac_64(&buf, &key, None), 0);
    }

    #[test]
    fn keys_are_empty_and_equal() {
        let c = NullCipher;
        let a = c.new_random_key().unwrap();
        let b = c.new_random_key().unwrap();
        assert!(a.is_empty());
        assert!(c.compare_keys(&a, &b));
        assert!(c.write_key(&a, &b).unwrap().is_empty());
    }
}
