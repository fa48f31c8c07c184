//! Block-mode name codec.
//!
//! The plaintext is padded to the cipher block boundary (each pad byte
//! holds the pad length), prefixed with a 16-bit MAC of the plaintext,
//! block-encrypted with an IV mixing that MAC and the directory chain,
//! and re-packed into the filesystem-safe alphabet. Base-32 output is
//! available for case-insensitive filesystems.

use crate::error::{CoreError, CoreResult};
use crate::names::NameCodec;
use cloakfs_cipher::{Cipher, CipherKey, Descriptor};
use cloakfs_codec::{
    ascii_to_b32, ascii_to_b64, b256_to_b32_len, b256_to_b64_len, b32_to_ascii, b32_to_b256_len,
    b64_to_ascii, b64_to_b256_len, change_base_2_inline,
};

use std::sync::Arc;
use tracing::warn;

/// Length in bytes of the MAC prefix on every encoded name.
const NAME_MAC_BYTES: usize = 2;

/// Name codec that pads and block-encrypts each component.
pub struct BlockNameCodec {
    cipher: Arc<dyn Cipher>,
    key: CipherKey,
    chained_iv: bool,
    base32: bool,
}

impl BlockNameCodec {
    /// Registry family name of the base-64 variant.
    pub const FAMILY: &'static str = "nameio/block";
    /// Registry family name of the base-32 variant.
    pub const FAMILY32: &'static str = "nameio/block32";

    /// The descriptor the base-64 variant advertises.
    #[must_use]
    pub fn current_descriptor() -> Descriptor {
        Descriptor::new(Self::FAMILY, 4, 0)
    }

    /// The descriptor the base-32 variant advertises.
    #[must_use]
    pub fn current_descriptor32() -> Descriptor {
        Descriptor::new(Self::FAMILY32, 4, 0)
    }

    /// Creates a codec over the volume cipher and key.
    #[must_use]
    pub fn new(cipher: Arc<dyn Cipher>, key: CipherKey, chained_iv: bool, base32: bool) -> Self {
        Self {
            cipher,
            key,
            chained_iv,
            base32,
        }
    }

    fn symbol_bits(&self) -> u32 {
        if self.base32 {
            5
        } else {
            6
        }
    }

    /// Current chain value, or the fixed IV when chaining is off.
    fn chain_value(&self, iv: &Option<&mut u64>) -> u64 {
        if self.chained_iv {
            iv.as_deref().copied().unwrap_or(0)
        } else {
            0
        }
    }

    /// MAC of the plaintext, plus the successor chain value when
    /// chaining is on.
    fn name_mac(&self, plain: &[u8], old_chain: u64) -> (u16, u64) {
        if self.chained_iv {
            let mut slot = old_chain;
            let mac = self.cipher.mac_16(plain, &self.key, Some(&mut slot));
            (mac, slot)
        } else {
            (self.cipher.mac_16(plain, &self.key, None), 0)
        }
    }

    fn update_chain(&self, iv: Option<&mut u64>, new_chain: u64) {
        if self.chained_iv {
            if let Some(slot) = iv {
                *slot = new_chain;
            }
        }
    }
}

impl NameCodec for BlockNameCodec {
    fn descriptor(&self) -> Descriptor {
        if self.base32 {
            Self::current_descriptor32()
        } else {
            Self::current_descriptor()
        }
    }

    fn max_encoded_name_len(&self, plain_len: usize) -> usize {
        let bs = self.cipher.cipher_block_size();
        // Padding always adds at least one byte.
        let padded = (plain_len / bs + 1) * bs;
        let total = NAME_MAC_BYTES + padded;
        if self.base32 {
            b256_to_b32_len(total)
        } else {
            b256_to_b64_len(total)
        }
    }

    fn max_decoded_name_len(&self, enc_len: usize) -> usize {
        let raw = if self.base32 {
            b32_to_b256_len(enc_len)
        } else {
            b64_to_b256_len(enc_len)
        };
        raw.saturating_sub(NAME_MAC_BYTES)
    }

    fn encode_name(&self, plaintext: &[u8], iv: Option<&mut u64>) -> CoreResult<Vec<u8>> {
        if plaintext.is_empty() {
            return Err(CoreError::invalid("cannot encode an empty name"));
        }

        let old_chain = self.chain_value(&iv);
        let (mac, new_chain) = self.name_mac(plaintext, old_chain);

        let bs = self.cipher.cipher_block_size();
        let padding = bs - plaintext.len() % bs;

        let mut buf = Vec::with_capacity(NAME_MAC_BYTES + plaintext.len() + padding);
        buf.extend_from_slice(&mac.to_be_bytes());
        buf.extend_from_slice(plaintext);
        buf.resize(NAME_MAC_BYTES + plaintext.len() + padding, padding as u8);

        self.cipher.block_encode(
            &mut buf[NAME_MAC_BYTES..],
            u64::from(mac) ^ old_chain,
            &self.key,
        )?;

        change_base_2_inline(&mut buf, 8, self.symbol_bits(), true)?;
        if self.base32 {
            b32_to_ascii(&mut buf);
        } else {
            b64_to_ascii(&mut buf);
        }

        self.update_chain(iv, new_chain);
        Ok(buf)
    }

    fn decode_name(&self, encoded: &[u8], iv: Option<&mut u64>) -> CoreResult<Vec<u8>> {
        let bs = self.cipher.cipher_block_size();

        let mut raw = encoded.to_vec();
        if self.base32 {
            ascii_to_b32(&mut raw)?;
        } else {
            ascii_to_b64(&mut raw)?;
        }
        // The trailing partial symbol is padding residue from encode.
        change_base_2_inline(&mut raw, self.symbol_bits(), 8, false)?;

        if raw.len() < NAME_MAC_BYTES + bs || (raw.len() - NAME_MAC_BYTES) % bs != 0 {
            return Err(CoreError::invalid("encoded name has impossible length"));
        }

        let mac = u16::from_be_bytes([raw[0], raw[1]]);
        let old_chain = self.chain_value(&iv);

        let mut payload = raw[NAME_MAC_BYTES..].to_vec();
        self.cipher
            .block_decode(&mut payload, u64::from(mac) ^ old_chain, &self.key)?;

        let padding = usize::from(payload[payload.len() - 1]);
        if padding == 0 || padding > bs || padding >= payload.len() {
            return Err(CoreError::BadName);
        }
        payload.truncate(payload.len() - padding);

        let (computed, new_chain) = self.name_mac(&payload, old_chain);
        if computed != mac {
            warn!("checksum mismatch in filename decode");
            return Err(CoreError::BadName);
        }

        self.update_chain(iv, new_chain);
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloakfs_cipher::registry;

    fn codec(chained: bool, base32: bool) -> BlockNameCodec {
        let cipher = registry().new_cipher_by_name("aes", 256).unwrap();
        let key = cipher
            .new_key_from_password(b"name codec tests", 64, 0, b"salt")
            .unwrap()
            .0;
        BlockNameCodec::new(cipher, key, chained, base32)
    }

    #[test]
    fn roundtrip_unchained() {
        let codec = codec(false, false);
        for name in [&b"a"[..], b"hello.txt", b"a-much-longer-file-name.tar.gz"] {
            let encoded = codec.encode_name(name, None).unwrap();
            assert_ne!(encoded, name);
            let decoded = codec.decode_name(&encoded, None).unwrap();
            assert_eq!(decoded, name);
        }
    }

    #[test]
    fn roundtrip_chained_reproduces_iv() {
        let codec = codec(true, false);

        let mut enc_iv = 0u64;
        let e1 = codec.encode_name(b"alpha", Some(&mut enc_iv)).unwrap();
        let e2 = codec.encode_name(b"beta", Some(&mut enc_iv)).unwrap();

        let mut dec_iv = 0u64;
        assert_eq!(codec.decode_name(&e1, Some(&mut dec_iv)).unwrap(), b"alpha");
        assert_eq!(codec.decode_name(&e2, Some(&mut dec_iv)).unwrap(), b"beta");
        assert_eq!(dec_iv, enc_iv, "decode walk must reproduce the chain");
    }

    #[test]
    fn same_name_different_chain_differs() {
        let codec = codec(true, false);
        let mut iv_a = 1u64;
        let mut iv_b = 2u64;
        let a = codec.encode_name(b"same", Some(&mut iv_a)).unwrap();
        let b = codec.encode_name(b"same", Some(&mut iv_b)).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn decode_with_wrong_chain_fails() {
        let codec = codec(true, false);
        let mut iv = 7u64;
        let encoded = codec.encode_name(b"secret", Some(&mut iv)).unwrap();

        let mut wrong = 8u64;
        assert!(matches!(
            codec.decode_name(&encoded, Some(&mut wrong)),
            Err(CoreError::BadName)
        ));
    }

    #[test]
    fn tampered_name_fails_checksum() {
        let codec = codec(false, false);
        let mut encoded = codec.encode_name(b"target", None).unwrap();
        // Swap a symbol for a different alphabet member.
        encoded[0] = if encoded[0] == b'A' { b'B' } else { b'A' };
        assert!(codec.decode_name(&encoded, None).is_err());
    }

    #[test]
    fn encoded_names_are_filesystem_safe() {
        let codec = codec(false, false);
        let encoded = codec
            .encode_name("weird /.\\ name \u{fffd}".as_bytes(), None)
            .unwrap();
        assert!(!encoded.contains(&b'/'));
        assert!(!encoded.contains(&b'.'));
    }

    #[test]
    fn base32_roundtrip_survives_case_folding() {
        let codec = codec(false, true);
        let encoded = codec.encode_name(b"CaseTest.doc", None).unwrap();
        let folded = encoded.to_ascii_lowercase();
        assert_eq!(codec.decode_name(&folded, None).unwrap(), b"CaseTest.doc");
    }

    #[test]
    fn length_bounds_hold() {
        for base32 in [false, true] {
            let codec = codec(false, base32);
            for len in [1usize, 5, 15, 16, 17, 200] {
                let name = vec![b'x'; len];
                let encoded = codec.encode_name(&name, None).unwrap();
                assert!(encoded.len() <= codec.max_encoded_name_len(len));
                assert!(len <= codec.max_decoded_name_len(encoded.len()));
            }
        }
    }

    #[test]
    fn empty_name_is_rejected() {
        let codec = codec(false, false);
        assert!(codec.encode_name(b"", None).is_err());
    }

    #[test]
    fn garbage_input_is_rejected() {
        let codec = codec(false, false);
        assert!(codec.decode_name(b"", None).is_err());
        assert!(codec.decode_name(b"A", None).is_err());
        assert!(codec.decode_name(b"!!bad!!", None).is_err());
    }
}
