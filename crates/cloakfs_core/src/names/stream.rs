//! Stream-mode name codec.
//!
//! Like the block codec but without padding: the ciphertext is exactly
//! as long as the plaintext, which leaks name lengths in exchange for
//! shorter encoded names.

use crate::error::{CoreError, CoreResult};
use crate::names::NameCodec;
use cloakfs_cipher::{Cipher, CipherKey, Descriptor};
use cloakfs_codec::{
    ascii_to_b64, b256_to_b64_len, b64_to_ascii, b64_to_b256_len, change_base_2_inline,
};

use std::sync::Arc;
use tracing::warn;

const NAME_MAC_BYTES: usize = 2;

/// Name codec that stream-encrypts each component.
pub struct StreamNameCodec {
    cipher: Arc<dyn Cipher>,
    key: CipherKey,
    chained_iv: bool,
}

impl StreamNameCodec {
    /// Registry family name.
    pub const FAMILY: &'static str = "nameio/stream";

    /// The descriptor this codec advertises.
    #[must_use]
    pub fn current_descriptor() -> Descriptor {
        Descriptor::new(Self::FAMILY, 2, 1)
    }

    /// Creates a codec over the volume cipher and key.
    #[must_use]
    pub fn new(cipher: Arc<dyn Cipher>, key: CipherKey, chained_iv: bool) -> Self {
        Self {
            cipher,
            key,
            chained_iv,
        }
    }

    fn chain_value(&self, iv: &Option<&mut u64>) -> u64 {
        if self.chained_iv {
            iv.as_deref().copied().unwrap_or(0)
        } else {
            0
        }
    }

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

impl NameCodec for StreamNameCodec {
    fn descriptor(&self) -> Descriptor {
        Self::current_descriptor()
    }

    fn max_encoded_name_len(&self, plain_len: usize) -> usize {
        b256_to_b64_len(NAME_MAC_BYTES + plain_len)
    }

    fn max_decoded_name_len(&self, enc_len: usize) -> usize {
        b64_to_b256_len(enc_len).saturating_sub(NAME_MAC_BYTES)
    }

    fn encode_name(&self, plaintext: &[u8], iv: Option<&mut u64>) -> CoreResult<Vec<u8>> {
        if plaintext.is_empty() {
            return Err(CoreError::invalid("cannot encode an empty name"));
        }

        let old_chain = self.chain_value(&iv);
        let (mac, new_chain) = self.name_mac(plaintext, old_chain);

        let mut buf = Vec::with_capacity(NAME_MAC_BYTES + plaintext.len());
        buf.extend_from_slice(&mac.to_be_bytes());
        buf.extend_from_slice(plaintext);

        self.cipher.stream_encode(
            &mut buf[NAME_MAC_BYTES..],
            u64::from(mac) ^ old_chain,
            &self.key,
        )?;

        change_base_2_inline(&mut buf, 8, 6, true)?;
        b64_to_ascii(&mut buf);

        self.update_chain(iv, new_chain);
        Ok(buf)
    }

    fn decode_name(&self, encoded: &[u8], iv: Option<&mut u64>) -> CoreResult<Vec<u8>> {
        let mut raw = encoded.to_vec();
        ascii_to_b64(&mut raw)?;
        change_base_2_inline(&mut raw, 6, 8, false)?;

        if raw.len() <= NAME_MAC_BYTES {
            return Err(CoreError::invalid("encoded name has impossible length"));
        }

        let mac = u16::from_be_bytes([raw[0], raw[1]]);
        let old_chain = self.chain_value(&iv);

        let mut payload = raw[NAME_MAC_BYTES..].to_vec();
        self.cipher
            .stream_decode(&mut payload, u64::from(mac) ^ old_chain, &self.key)?;

        let (computed, new_chain) = self.name_mac(&payload, old_chain);
        if computed != mac {
            warn!("checksum mismatch in filename decode");
            return Err(CoreError::BadName);
        }

        self.update_chain(iv, new_chain);
        Ok(payload)
    }
}
