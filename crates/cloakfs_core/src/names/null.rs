//! Identity name codec, used when filename encryption is disabled.

use crate::error::CoreResult;
use crate::names::NameCodec;
use cloakfs_cipher::Descriptor;

/// Passes names through unchanged.
pub struct NullNameCodec;

impl NullNameCodec {
    /// Registry family name.
    pub const FAMILY: &'static str = "nameio/null";

    /// The descriptor this codec advertises.
    #[must_use]
    pub fn current_descriptor() -> Descriptor {
        Descriptor::new(Self::FAMILY, 1, 0)
    }
}

impl NameCodec for NullNameCodec {
    fn descriptor(&self) -> Descriptor {
        Self::current_descriptor()
    }

    fn max_encoded_name_len(&self, plain_len: usize) -> usize {
        plain_len
    }

    fn max_decoded_name_len(&self, enc_len: usize) -> usize {
        enc_len
    }

    fn encode_name(&self, plaintext: &[u8], _iv: Option<&mut u64>) -> CoreResult<Vec<u8>> {
        Ok(plaintext.to_vec())
    }

    fn decode_name(&self, encoded: &[u8], _iv: Option<&mut u64>) -> CoreResult<Vec<u8>> {
        Ok(encoded.to_vec())
    }
}
