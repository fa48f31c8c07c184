//! The `aes` cipher family.
//!
//! Block mode is AES-CBC, stream mode AES-CTR, both keyed per call with
//! a 16-byte ivec derived from the 64-bit IV and a per-key IV seed.
//! MACs are HMAC-SHA256 folded to 64 bits; password derivation is
//! PBKDF2-HMAC-SHA256 with optional duration-targeted calibration.
//!
//! Key material layout: `cipher key (key_bits / 8) || IV seed (16)`.
//! The whole material keys the MAC; only the leading part keys AES.

use crate::cipher::Cipher;
use crate::descriptor::Descriptor;
use crate::entropy;
use crate::error::{CipherError, CipherResult};
use crate::key::CipherKey;

use aes::{Aes128, Aes192, Aes256};
use cipher::block_padding::NoPadding;
use cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, StreamCipher};
use ctr::Ctr128BE;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::Instant;

type HmacSha256 = Hmac<Sha256>;

/// Bytes of per-key IV seed appended to the cipher key proper.
const IV_SEED_BYTES: usize = 16;
/// Bytes of keyed checksum prefixed to a wrapped key blob.
const CHECKSUM_BYTES: usize = 4;
/// AES block size in bytes.
const AES_BLOCK_BYTES: usize = 16;

/// Iteration count where PBKDF calibration starts probing.
const CALIBRATE_FLOOR: u32 = 1000;
/// Probe durations below this are too noisy to extrapolate from.
const CALIBRATE_MIN_SAMPLE_MS: u64 = 20;

/// AES in CBC (block) and CTR (stream) modes with HMAC-SHA256 MACs.
pub struct AesCipher {
    key_bits: u32,
}

impl AesCipher {
    /// Registry family name.
    pub const FAMILY: &'static str = "aes";
    /// Key length used when a lookup does not request one.
    pub const DEFAULT_KEY_BITS: u32 = 256;

    /// The descriptor this implementation advertises.
    #[must_use]
    pub fn current_descriptor() -> Descriptor {
        Descriptor::new(Self::FAMILY, 3, 2)
    }

    /// Creates an instance for the given key length.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::Invalid`] unless `key_bits` is 128, 192
    /// or 256.
    pub fn new(key_bits: u32) -> CipherResult<Self> {
        match key_bits {
            128 | 192 | 256 => Ok(Self { key_bits }),
            other => Err(CipherError::invalid(format!(
                "unsupported AES key length: {other} bits"
            ))),
        }
    }

    fn cipher_key_bytes(&self) -> usize {
        (self.key_bits / 8) as usize
    }

    /// Splits key material into the AES key and the IV seed, checking
    /// the length.
    fn split_material<'a>(&self, key: &'a CipherKey) -> CipherResult<(&'a [u8], &'a [u8])> {
        let material = key.bytes();
        if material.len() != self.key_size() {
            return Err(CipherError::invalid(format!(
                "key material is {} bytes, cipher needs {}",
                material.len(),
                self.key_size()
            )));
        }
        Ok(material.split_at(self.cipher_key_bytes()))
    }

    /// Derives the 16-byte ivec for a cipher invocation from the 64-bit
    /// IV and the key's IV seed. Deterministic in `(key, iv64)`.
    fn ivec(iv64: u64, iv_seed: &[u8]) -> [u8; AES_BLOCK_BYTES] {
        let mut mac =
            HmacSha256::new_from_slice(iv_seed).expect("HMAC accepts keys of any length");
        mac.update(&iv64.to_le_bytes());
        let digest = mac.finalize().into_bytes();
        let mut out = [0u8; AES_BLOCK_BYTES];
        out.copy_from_slice(&digest[..AES_BLOCK_BYTES]);
        out
    }

    fn derive_material(&self, password: &[u8], salt: &[u8], iterations: u32) -> Vec<u8> {
        let mut material = vec![0u8; self.key_size()];
        pbkdf2::pbkdf2_hmac::<Sha256>(password, salt, iterations, &mut material);
        material
    }

    /// Finds an iteration count whose single derivation takes about
    /// `target_ms`. Probes geometrically until the sample is long
    /// enough to trust, then extrapolates linearly (PBKDF2 cost is
    /// linear in the count).
    fn calibrate(&self, password: &[u8], salt: &[u8], target_ms: u64) -> CipherResult<u32> {
        if target_ms == 0 {
            return Err(CipherError::invalid(
                "calibration needs a non-zero target duration",
            ));
        }

        let mut trial = CALIBRATE_FLOOR;
        loop {
            let start = Instant::now();
            let _ = self.derive_material(password, salt, trial);
            let elapsed = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

            if elapsed >= target_ms {
                return Ok(trial);
            }
            if elapsed >= CALIBRATE_MIN_SAMPLE_MS {
                let scaled = (u64::from(trial) * target_ms / elapsed.max(1))
                    .clamp(u64::from(CALIBRATE_FLOOR), u64::from(u32::MAX));
                return Ok(scaled as u32);
            }
            trial = trial.saturating_mul(8);
        }
    }

    fn cbc_encrypt(&self, cipher_key: &[u8], ivec: &[u8], buf: &mut [u8]) -> CipherResult<()> {
        let len = buf.len();
        let misaligned = || CipherError::invalid("block mode buffer not block aligned");
        let bad_key = || CipherError::invalid("AES key slice length mismatch");
        match self.key_bits {
            128 => cbc::Encryptor::<Aes128>::new_from_slices(cipher_key, ivec)
                .map_err(|_| bad_key())?
                .encrypt_padded_mut::<NoPadding>(buf, len)
                .map_err(|_| misaligned())?,
            192 => cbc::Encryptor::<Aes192>::new_from_slices(cipher_key, ivec)
                .map_err(|_| bad_key())?
                .encrypt_padded_mut::<NoPadding>(buf, len)
                .map_err(|_| misaligned())?,
            _ => cbc::Encryptor::<Aes256>::new_from_slices(cipher_key, ivec)
                .map_err(|_| bad_key())?
                .encrypt_padded_mut::<NoPadding>(buf, len)
                .map_err(|_| misaligned())?,
        };
        Ok(())
    }

    fn cbc_decrypt(&self, cipher_key: &[u8], ivec: &[u8], buf: &mut [u8]) -> CipherResult<()> {
        let misaligned = || CipherError::invalid("block mode buffer not block aligned");
        let bad_key = || CipherError::invalid("AES key slice length mismatch");
        match self.key_bits {
            128 => cbc::Decryptor::<Aes128>::new_from_slices(cipher_key, ivec)
                .map_err(|_| bad_key())?
                .decrypt_padded_mut::<NoPadding>(buf)
                .map_err(|_| misaligned())?,
            192 => cbc::Decryptor::<Aes192>::new_from_slices(cipher_key, ivec)
                .map_err(|_| bad_key())?
                .decrypt_padded_mut::<NoPadding>(buf)
                .map_err(|_| misaligned())?,
            _ => cbc::Decryptor::<Aes256>::new_from_slices(cipher_key, ivec)
                .map_err(|_| bad_key())?
                .decrypt_padded_mut::<NoPadding>(buf)
                .map_err(|_| misaligned())?,
        };
        Ok(())
    }

    fn ctr_apply(&self, cipher_key: &[u8], ivec: &[u8], buf: &mut [u8]) -> CipherResult<()> {
        let bad_key = || CipherError::invalid("AES key slice length mismatch");
        match self.key_bits {
            128 => Ctr128BE::<Aes128>::new_from_slices(cipher_key, ivec)
                .map_err(|_| bad_key())?
                .apply_keystream(buf),
            192 => Ctr128BE::<Aes192>::new_from_slices(cipher_key, ivec)
                .map_err(|_| bad_key())?
                .apply_keystream(buf),
            _ => Ctr128BE::<Aes256>::new_from_slices(cipher_key, ivec)
                .map_err(|_| bad_key())?
                .apply_keystream(buf),
        }
        Ok(())
    }
}

impl Cipher for AesCipher {
    fn descriptor(&self) -> Descriptor {
        Self::current_descriptor()
    }

    fn new_key_from_password(
        &self,
        password: &[u8],
        iterations: u32,
        target_duration_ms: u64,
        salt: &[u8],
    ) -> CipherResult<(CipherKey, u32)> {
        let count = if iterations == 0 {
            self.calibrate(password, salt, target_duration_ms)?
        } else {
            iterations
        };
        let material = self.derive_material(password, salt, count);
        Ok((CipherKey::from_bytes(material), count))
    }

    fn new_random_key(&self) -> CipherResult<CipherKey> {
        let mut material = vec![0u8; self.key_size()];
        entropy::fill_random(&mut material, true)?;
        Ok(CipherKey::from_bytes(material))
    }

    fn read_key(
        &self,
        blob: &[u8],
        wrapping_key: &CipherKey,
        check: bool,
    ) -> CipherResult<CipherKey> {
        if blob.len() != self.encoded_key_size() {
            return Err(CipherError::BadKey);
        }
        let stored = u32::from_be_bytes(
            blob[..CHECKSUM_BYTES]
                .try_into()
                .expect("checksum slice is 4 bytes"),
        );
        let mut material = blob[CHECKSUM_BYTES..].to_vec();
        self.stream_decode(&mut material, u64::from(stored), wrapping_key)?;

        if check {
            let computed = self.mac_32(&material, wrapping_key, None);
            if computed != stored {
                return Err(CipherError::BadKey);
            }
        }
        Ok(CipherKey::from_bytes(material))
    }

    fn write_key(&self, key: &CipherKey, wrapping_key: &CipherKey) -> CipherResult<Vec<u8>> {
        if key.len() != self.key_size() {
            return Err(CipherError::invalid("wrapped key has the wrong size"));
        }
        let checksum = self.mac_32(key.bytes(), wrapping_key, None);
        let mut material = key.bytes().to_vec();
        self.stream_encode(&mut material, u64::from(checksum), wrapping_key)?;

        let mut blob = Vec::with_capacity(self.encoded_key_size());
        blob.extend_from_slice(&checksum.to_be_bytes());
        blob.extend_from_slice(&material);
        Ok(blob)
    }

    fn key_size(&self) -> usize {
        self.cipher_key_bytes() + IV_SEED_BYTES
    }

    fn encoded_key_size(&self) -> usize {
        self.key_size() + CHECKSUM_BYTES
    }

    fn cipher_block_size(&self) -> usize {
        AES_BLOCK_BYTES
    }

    fn mac_64(&self, data: &[u8], key: &CipherKey, chained_iv: Option<&mut u64>) -> u64 {
        let mut mac =
            HmacSha256::new_from_slice(key.bytes()).expect("HMAC accepts keys of any length");
        mac.update(data);
        if let Some(iv) = &chained_iv {
            mac.update(&iv.to_le_bytes());
        }
        let digest = mac.finalize().into_bytes();

        let mut value = 0u64;
        for (i, &byte) in digest.iter().enumerate() {
            value ^= u64::from(byte) << (8 * (i % 8));
        }
        if let Some(iv) = chained_iv {
            *iv = value;
        }
        value
    }

    fn stream_encode(&self, buf: &mut [u8], iv: u64, key: &CipherKey) -> CipherResult<()> {
        if buf.is_empty() {
            return Ok(());
        }
        let (cipher_key, iv_seed) = self.split_material(key)?;
        let ivec = Self::ivec(iv, iv_seed);
        self.ctr_apply(cipher_key, &ivec, buf)
    }

    fn stream_decode(&self, buf: &mut [u8], iv: u64, key: &CipherKey) -> CipherResult<()> {
        // CTR is an involution.
        self.stream_encode(buf, iv, key)
    }

    fn block_encode(&self, buf: &mut [u8], iv: u64, key: &CipherKey) -> CipherResult<()> {
        if buf.is_empty() {
            return Ok(());
        }
        if buf.len() % AES_BLOCK_BYTES != 0 {
            return Err(CipherError::invalid("block mode buffer not block aligned"));
        }
        let (cipher_key, iv_seed) = self.split_material(key)?;
        let ivec = Self::ivec(iv, iv_seed);
        self.cbc_encrypt(cipher_key, &ivec, buf)
    }

    fn block_decode(&self, buf: &mut [u8], iv: u64, key: &CipherKey) -> CipherResult<()> {
        if buf.is_empty() {
            return Ok(());
        }
        if buf.len() % AES_BLOCK_BYTES != 0 {
            return Err(CipherError::invalid("block mode buffer not block aligned"));
        }
        let (cipher_key, iv_seed) = self.split_material(key)?;
        let ivec = Self::ivec(iv, iv_seed);
        self.cbc_decrypt(cipher_key, &ivec, buf)
    }
}
