//! The polymorphic cipher contract.

use crate::descriptor::Descriptor;
use crate::entropy;
use crate::error::CipherResult;
use crate::key::CipherKey;

/// Operations every cipher family provides.
///
/// Implementations are immutable after construction and shared across
/// every file handle of a volume, so all methods take `&self` and must
/// be thread-safe. Bulk operations work in place: block mode requires
/// the buffer length to be a multiple of
/// [`Self::cipher_block_size`], stream mode takes any length.
pub trait Cipher: Send + Sync {
    /// The descriptor this implementation advertises.
    fn descriptor(&self) -> Descriptor;

    /// Derives a key from a password.
    ///
    /// With `iterations == 0` the derivation cost is calibrated: a
    /// throwaway derivation is timed and the count scaled until one run
    /// takes about `target_duration_ms`. The count actually used is
    /// returned so the caller can persist it.
    ///
    /// # Errors
    ///
    /// Returns an error on invalid calibration parameters.
    fn new_key_from_password(
        &self,
        password: &[u8],
        iterations: u32,
        target_duration_ms: u64,
        salt: &[u8],
    ) -> CipherResult<(CipherKey, u32)>;

    /// Draws a fresh key from the strong entropy source.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::Entropy`](crate::CipherError::Entropy) if
    /// the OS source fails.
    fn new_random_key(&self) -> CipherResult<CipherKey>;

    /// Unwraps a key from an [`encoded_key_size`](Self::encoded_key_size)
    /// byte blob produced by [`write_key`](Self::write_key).
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::BadKey`](crate::CipherError::BadKey) when
    /// `check` is set and the embedded checksum does not match.
    fn read_key(
        &self,
        blob: &[u8],
        wrapping_key: &CipherKey,
        check: bool,
    ) -> CipherResult<CipherKey>;

    /// Wraps `key` under `wrapping_key`, embedding a keyed checksum.
    ///
    /// # Errors
    ///
    /// Returns an error if either key has the wrong size for this
    /// cipher.
    fn write_key(&self, key: &CipherKey, wrapping_key: &CipherKey) -> CipherResult<Vec<u8>>;

    /// Constant-time key equality.
    fn compare_keys(&self, a: &CipherKey, b: &CipherKey) -> bool {
        a.ct_eq(b)
    }

    /// Size of raw key material in bytes.
    fn key_size(&self) -> usize;

    /// Size of a wrapped key blob in bytes.
    fn encoded_key_size(&self) -> usize;

    /// The underlying primitive's block size in bytes.
    fn cipher_block_size(&self) -> usize;

    /// Whether [`stream_encode`](Self::stream_encode) is offered.
    fn has_stream_mode(&self) -> bool {
        true
    }

    /// Fills `buf` with random bytes; `strong` selects the OS CSPRNG.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::Entropy`](crate::CipherError::Entropy) if
    /// the strong source fails.
    fn randomize(&self, buf: &mut [u8], strong: bool) -> CipherResult<()> {
        entropy::fill_random(buf, strong)
    }

    /// 64-bit keyed MAC of `data`.
    ///
    /// When a chaining slot is supplied, its current value is mixed
    /// into the MAC input and then replaced with the result, so a
    /// sequence of calls produces a running MAC over the whole
    /// sequence.
    fn mac_64(&self, data: &[u8], key: &CipherKey, chained_iv: Option<&mut u64>) -> u64;

    /// 32-bit XOR-fold of [`mac_64`](Self::mac_64).
    fn mac_32(&self, data: &[u8], key: &CipherKey, chained_iv: Option<&mut u64>) -> u32 {
        let mac = self.mac_64(data, key, chained_iv);
        (mac >> 32) as u32 ^ (mac & 0xffff_ffff) as u32
    }

    /// 16-bit XOR-fold of [`mac_64`](Self::mac_64).
    fn mac_16(&self, data: &[u8], key: &CipherKey, chained_iv: Option<&mut u64>) -> u16 {
        let mac = self.mac_32(data, key, chained_iv);
        (mac >> 16) as u16 ^ (mac & 0xffff) as u16
    }

    /// In-place stream encryption of arbitrary length.
    ///
    /// # Errors
    ///
    /// Returns an error on a wrong-sized key or if the family has no
    /// stream mode.
    fn stream_encode(&self, buf: &mut [u8], iv: u64, key: &CipherKey) -> CipherResult<()>;

    /// Inverse of [`stream_encode`](Self::stream_encode).
    ///
    /// # Errors
    ///
    /// See [`stream_encode`](Self::stream_encode).
    fn stream_decode(&self, buf: &mut [u8], iv: u64, key: &CipherKey) -> CipherResult<()>;

    /// In-place block encryption; `buf.len()` must be a multiple of
    /// [`cipher_block_size`](Self::cipher_block_size).
    ///
    /// # Errors
    ///
    /// Returns an error on a misaligned buffer or wrong-sized key.
    fn block_encode(&self, buf: &mut [u8], iv: u64, key: &CipherKey) -> CipherResult<()>;

    /// Inverse of [`block_encode`](Self::block_encode).
    ///
    /// # Errors
    ///
    /// See [`block_encode`](Self::block_encode).
    fn block_decode(&self, buf: &mut [u8], iv: u64, key: &CipherKey) -> CipherResult<()>;
}
