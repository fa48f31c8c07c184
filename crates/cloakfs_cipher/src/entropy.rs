//! Process-wide entropy sources.
//!
//! Two tiers: the OS CSPRNG for key-grade material, and the
//! thread-local generator for IVs and MAC salts where speed matters
//! and predictability only costs a little convergence of ciphertexts.

use crate::error::{CipherError, CipherResult};
use rand::rngs::OsRng;
use rand::RngCore;

/// Fills `buf` with random bytes.
///
/// With `strong` set the OS CSPRNG is used and failure is surfaced;
/// this is the only acceptable source for keys. Otherwise the
/// thread-local generator is used.
///
/// # Errors
///
/// Returns [`CipherError::Entropy`] if the OS source fails while
/// `strong` is set.
pub fn fill_random(buf: &mut [u8], strong: bool) -> CipherResult<()> {
    if strong {
        OsRng.try_fill_bytes(buf).map_err(|_| CipherError::Entropy)
    } else {
        rand::thread_rng().fill_bytes(buf);
        Ok(())
    }
}
