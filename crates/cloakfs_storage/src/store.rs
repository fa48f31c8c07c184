//! Backing-store trait definition.

use crate::error::StorageResult;

/// A byte-addressable store holding one ciphertext file.
///
/// Stores are **opaque byte ranges**. They provide positioned reads and
/// writes, truncation and durability; the encrypted file layer owns all
/// interpretation of headers, blocks and MAC prefixes.
///
/// # Invariants
///
/// - `read_at` returns exactly the bytes previously written at that
///   offset; it may return short only when the range crosses the
///   current end of the store
/// - `write_at` past the current end extends the store, zero-filling
///   any gap
/// - after `sync` returns, previously written data survives process
///   termination
/// - implementations must be `Send + Sync`; the encrypted file layer
///   serializes its own access but stores may be shared
pub trait BackingStore: Send + Sync {
    /// Reads into `buf` starting at `offset`, returning the number of
    /// bytes read.
    ///
    /// The result is `buf.len()` unless the range crosses the end of
    /// the store, in which case only the available prefix is filled.
    ///
    /// # Errors
    ///
    /// Returns an error if the host read fails.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> StorageResult<usize>;

    /// Writes `data` at `offset`, extending the store if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the host write fails.
    fn write_at(&self, offset: u64, data: &[u8]) -> StorageResult<()>;

    /// Sets the store length to `size`, dropping data past it or
    /// zero-extending.
    ///
    /// # Errors
    ///
    /// Returns an error if the host operation fails.
    fn truncate(&self, size: u64) -> StorageResult<()>;

    /// Requests durability for written data; with `data_only` set,
    /// metadata-only changes may be skipped where the host
    /// distinguishes.
    ///
    /// # Errors
    ///
    /// Returns an error if the host sync fails.
    fn sync(&self, data_only: bool) -> StorageResult<()>;

    /// Current size of the store in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> StorageResult<u64>;
}
