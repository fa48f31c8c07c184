//! In-memory store for tests.

use crate::error::StorageResult;
use crate::store::BackingStore;
use parking_lot::RwLock;

/// An in-memory backing store.
///
/// Used by unit tests and for ephemeral volumes. The extra accessors
/// (`data`, `with_data`) exist so tests can inspect and corrupt raw
/// ciphertext.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<Vec<u8>>,
}

impl MemoryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding pre-existing bytes. Useful for reopen
    /// and tamper scenarios.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            data: RwLock::new(data),
        }
    }

    /// Returns a copy of the raw contents.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.data.read().clone()
    }

    /// XORs one raw byte, for tamper tests.
    ///
    /// # Panics
    ///
    /// Panics if `offset` is out of range.
    pub fn flip_byte(&self, offset: usize) {
        self.data.write()[offset] ^= 0xff;
    }
}

impl BackingStore for MemoryStore {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> StorageResult<usize> {
        let data = self.data.read();
        let offset = usize::try_from(offset).unwrap_or(usize::MAX);
        if offset >= data.len() || buf.is_empty() {
            return Ok(0);
        }

        let want = buf.len().min(data.len() - offset);
        buf[..want].copy_from_slice(&data[offset..offset + want]);
        Ok(want)
    }

    fn write_at(&self, offset: u64, incoming: &[u8]) -> StorageResult<()> {
        if incoming.is_empty() {
            return Ok(());
        }
        let mut data = self.data.write();
        let offset = usize::try_from(offset).unwrap_or(usize::MAX);
        let end = offset + incoming.len();
        if end > data.len() {
            data.resize(end, 0);
        }
        data[offset..end].copy_from_slice(incoming);
        Ok(())
    }

    fn truncate(&self, size: u64) -> StorageResult<()> {
        let size = usize::try_from(size).unwrap_or(usize::MAX);
        self.data.write().resize(size, 0);
        Ok(())
    }

    fn sync(&self, _data_only: bool) -> StorageResult<()> {
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.data.read().len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_is_empty() {
        let store = MemoryStore::new();
        assert_eq!(store.size().unwrap(), 0);
        assert!(store.data().is_empty());
    }

    #[test]
    fn write_then_read() {
        let store = MemoryStore::new();
        store.write_at(0, b"hello world").unwrap();

        let mut buf = [0u8; 5];
        assert_eq!(store.read_at(6, &mut buf).unwrap(), 5);
        assert_eq!(&buf, b"world");
    }

    #[test]
    fn overwrite_in_place() {
        let store = MemoryStore::new();
        store.write_at(0, b"hello world").unwrap();
        store.write_at(0, b"jello").unwrap();

        let mut buf = [0u8; 11];
        store.read_at(0, &mut buf).unwrap();
        assert_eq!(&buf, b"jello world");
    }

    #[test]
    fn write_past_end_zero_fills() {
        let store = MemoryStore::new();
        store.write_at(4, b"x").unwrap();
        assert_eq!(store.data(), vec![0, 0, 0, 0, b'x']);
    }

    #[test]
    fn short_read_at_eof() {
        let store = MemoryStore::with_data(b"abc".to_vec());
        let mut buf = [0u8; 10];
        assert_eq!(store.read_at(2, &mut buf).unwrap(), 1);
        assert_eq!(buf[0], b'c');
        assert_eq!(store.read_at(3, &mut buf).unwrap(), 0);
    }

    #[test]
    fn truncate_shrinks_and_grows() {
        let store = MemoryStore::with_data(b"hello".to_vec());
        store.truncate(2).unwrap();
        assert_eq!(store.data(), b"he");
        store.truncate(4).unwrap();
        assert_eq!(store.data(), b"he\0\0");
    }

    #[test]
    fn flip_byte_corrupts() {
        let store = MemoryStore::with_data(vec![0x00, 0x11]);
        store.flip_byte(1);
        assert_eq!(store.data(), vec![0x00, 0xee]);
    }
}
