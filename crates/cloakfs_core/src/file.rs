//! Block-oriented encrypted file I/O.
//!
//! Presents a plaintext byte-addressable view over a ciphertext file
//! laid out as `[header block?][data block 0][data block 1]…`. Every
//! data block holds `block_size` plaintext bytes (the final block may
//! be short) behind an optional `mac_bytes + rand_bytes` MAC header.
//! The header block, present when the volume uses per-file IVs, stores
//! the 64-bit file IV and a plaintext-size hint, encrypted under the
//! external chain IV and carrying the same MAC prefix as data blocks.
//!
//! All operations on one file serialize on a single coarse mutex held
//! across the crypto work, so truncate, write and read can never
//! interleave partial block updates. Different files proceed in
//! parallel.

use crate::config::VolumeConfig;
use crate::error::{CoreError, CoreResult, ErrorKind};
use cloakfs_cipher::{Cipher, CipherKey};
use cloakfs_storage::BackingStore;

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

/// Reserved block index used for the header block's MAC and IV
/// derivation; can never collide with a data block.
pub const HEADER_BLOCK_INDEX: u64 = u64::MAX;

const FILE_IV_BYTES: usize = 8;
const SIZE_HINT_BYTES: usize = 8;

/// Per-file layout parameters, normally taken from the volume
/// configuration.
#[derive(Debug, Clone)]
pub struct FileOptions {
    /// Plaintext bytes per block.
    pub block_size: usize,
    /// Stored MAC bytes per block (0 disables block MACs).
    pub mac_bytes: usize,
    /// Random bytes mixed into each block's MAC header.
    pub rand_bytes: usize,
    /// Whether the file stores its own IV in a header block.
    pub unique_iv: bool,
    /// External chain IV for the header block; 0 unless the volume
    /// chains file IVs from paths.
    pub external_iv: u64,
}

impl FileOptions {
    /// Derives options from a volume configuration, with no external
    /// IV.
    #[must_use]
    pub fn from_config(config: &VolumeConfig) -> Self {
        Self {
            block_size: config.block_size_bytes as usize,
            mac_bytes: config.block_mac_bytes as usize,
            rand_bytes: config.block_mac_rand_bytes as usize,
            unique_iv: config.unique_iv,
            external_iv: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileState {
    Open,
    Degraded(ErrorKind),
    Closed,
}

#[derive(Debug)]
struct FileInner {
    state: FileState,
    file_iv: u64,
    external_iv: u64,
    plain_size: u64,
    /// Whether the header block exists on the backing store yet. The
    /// header is created lazily on the first mutating operation.
    header_persisted: bool,
    /// Whether the persisted header lags the cached plaintext size.
    header_dirty: bool,
}

/// A plaintext view over one ciphertext backing store.
///
/// Created per open file; holds the volume cipher and key shared with
/// every other handle on the volume. Block contents are never cached
/// across operations.
pub struct EncryptedFile {
    store: Arc<dyn BackingStore>,
    cipher: Arc<dyn Cipher>,
    key: CipherKey,
    block_size: usize,
    mac_bytes: usize,
    rand_bytes: usize,
    unique_iv: bool,
    inner: Mutex<FileInner>,
}

impl EncryptedFile {
    /// Opens the plaintext view, reading or synthesizing the file IV.
    ///
    /// For a non-empty store with per-file IVs the header block is read
    /// and verified; for an empty one a fresh IV is drawn and persisted
    /// lazily on first write.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::BadConfig`] for impossible layouts and
    /// [`CoreError::Integrity`] for a corrupt or mismatched header.
    pub fn open(
        store: Arc<dyn BackingStore>,
        cipher: Arc<dyn Cipher>,
        key: CipherKey,
        options: &FileOptions,
    ) -> CoreResult<Self> {
        let cbs = cipher.cipher_block_size();
        if options.block_size == 0 || options.block_size % cbs != 0 {
            return Err(CoreError::bad_config(format!(
                "block size {} is not a multiple of the cipher block size {cbs}",
                options.block_size
            )));
        }
        if options.mac_bytes > 8 {
            return Err(CoreError::bad_config(format!(
                "block MAC is {} bytes, at most 8 are supported",
                options.mac_bytes
            )));
        }
        if options.mac_bytes == 0 && options.rand_bytes > 0 {
            return Err(CoreError::bad_config(
                "random MAC header bytes require a non-zero block MAC",
            ));
        }
        if options.mac_bytes + options.rand_bytes >= options.block_size {
            return Err(CoreError::bad_config(
                "MAC header does not fit inside the block size",
            ));
        }
        if options.unique_iv && options.block_size < FILE_IV_BYTES + SIZE_HINT_BYTES {
            return Err(CoreError::bad_config(
                "block size too small to hold the file header",
            ));
        }

        let file = Self {
            store,
            cipher,
            key,
            block_size: options.block_size,
            mac_bytes: options.mac_bytes,
            rand_bytes: options.rand_bytes,
            unique_iv: options.unique_iv,
            inner: Mutex::new(FileInner {
                state: FileState::Open,
                file_iv: 0,
                external_iv: options.external_iv,
                plain_size: 0,
                header_persisted: false,
                header_dirty: false,
            }),
        };

        let ct_size = file.store.size()?;
        {
            let mut inner = file.inner.lock();
            if !file.unique_iv {
                inner.file_iv = 0;
                inner.plain_size = file.plain_size_from_ct(ct_size)?;
                inner.header_persisted = true;
            } else if ct_size == 0 {
                let mut iv_bytes = [0u8; FILE_IV_BYTES];
                file.cipher.randomize(&mut iv_bytes, false)?;
                inner.file_iv = u64::from_le_bytes(iv_bytes);
            } else {
                let (file_iv, size_hint) = file.read_header(inner.external_iv)?;
                inner.file_iv = file_iv;
                inner.header_persisted = true;
                let derived = file.plain_size_from_ct(ct_size)?;
                inner.plain_size = file.reconcile_size(derived, size_hint);
            }
        }

        debug!(
            block_size = file.block_size,
            mac_bytes = file.mac_bytes,
            unique_iv = file.unique_iv,
            "opened encrypted file"
        );
        Ok(file)
    }

    /// Reads plaintext at `offset` into `buf`, returning the number of
    /// bytes read (clamped at the end of the file).
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Integrity`] on a block MAC mismatch or
    /// structurally short block; an I/O error degrades the handle.
    pub fn read(&self, offset: u64, buf: &mut [u8]) -> CoreResult<usize> {
        self.with_inner(|file, inner| {
            if buf.is_empty() || offset >= inner.plain_size {
                return Ok(0);
            }
            let block = file.block_size as u64;
            let end = (offset + buf.len() as u64).min(inner.plain_size);
            let first = offset / block;
            let last = (end - 1) / block;

            let mut filled = 0usize;
            for index in first..=last {
                let block_start = index * block;
                let payload = file.read_block(inner, index)?;
                let from = if index == first {
                    (offset - block_start) as usize
                } else {
                    0
                };
                let to = ((end - block_start) as usize).min(payload.len());
                if from < to {
                    buf[filled..filled + (to - from)].copy_from_slice(&payload[from..to]);
                    filled += to - from;
                }
            }
            Ok(filled)
        })
    }

    /// Writes `data` at `offset`, extending the file (zero-filled) if
    /// the offset lies past the current end.
    ///
    /// Partial head and tail blocks are read-modify-written; fully
    /// covered blocks skip the read. A MAC failure during
    /// read-modify-write fails the write before any write-back.
    ///
    /// # Errors
    ///
    /// See [`read`](Self::read); additionally surfaces entropy and
    /// store write failures.
    pub fn write(&self, offset: u64, data: &[u8]) -> CoreResult<()> {
        self.with_inner(|file, inner| {
            if data.is_empty() {
                return Ok(());
            }
            file.ensure_header(inner)?;
            if offset > inner.plain_size {
                file.extend_with_zeros(inner, offset)?;
            }

            let block = file.block_size as u64;
            let end = offset + data.len() as u64;
            let first = offset / block;
            let last = (end - 1) / block;

            for index in first..=last {
                let block_start = index * block;
                let block_end = block_start + block;
                let seg_start = offset.max(block_start);
                let seg_end = end.min(block_end);
                let data_slice = &data[(seg_start - offset) as usize..(seg_end - offset) as usize];

                let existing = inner.plain_size.saturating_sub(block_start).min(block) as usize;
                let covers_existing =
                    seg_start == block_start && (seg_end - block_start) as usize >= existing;

                let payload = if covers_existing {
                    data_slice.to_vec()
                } else {
                    let mut payload = if existing > 0 {
                        file.read_block(inner, index)?
                    } else {
                        Vec::new()
                    };
                    let needed = (seg_end - block_start) as usize;
                    if payload.len() < needed {
                        payload.resize(needed, 0);
                    }
                    payload[(seg_start - block_start) as usize..needed].copy_from_slice(data_slice);
                    payload
                };
                file.write_block(inner, index, &payload)?;
            }

            if end > inner.plain_size {
                inner.plain_size = end;
                inner.header_dirty = true;
            }
            Ok(())
        })
    }

    /// Sets the plaintext size to `size`.
    ///
    /// Shrinking re-encrypts a now-partial final block and cuts the
    /// backing store; growing zero-fills through
    /// the same path as writes past the end.
    ///
    /// # Errors
    ///
    /// See [`write`](Self::write).
    pub fn truncate(&self, size: u64) -> CoreResult<()> {
        self.with_inner(|file, inner| {
            let current = inner.plain_size;
            if size == current {
                return Ok(());
            }
            file.ensure_header(inner)?;

            if size > current {
                file.extend_with_zeros(inner, size)?;
                return Ok(());
            }

            if size == 0 {
                file.store.truncate(file.header_len())?;
                inner.plain_size = 0;
                inner.header_dirty = true;
                return Ok(());
            }

            let block = file.block_size as u64;
            let last_index = (size - 1) / block;
            let keep = size - last_index * block;

            if keep < block {
                let mut payload = file.read_block(inner, last_index)?;
                payload.truncate(keep as usize);
                file.write_block(inner, last_index, &payload)?;
            }

            let ct_end = file.block_offset(last_index)
                + (file.prefix_len() + file.stored_payload_len(keep as usize)) as u64;
            file.store.truncate(ct_end)?;

            inner.plain_size = size;
            inner.header_dirty = true;
            Ok(())
        })
    }

    /// Flushes the cached plaintext size into the header block, then
    /// requests durability from the backing store. `data_only` maps to
    /// the store's data-sync where it distinguishes.
    ///
    /// # Errors
    ///
    /// Surfaces store failures; an I/O error degrades the handle.
    pub fn sync(&self, data_only: bool) -> CoreResult<()> {
        self.with_inner(|file, inner| {
            if file.unique_iv && inner.header_persisted && inner.header_dirty {
                file.write_header(inner)?;
                inner.header_dirty = false;
            }
            file.store.sync(data_only)?;
            Ok(())
        })
    }

    /// Closes the handle, persisting a pending header update. Valid in
    /// any state; closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the header write failure, if any; the handle is closed
    /// regardless.
    pub fn close(&self) -> CoreResult<()> {
        let mut inner = self.inner.lock();
        let flush = match inner.state {
            FileState::Open
                if self.unique_iv && inner.header_persisted && inner.header_dirty =>
            {
                let result = self.write_header(&inner);
                if result.is_ok() {
                    inner.header_dirty = false;
                }
                result
            }
            _ => Ok(()),
        };
        inner.state = FileState::Closed;
        flush
    }

    /// Current plaintext size in bytes.
    ///
    /// # Errors
    ///
    /// Fails on a closed or degraded handle.
    pub fn size(&self) -> CoreResult<u64> {
        self.with_inner(|_, inner| Ok(inner.plain_size))
    }

    /// Re-keys the header block under a new external chain IV, used
    /// when a rename moves the file under external IV chaining.
    ///
    /// # Errors
    ///
    /// Surfaces header write failures.
    pub fn set_external_iv(&self, external_iv: u64) -> CoreResult<()> {
        self.with_inner(|file, inner| {
            if inner.external_iv == external_iv {
                return Ok(());
            }
            inner.external_iv = external_iv;
            if file.unique_iv && inner.header_persisted {
                file.write_header(inner)?;
                inner.header_dirty = false;
            }
            Ok(())
        })
    }

    // ---- geometry ----------------------------------------------------

    fn prefix_len(&self) -> usize {
        self.mac_bytes + self.rand_bytes
    }

    fn header_len(&self) -> u64 {
        if self.unique_iv {
            (self.prefix_len() + self.block_size) as u64
        } else {
            0
        }
    }

    fn block_offset(&self, index: u64) -> u64 {
        self.header_len() + index * (self.prefix_len() + self.block_size) as u64
    }

    /// On-store payload length for a block holding `payload_len`
    /// plaintext bytes. Differs only for a short final block under a
    /// stream-less cipher, which is padded to the cipher block size.
    fn stored_payload_len(&self, payload_len: usize) -> usize {
        if payload_len == self.block_size || self.cipher.has_stream_mode() {
            payload_len
        } else {
            let cbs = self.cipher.cipher_block_size();
            payload_len.div_ceil(cbs) * cbs
        }
    }

    /// Derives the plaintext size from the ciphertext size; this is the
    /// crash-safe ground truth, the header hint only disambiguates the
    /// padded-final-block case.
    fn plain_size_from_ct(&self, ct_size: u64) -> CoreResult<u64> {
        if ct_size == 0 {
            return Ok(0);
        }
        let data = ct_size
            .checked_sub(self.header_len())
            .ok_or(CoreError::Integrity {
                block: HEADER_BLOCK_INDEX,
            })?;
        if data == 0 {
            return Ok(0);
        }

        let full = (self.prefix_len() + self.block_size) as u64;
        let whole = data / full;
        let rem = data % full;
        if rem == 0 {
            return Ok(whole * self.block_size as u64);
        }
        let prefix = self.prefix_len() as u64;
        if rem <= prefix {
            return Err(CoreError::Integrity { block: whole });
        }
        Ok(whole * self.block_size as u64 + (rem - prefix))
    }

    fn reconcile_size(&self, derived: u64, hint: u64) -> u64 {
        if self.cipher.has_stream_mode() {
            return derived;
        }
        // A padded final block makes the derived size a cipher-block
        // round-up of the true size; accept a hint inside that window.
        let cbs = self.cipher.cipher_block_size() as u64;
        if hint <= derived && derived - hint < cbs {
            hint
        } else {
            derived
        }
    }

    // ---- block crypto ------------------------------------------------

    fn block_mac(&self, index: u64, rand: &[u8], ciphertext: &[u8]) -> Vec<u8> {
        let mut data = Vec::with_capacity(8 + rand.len() + ciphertext.len());
        data.extend_from_slice(&index.to_le_bytes());
        data.extend_from_slice(rand);
        data.extend_from_slice(ciphertext);
        let mac = self.cipher.mac_64(&data, &self.key, None);
        mac.to_le_bytes()[..self.mac_bytes].to_vec()
    }

    fn encrypt_payload(&self, file_iv: u64, index: u64, payload: &mut Vec<u8>) -> CoreResult<()> {
        let iv = file_iv ^ index;
        if payload.len() == self.block_size {
            self.cipher.block_encode(payload, iv, &self.key)?;
        } else if self.cipher.has_stream_mode() {
            self.cipher.stream_encode(payload, iv, &self.key)?;
        } else {
            let cbs = self.cipher.cipher_block_size();
            payload.resize(payload.len().div_ceil(cbs) * cbs, 0);
            self.cipher.block_encode(payload, iv, &self.key)?;
        }
        Ok(())
    }

    fn decrypt_payload(
        &self,
        file_iv: u64,
        index: u64,
        payload: &mut Vec<u8>,
        plain_len: usize,
    ) -> CoreResult<()> {
        let iv = file_iv ^ index;
        if payload.len() == self.block_size {
            self.cipher.block_decode(payload, iv, &self.key)?;
        } else if self.cipher.has_stream_mode() {
            self.cipher.stream_decode(payload, iv, &self.key)?;
        } else {
            self.cipher.block_decode(payload, iv, &self.key)?;
            payload.truncate(plain_len);
        }
        Ok(())
    }

    /// Reads, MAC-checks and decrypts one data block, returning its
    /// plaintext payload. The expected length comes from the cached
    /// plaintext size, so a short store read is corruption.
    fn read_block(&self, inner: &FileInner, index: u64) -> CoreResult<Vec<u8>> {
        let block = self.block_size as u64;
        let block_start = index * block;
        let payload_len = (inner.plain_size - block_start).min(block) as usize;
        let stored = self.stored_payload_len(payload_len);
        let total = self.prefix_len() + stored;

        let mut raw = vec![0u8; total];
        let got = self.store.read_at(self.block_offset(index), &mut raw)?;
        if got != total {
            warn!(block = index, got, expected = total, "short ciphertext block read");
            return Err(CoreError::Integrity { block: index });
        }

        let (prefix, ciphertext) = raw.split_at(self.prefix_len());
        if self.mac_bytes > 0 {
            let computed = self.block_mac(index, &prefix[self.mac_bytes..], ciphertext);
            if prefix[..self.mac_bytes] != computed[..] {
                warn!(block = index, "block MAC mismatch");
                return Err(CoreError::Integrity { block: index });
            }
        }

        let mut payload = ciphertext.to_vec();
        self.decrypt_payload(inner.file_iv, index, &mut payload, payload_len)?;
        Ok(payload)
    }

    /// Encrypts and writes one data block, prefixing fresh random bytes
    /// and a MAC computed over the ciphertext (encrypt-then-MAC).
    fn write_block(&self, inner: &FileInner, index: u64, payload: &[u8]) -> CoreResult<()> {
        let mut ciphertext = payload.to_vec();
        self.encrypt_payload(inner.file_iv, index, &mut ciphertext)?;

        let mut raw = Vec::with_capacity(self.prefix_len() + ciphertext.len());
        if self.prefix_len() > 0 {
            let mut rand = vec![0u8; self.rand_bytes];
            self.cipher.randomize(&mut rand, false)?;
            let mac = self.block_mac(index, &rand, &ciphertext);
            raw.extend_from_slice(&mac);
            raw.extend_from_slice(&rand);
        }
        raw.extend_from_slice(&ciphertext);

        self.store.write_at(self.block_offset(index), &raw)?;
        Ok(())
    }

    // ---- header ------------------------------------------------------

    /// Header MAC input additionally covers the external chain IV, so
    /// a file opened under the wrong path binding fails verification
    /// instead of silently decrypting garbage.
    fn header_mac(&self, external_iv: u64, rand: &[u8], ciphertext: &[u8]) -> Vec<u8> {
        let mut data = Vec::with_capacity(16 + rand.len() + ciphertext.len());
        data.extend_from_slice(&HEADER_BLOCK_INDEX.to_le_bytes());
        data.extend_from_slice(&external_iv.to_le_bytes());
        data.extend_from_slice(rand);
        data.extend_from_slice(ciphertext);
        let mac = self.cipher.mac_64(&data, &self.key, None);
        mac.to_le_bytes()[..self.mac_bytes].to_vec()
    }

    fn read_header(&self, external_iv: u64) -> CoreResult<(u64, u64)> {
        let total = self.prefix_len() + self.block_size;
        let mut raw = vec![0u8; total];
        let got = self.store.read_at(0, &mut raw)?;
        if got != total {
            return Err(CoreError::Integrity {
                block: HEADER_BLOCK_INDEX,
            });
        }

        let (prefix, ciphertext) = raw.split_at(self.prefix_len());
        if self.mac_bytes > 0 {
            let computed = self.header_mac(external_iv, &prefix[self.mac_bytes..], ciphertext);
            if prefix[..self.mac_bytes] != computed[..] {
                warn!("header block MAC mismatch");
                return Err(CoreError::Integrity {
                    block: HEADER_BLOCK_INDEX,
                });
            }
        }

        let mut payload = ciphertext.to_vec();
        self.cipher.block_decode(&mut payload, external_iv, &self.key)?;

        let file_iv = u64::from_le_bytes(
            payload[..FILE_IV_BYTES]
                .try_into()
                .expect("header slice is 8 bytes"),
        );
        let size_hint = u64::from_le_bytes(
            payload[FILE_IV_BYTES..FILE_IV_BYTES + SIZE_HINT_BYTES]
                .try_into()
                .expect("header slice is 8 bytes"),
        );
        Ok((file_iv, size_hint))
    }

    fn write_header(&self, inner: &FileInner) -> CoreResult<()> {
        let mut payload = vec![0u8; self.block_size];
        payload[..FILE_IV_BYTES].copy_from_slice(&inner.file_iv.to_le_bytes());
        payload[FILE_IV_BYTES..FILE_IV_BYTES + SIZE_HINT_BYTES]
            .copy_from_slice(&inner.plain_size.to_le_bytes());
        self.cipher
            .block_encode(&mut payload, inner.external_iv, &self.key)?;

        let mut raw = Vec::with_capacity(self.prefix_len() + payload.len());
        if self.prefix_len() > 0 {
            let mut rand = vec![0u8; self.rand_bytes];
            self.cipher.randomize(&mut rand, false)?;
            let mac = self.header_mac(inner.external_iv, &rand, &payload);
            raw.extend_from_slice(&mac);
            raw.extend_from_slice(&rand);
        }
        raw.extend_from_slice(&payload);

        self.store.write_at(0, &raw)?;
        Ok(())
    }

    /// Creates the header block if the layout calls for one and it does
    /// not exist yet. Runs at the start of every mutating operation so
    /// a crash can never leave data blocks without their header.
    fn ensure_header(&self, inner: &mut FileInner) -> CoreResult<()> {
        if self.unique_iv && !inner.header_persisted {
            self.write_header(inner)?;
            inner.header_persisted = true;
            inner.header_dirty = false;
        }
        Ok(())
    }

    // ---- state handling ----------------------------------------------

    /// Runs `f` under the file mutex after checking the state, and
    /// degrades the handle if `f` fails with an I/O error. MAC failures
    /// surface without changing state.
    fn with_inner<T>(
        &self,
        f: impl FnOnce(&Self, &mut FileInner) -> CoreResult<T>,
    ) -> CoreResult<T> {
        let mut inner = self.inner.lock();
        match inner.state {
            FileState::Closed => return Err(CoreError::Closed),
            FileState::Degraded(kind) => return Err(CoreError::Degraded { kind }),
            FileState::Open => {}
        }
        let result = f(self, &mut inner);
        if let Err(err) = &result {
            if err.kind() == ErrorKind::Io {
                inner.state = FileState::Degraded(ErrorKind::Io);
            }
        }
        result
    }

    /// Zero-fills from the current size up to `target`. The existing
    /// partial final block, if any, grows first; fresh blocks are
    /// written as encrypted zeros without reading anything.
    fn extend_with_zeros(&self, inner: &mut FileInner, target: u64) -> CoreResult<()> {
        let block = self.block_size as u64;
        debug_assert!(target > inner.plain_size);

        if inner.plain_size % block != 0 {
            let index = inner.plain_size / block;
            let block_start = index * block;
            let new_len = (target - block_start).min(block) as usize;
            let mut payload = self.read_block(inner, index)?;
            if new_len > payload.len() {
                payload.resize(new_len, 0);
                self.write_block(inner, index, &payload)?;
                inner.plain_size = block_start + new_len as u64;
            }
        }

        while inner.plain_size < target {
            let index = inner.plain_size / block;
            let len = (target - inner.plain_size).min(block) as usize;
            self.write_block(inner, index, &vec![0u8; len])?;
            inner.plain_size += len as u64;
        }

        inner.header_dirty = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloakfs_cipher::registry;
    use cloakfs_storage::{MemoryStore, StorageError, StorageResult};

    fn cipher_and_key() -> (Arc<dyn Cipher>, CipherKey) {
        let cipher = registry().new_cipher_by_name("aes", 256).unwrap();
        let key = cipher
            .new_key_from_password(b"file layer tests", 64, 0, b"salt")
            .unwrap()
            .0;
        (cipher, key)
    }

    fn options(block_size: usize, mac_bytes: usize, rand_bytes: usize) -> FileOptions {
        FileOptions {
            block_size,
            mac_bytes,
            rand_bytes,
            unique_iv: true,
            external_iv: 0,
        }
    }

    fn open_file(store: &Arc<MemoryStore>, opts: &FileOptions) -> EncryptedFile {
        let (cipher, key) = cipher_and_key();
        EncryptedFile::open(store.clone() as Arc<dyn BackingStore>, cipher, key, opts).unwrap()
    }

    #[test]
    fn rejects_impossible_layouts() {
        let (cipher, key) = cipher_and_key();
        let store: Arc<dyn BackingStore> = Arc::new(MemoryStore::new());

        let mut opts = options(100, 8, 0); // not a multiple of 16
        assert!(EncryptedFile::open(store.clone(), cipher.clone(), key.clone(), &opts).is_err());

        opts = options(64, 9, 0);
        assert!(EncryptedFile::open(store.clone(), cipher.clone(), key.clone(), &opts).is_err());

        opts = options(64, 0, 4);
        assert!(EncryptedFile::open(store, cipher, key, &opts).is_err());
    }

    #[test]
    fn write_then_read_roundtrip() {
        let store = Arc::new(MemoryStore::new());
        let file = open_file(&store, &options(64, 8, 0));

        let data = b"some plaintext that spans more than one sixty-four byte block easily";
        file.write(0, data).unwrap();
        assert_eq!(file.size().unwrap(), data.len() as u64);

        let mut buf = vec![0u8; data.len()];
        assert_eq!(file.read(0, &mut buf).unwrap(), data.len());
        assert_eq!(&buf, data);
    }

    #[test]
    fn partial_block_write_leaves_zeros_around() {
        let store = Arc::new(MemoryStore::new());
        let file = open_file(&store, &options(64, 8, 0));

        file.write(30, b"hello").unwrap();
        assert_eq!(file.size().unwrap(), 35);

        let mut buf = vec![0xaau8; 64];
        let got = file.read(0, &mut buf).unwrap();
        assert_eq!(got, 35);
        assert_eq!(&buf[..30], &[0u8; 30]);
        assert_eq!(&buf[30..35], b"hello");
    }

    #[test]
    fn interior_overwrite_preserves_neighbors() {
        let store = Arc::new(MemoryStore::new());
        let file = open_file(&store, &options(64, 8, 0));

        let data: Vec<u8> = (0..200u8).collect();
        file.write(0, &data).unwrap();
        file.write(60, b"XYZ").unwrap();

        let mut buf = vec![0u8; 200];
        assert_eq!(file.read(0, &mut buf).unwrap(), 200);
        assert_eq!(&buf[..60], &data[..60]);
        assert_eq!(&buf[60..63], b"XYZ");
        assert_eq!(&buf[63..], &data[63..]);
    }

    #[test]
    fn write_past_end_zero_fills_gap() {
        let store = Arc::new(MemoryStore::new());
        let file = open_file(&store, &options(64, 8, 0));

        file.write(0, b"head").unwrap();
        file.write(150, b"tail").unwrap();
        assert_eq!(file.size().unwrap(), 154);

        let mut buf = vec![0xffu8; 154];
        file.read(0, &mut buf).unwrap();
        assert_eq!(&buf[..4], b"head");
        assert!(buf[4..150].iter().all(|&b| b == 0));
        assert_eq!(&buf[150..], b"tail");
    }

    #[test]
    fn persists_across_reopen() {
        let store = Arc::new(MemoryStore::new());
        let opts = options(64, 8, 0);
        let data: Vec<u8> = (0..130u8).collect();

        {
            let file = open_file(&store, &opts);
            file.write(0, &data).unwrap();
            file.close().unwrap();
        }

        let reopened = Arc::new(MemoryStore::with_data(store.data()));
        let file = open_file(&reopened, &opts);
        assert_eq!(file.size().unwrap(), 130);

        let mut buf = vec![0u8; 130];
        assert_eq!(file.read(0, &mut buf).unwrap(), 130);
        assert_eq!(buf, data);
    }

    #[test]
    fn ciphertext_layout_matches_geometry() {
        let store = Arc::new(MemoryStore::new());
        let file = open_file(&store, &options(64, 8, 4));

        file.write(0, &[7u8; 100]).unwrap();
        // header (12 + 64) + block 0 (12 + 64) + block 1 (12 + 36)
        assert_eq!(store.size().unwrap(), 76 + 76 + 48);
        drop(file);
    }

    #[test]
    fn no_header_without_unique_iv() {
        let store = Arc::new(MemoryStore::new());
        let mut opts = options(64, 8, 0);
        opts.unique_iv = false;
        let file = open_file(&store, &opts);

        file.write(0, &[1u8; 64]).unwrap();
        assert_eq!(store.size().unwrap(), 8 + 64);

        let mut buf = [0u8; 64];
        assert_eq!(file.read(0, &mut buf).unwrap(), 64);
        assert_eq!(buf, [1u8; 64]);
    }

    #[test]
    fn mac_tamper_is_detected() {
        let store = Arc::new(MemoryStore::new());
        let opts = options(64, 8, 0);
        let file = open_file(&store, &opts);
        file.write(0, &[42u8; 64]).unwrap();

        // Flip a byte inside data block 0's ciphertext (after the
        // header block and block 0's MAC prefix).
        store.flip_byte(72 + 8 + 3);

        let mut buf = [0u8; 1];
        let err = file.read(0, &mut buf).unwrap_err();
        assert!(matches!(err, CoreError::Integrity { block: 0 }));
        // MAC failures do not degrade the handle.
        assert_eq!(file.size().unwrap(), 64);
    }

    #[test]
    fn mac_failure_aborts_read_modify_write() {
        let store = Arc::new(MemoryStore::new());
        let file = open_file(&store, &options(64, 8, 0));
        file.write(0, &[1u8; 32]).unwrap();

        store.flip_byte(72 + 8 + 1);
        let before = store.data();

        // Overwriting part of the corrupt block needs its plaintext.
        let err = file.write(10, b"zz").unwrap_err();
        assert!(matches!(err, CoreError::Integrity { .. }));
        assert_eq!(store.data(), before, "no partial write-back");
    }

    #[test]
    fn rand_bytes_force_distinct_ciphertext() {
        let opts = options(64, 8, 8);
        let store = Arc::new(MemoryStore::new());
        let file = open_file(&store, &opts);

        file.write(0, &[9u8; 64]).unwrap();
        let first = store.data();
        file.write(0, &[9u8; 64]).unwrap();
        assert_ne!(store.data(), first);
    }

    #[test]
    fn truncate_down_then_read() {
        let store = Arc::new(MemoryStore::new());
        let file = open_file(&store, &options(64, 8, 0));

        let data: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
        file.write(0, &data).unwrap();
        file.truncate(100).unwrap();
        assert_eq!(file.size().unwrap(), 100);

        let mut buf = vec![0u8; 1000];
        let got = file.read(50, &mut buf).unwrap();
        assert_eq!(got, 50);
        assert_eq!(&buf[..50], &data[50..100]);
    }

    #[test]
    fn truncate_up_reads_back_zeros() {
        let store = Arc::new(MemoryStore::new());
        let file = open_file(&store, &options(64, 8, 0));

        file.write(0, b"abc").unwrap();
        file.truncate(200).unwrap();
        assert_eq!(file.size().unwrap(), 200);

        let mut buf = vec![0xffu8; 200];
        assert_eq!(file.read(0, &mut buf).unwrap(), 200);
        assert_eq!(&buf[..3], b"abc");
        assert!(buf[3..].iter().all(|&b| b == 0));
    }

    #[test]
    fn truncate_to_zero_keeps_header_only() {
        let store = Arc::new(MemoryStore::new());
        let file = open_file(&store, &options(64, 8, 0));

        file.write(0, &[5u8; 300]).unwrap();
        file.truncate(0).unwrap();
        assert_eq!(file.size().unwrap(), 0);
        assert_eq!(store.size().unwrap(), 72);

        file.write(0, b"fresh").unwrap();
        let mut buf = [0u8; 5];
        assert_eq!(file.read(0, &mut buf).unwrap(), 5);
        assert_eq!(&buf, b"fresh");
    }

    #[test]
    fn sync_persists_size_hint() {
        let store = Arc::new(MemoryStore::new());
        let opts = options(64, 8, 0);
        let file = open_file(&store, &opts);

        file.write(0, &[3u8; 90]).unwrap();
        file.sync(true).unwrap();

        let reopened = Arc::new(MemoryStore::with_data(store.data()));
        let file2 = open_file(&reopened, &opts);
        assert_eq!(file2.size().unwrap(), 90);
    }

    #[test]
    fn closed_handle_rejects_operations() {
        let store = Arc::new(MemoryStore::new());
        let file = open_file(&store, &options(64, 8, 0));
        file.write(0, b"x").unwrap();
        file.close().unwrap();

        assert!(matches!(file.size(), Err(CoreError::Closed)));
        assert!(matches!(file.write(0, b"y"), Err(CoreError::Closed)));
        assert!(file.close().is_ok());
    }

    /// Store wrapper that starts failing on demand, for degraded-state
    /// tests.
    struct FailingStore {
        inner: MemoryStore,
        failing: std::sync::atomic::AtomicBool,
    }

    impl FailingStore {
        fn new() -> Self {
            Self {
                inner: MemoryStore::new(),
                failing: std::sync::atomic::AtomicBool::new(false),
            }
        }

        fn fail_from_now(&self) {
            self.failing.store(true, std::sync::atomic::Ordering::SeqCst);
        }

        fn check(&self) -> StorageResult<()> {
            if self.failing.load(std::sync::atomic::Ordering::SeqCst) {
                Err(StorageError::Io(std::io::Error::other("injected failure")))
            } else {
                Ok(())
            }
        }
    }

    impl BackingStore for FailingStore {
        fn read_at(&self, offset: u64, buf: &mut [u8]) -> StorageResult<usize> {
            self.check()?;
            self.inner.read_at(offset, buf)
        }
        fn write_at(&self, offset: u64, data: &[u8]) -> StorageResult<()> {
            self.check()?;
            self.inner.write_at(offset, data)
        }
        fn truncate(&self, size: u64) -> StorageResult<()> {
            self.check()?;
            self.inner.truncate(size)
        }
        fn sync(&self, data_only: bool) -> StorageResult<()> {
            self.check()?;
            self.inner.sync(data_only)
        }
        fn size(&self) -> StorageResult<u64> {
            self.check()?;
            self.inner.size()
        }
    }

    #[test]
    fn io_error_degrades_handle_until_close() {
        let store = Arc::new(FailingStore::new());
        let (cipher, key) = cipher_and_key();
        let file = EncryptedFile::open(
            store.clone() as Arc<dyn BackingStore>,
            cipher,
            key,
            &options(64, 8, 0),
        )
        .unwrap();

        file.write(0, &[1u8; 64]).unwrap();

        store.fail_from_now();
        let mut buf = [0u8; 16];
        let err = file.read(0, &mut buf).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);

        // Same error kind replays for every further operation.
        assert!(matches!(
            file.write(0, b"x"),
            Err(CoreError::Degraded {
                kind: ErrorKind::Io
            })
        ));
        assert!(matches!(file.size(), Err(CoreError::Degraded { .. })));
        assert!(file.close().is_ok());
    }

    #[test]
    fn external_iv_mismatch_is_detected() {
        let store = Arc::new(MemoryStore::new());
        let (cipher, key) = cipher_and_key();
        let mut opts = options(64, 8, 0);
        opts.external_iv = 1111;

        let file = EncryptedFile::open(
            store.clone() as Arc<dyn BackingStore>,
            cipher.clone(),
            key.clone(),
            &opts,
        )
        .unwrap();
        file.write(0, b"bound to a path").unwrap();
        file.close().unwrap();

        let mut wrong = opts.clone();
        wrong.external_iv = 2222;
        let reopened = Arc::new(MemoryStore::with_data(store.data()));
        let result = EncryptedFile::open(
            reopened as Arc<dyn BackingStore>,
            cipher,
            key,
            &wrong,
        );
        assert!(matches!(
            result,
            Err(CoreError::Integrity {
                block: HEADER_BLOCK_INDEX
            })
        ));
    }

    #[test]
    fn set_external_iv_rebinds_header() {
        let store = Arc::new(MemoryStore::new());
        let (cipher, key) = cipher_and_key();
        let mut opts = options(64, 8, 0);
        opts.external_iv = 1111;

        let file = EncryptedFile::open(
            store.clone() as Arc<dyn BackingStore>,
            cipher.clone(),
            key.clone(),
            &opts,
        )
        .unwrap();
        file.write(0, b"renamed later").unwrap();
        file.set_external_iv(2222).unwrap();
        file.close().unwrap();

        let mut moved = opts.clone();
        moved.external_iv = 2222;
        let reopened = Arc::new(MemoryStore::with_data(store.data()));
        let file = EncryptedFile::open(
            reopened as Arc<dyn BackingStore>,
            cipher,
            key,
            &moved,
        )
        .unwrap();
        let mut buf = [0u8; 13];
        assert_eq!(file.read(0, &mut buf).unwrap(), 13);
        assert_eq!(&buf, b"renamed later");
    }

    #[test]
    fn reads_clamp_at_end_of_file() {
        let store = Arc::new(MemoryStore::new());
        let file = open_file(&store, &options(64, 8, 0));
        file.write(0, &[1u8; 10]).unwrap();

        let mut buf = [0u8; 64];
        assert_eq!(file.read(5, &mut buf).unwrap(), 5);
        assert_eq!(file.read(10, &mut buf).unwrap(), 0);
        assert_eq!(file.read(1000, &mut buf).unwrap(), 0);
    }
}
