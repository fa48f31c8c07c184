//! Volume lifecycle: creation, opening, and handing out file and name
//! operations bound to the volume key.

use crate::config::VolumeConfig;
use crate::error::{CoreError, CoreResult};
use crate::file::{EncryptedFile, FileOptions};
use crate::names::{decode_path, encode_path, name_registry, NameCodec, NameCodecRegistry};
use cloakfs_cipher::{registry, Cipher, CipherKey, Registry};
use cloakfs_storage::BackingStore;

use std::sync::Arc;
use tracing::debug;

/// Salt length drawn for new volumes.
const SALT_BYTES: usize = 20;

/// Parameters for creating a volume.
#[derive(Debug, Clone)]
pub struct VolumeParams {
    /// Cipher family to use.
    pub cipher_family: String,
    /// Name-codec family to use.
    pub name_codec_family: String,
    /// Cipher key length in bits (0 selects the family default).
    pub key_size_bits: u32,
    /// Plaintext bytes per content block.
    pub block_size_bytes: u32,
    /// Stored MAC bytes per block (0 disables block MACs).
    pub block_mac_bytes: u32,
    /// Random bytes mixed into each block's MAC header.
    pub block_mac_rand_bytes: u32,
    /// Whether each file stores its own header IV.
    pub unique_iv: bool,
    /// Whether filename IVs chain from the parent directory.
    pub chained_name_iv: bool,
    /// Whether file header IVs additionally depend on the full path.
    pub external_iv_chaining: bool,
    /// PBKDF iteration count; 0 asks the cipher to calibrate.
    pub kdf_iterations: u32,
    /// Calibration target in milliseconds, used when `kdf_iterations`
    /// is 0.
    pub kdf_target_ms: u64,
}

impl Default for VolumeParams {
    fn default() -> Self {
        Self {
            cipher_family: "aes".to_string(),
            name_codec_family: "nameio/block".to_string(),
            key_size_bits: 256,
            block_size_bytes: 1024,
            block_mac_bytes: 8,
            block_mac_rand_bytes: 0,
            unique_iv: true,
            chained_name_iv: true,
            external_iv_chaining: false,
            kdf_iterations: 0,
            kdf_target_ms: 500,
        }
    }
}

/// An opened volume: the configuration plus the constructed cipher,
/// unwrapped volume key and name codec.
///
/// The cipher instance and key are shared across every file handle the
/// volume hands out; key material is zeroized when the last handle
/// drops.
pub struct Volume {
    config: VolumeConfig,
    cipher: Arc<dyn Cipher>,
    key: CipherKey,
    name_codec: Arc<dyn NameCodec>,
}

impl Volume {
    /// Creates a new volume using the process-wide registries.
    ///
    /// # Errors
    ///
    /// See [`create_with`](Self::create_with).
    pub fn create(params: &VolumeParams, password: &[u8]) -> CoreResult<Self> {
        Self::create_with(registry(), name_registry(), params, password)
    }

    /// Creates a new volume: constructs the cipher, draws a random
    /// volume key, wraps it under a password-derived key, and builds
    /// the resulting configuration document.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Unsupported`] for unknown families,
    /// [`CoreError::BadConfig`] for impossible layouts, and surfaces
    /// entropy or KDF failures.
    pub fn create_with(
        ciphers: &Registry,
        names: &NameCodecRegistry,
        params: &VolumeParams,
        password: &[u8],
    ) -> CoreResult<Self> {
        let cipher = ciphers
            .new_cipher_by_name(&params.cipher_family, params.key_size_bits)
            .ok_or_else(|| {
                CoreError::unsupported(format!(
                    "no cipher {} with {} bit keys",
                    params.cipher_family, params.key_size_bits
                ))
            })?;

        let name_descriptor = names
            .list_codecs()
            .into_iter()
            .find(|info| info.name == params.name_codec_family)
            .ok_or_else(|| {
                CoreError::unsupported(format!("no name codec {}", params.name_codec_family))
            })?
            .descriptor;

        let mut salt = vec![0u8; SALT_BYTES];
        cipher.randomize(&mut salt, true)?;

        let (wrapping_key, iterations) = cipher.new_key_from_password(
            password,
            params.kdf_iterations,
            params.kdf_target_ms,
            &salt,
        )?;
        let volume_key = cipher.new_random_key()?;
        let encrypted_key = cipher.write_key(&volume_key, &wrapping_key)?;

        let config = VolumeConfig {
            key_size_bits: params.key_size_bits,
            block_size_bytes: params.block_size_bytes,
            block_mac_bytes: params.block_mac_bytes,
            block_mac_rand_bytes: params.block_mac_rand_bytes,
            unique_iv: params.unique_iv,
            chained_name_iv: params.chained_name_iv,
            external_iv_chaining: params.external_iv_chaining,
            encrypted_key,
            salt,
            kdf_iterations: iterations,
            cipher: cipher.descriptor(),
            name_codec: name_descriptor.clone(),
        };
        config.validate()?;
        if config.block_size_bytes as usize % cipher.cipher_block_size() != 0 {
            return Err(CoreError::bad_config(
                "block size is not a multiple of the cipher block size",
            ));
        }

        let name_codec = names.new_codec(
            &name_descriptor,
            cipher.clone(),
            volume_key.clone(),
            config.chained_name_iv,
        )?;

        debug!(cipher = %config.cipher, name_codec = %config.name_codec, "created volume");
        Ok(Self {
            config,
            cipher,
            key: volume_key,
            name_codec,
        })
    }

    /// Opens an existing volume using the process-wide registries.
    ///
    /// # Errors
    ///
    /// See [`open_with`](Self::open_with).
    pub fn open(config: VolumeConfig, password: &[u8]) -> CoreResult<Self> {
        Self::open_with(registry(), name_registry(), config, password)
    }

    /// Opens an existing volume from its configuration: descriptor
    /// lookup gated by the compatibility rule, password-derived key,
    /// volume key unwrap with integrity check, name codec construction.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Unsupported`] when no compatible
    /// implementation exists, [`CipherError::BadKey`]
    /// (via [`CoreError::Cipher`]) for a wrong password, and
    /// [`CoreError::BadConfig`] for layouts the constructed cipher
    /// cannot satisfy.
    ///
    /// [`CipherError::BadKey`]: cloakfs_cipher::CipherError::BadKey
    pub fn open_with(
        ciphers: &Registry,
        names: &NameCodecRegistry,
        config: VolumeConfig,
        password: &[u8],
    ) -> CoreResult<Self> {
        config.validate()?;

        let cipher = ciphers
            .new_cipher(&config.cipher, config.key_size_bits)
            .ok_or_else(|| {
                CoreError::unsupported(format!("no compatible cipher for {}", config.cipher))
            })?;

        if config.block_size_bytes as usize % cipher.cipher_block_size() != 0 {
            return Err(CoreError::bad_config(
                "block size is not a multiple of the cipher block size",
            ));
        }
        if config.encrypted_key.len() != cipher.encoded_key_size() {
            return Err(CoreError::bad_config(format!(
                "wrapped key is {} bytes, cipher expects {}",
                config.encrypted_key.len(),
                cipher.encoded_key_size()
            )));
        }

        let (wrapping_key, _) =
            cipher.new_key_from_password(password, config.kdf_iterations, 0, &config.salt)?;
        let volume_key = cipher.read_key(&config.encrypted_key, &wrapping_key, true)?;

        let name_codec = names.new_codec(
            &config.name_codec,
            cipher.clone(),
            volume_key.clone(),
            config.chained_name_iv,
        )?;

        debug!(cipher = %config.cipher, name_codec = %config.name_codec, "opened volume");
        Ok(Self {
            config,
            cipher,
            key: volume_key,
            name_codec,
        })
    }

    /// The volume's configuration document.
    #[must_use]
    pub fn config(&self) -> &VolumeConfig {
        &self.config
    }

    /// The shared cipher instance.
    #[must_use]
    pub fn cipher(&self) -> &Arc<dyn Cipher> {
        &self.cipher
    }

    /// The volume's name codec.
    #[must_use]
    pub fn name_codec(&self) -> &Arc<dyn NameCodec> {
        &self.name_codec
    }

    /// Opens a plaintext view over one ciphertext backing store.
    ///
    /// # Errors
    ///
    /// See [`EncryptedFile::open`].
    pub fn open_file(&self, store: Arc<dyn BackingStore>) -> CoreResult<EncryptedFile> {
        self.open_file_with_external_iv(store, 0)
    }

    /// Opens a file whose header IV is additionally bound to an
    /// external chain IV (derived from the file's path when external IV
    /// chaining is enabled).
    ///
    /// # Errors
    ///
    /// See [`EncryptedFile::open`].
    pub fn open_file_with_external_iv(
        &self,
        store: Arc<dyn BackingStore>,
        external_iv: u64,
    ) -> CoreResult<EncryptedFile> {
        let mut options = FileOptions::from_config(&self.config);
        options.external_iv = if self.config.external_iv_chaining {
            external_iv
        } else {
            0
        };
        EncryptedFile::open(store, self.cipher.clone(), self.key.clone(), &options)
    }

    /// Encodes a full plaintext path, component by component, returning
    /// the ciphertext path and the final chain IV.
    ///
    /// # Errors
    ///
    /// Propagates name codec failures.
    pub fn encode_path(&self, path: &str) -> CoreResult<(String, u64)> {
        let mut iv = 0u64;
        let encoded = encode_path(self.name_codec.as_ref(), path, &mut iv)?;
        Ok((encoded, iv))
    }

    /// Decodes a full ciphertext path, component by component, returning
    /// the plaintext path and the final chain IV.
    ///
    /// # Errors
    ///
    /// Propagates name codec failures.
    pub fn decode_path(&self, path: &str) -> CoreResult<(String, u64)> {
        let mut iv = 0u64;
        let decoded = decode_path(self.name_codec.as_ref(), path, &mut iv)?;
        Ok((decoded, iv))
    }
}
