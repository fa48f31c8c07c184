//! Persisted volume configuration.
//!
//! One TOML document at a well-known name in the ciphertext root
//! describes everything needed to open a volume: which algorithms to
//! construct, the block layout, and the wrapped volume key. The
//! document is written once at volume creation and treated as ground
//! truth afterwards.

use crate::error::{CoreError, CoreResult};
use cloakfs_cipher::Descriptor;

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Well-known name of the configuration document in the ciphertext
/// root.
pub const CONFIG_FILE_NAME: &str = ".cloakfs.toml";

/// Base-64 (standard alphabet) representation for binary blobs in the
/// TOML document.
mod b64_blob {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD
            .decode(text.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

/// The persisted per-volume configuration.
///
/// Immutable after creation. All sizes are in the units their names
/// say; `block_mac_bytes == 0` disables the per-block MAC entirely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeConfig {
    /// Cipher key length in bits.
    pub key_size_bits: u32,
    /// Plaintext bytes per content block.
    pub block_size_bytes: u32,
    /// Stored MAC bytes per block (0..=8; 0 disables block MACs).
    pub block_mac_bytes: u32,
    /// Random bytes mixed into each block's MAC header, forcing
    /// distinct ciphertext for equal plaintext.
    pub block_mac_rand_bytes: u32,
    /// Whether each file stores its own random 64-bit IV in a header
    /// block.
    pub unique_iv: bool,
    /// Whether filename IVs chain from the parent directory.
    pub chained_name_iv: bool,
    /// Whether a file's header IV additionally depends on its full
    /// path.
    pub external_iv_chaining: bool,
    /// The volume key, wrapped under the password-derived key.
    #[serde(with = "b64_blob")]
    pub encrypted_key: Vec<u8>,
    /// KDF salt.
    #[serde(with = "b64_blob")]
    pub salt: Vec<u8>,
    /// PBKDF iteration count used for the password-derived key.
    pub kdf_iterations: u32,
    /// Descriptor of the content cipher.
    pub cipher: Descriptor,
    /// Descriptor of the filename codec.
    pub name_codec: Descriptor,
}

impl VolumeConfig {
    /// Checks structural validity, independent of any constructed
    /// cipher.
    ///
    /// Cipher-dependent constraints (block size alignment, encoded key
    /// size) are re-checked at volume open once the cipher exists.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::BadConfig`] describing the first violated
    /// constraint.
    pub fn validate(&self) -> CoreResult<()> {
        if self.block_size_bytes == 0 {
            return Err(CoreError::bad_config("block size must be non-zero"));
        }
        if self.block_mac_bytes > 8 {
            return Err(CoreError::bad_config(format!(
                "block MAC is {} bytes, at most 8 are supported",
                self.block_mac_bytes
            )));
        }
        if self.block_mac_bytes == 0 && self.block_mac_rand_bytes != 0 {
            return Err(CoreError::bad_config(
                "random MAC header bytes require a non-zero block MAC",
            ));
        }
        if u64::from(self.block_mac_bytes) + u64::from(self.block_mac_rand_bytes)
            >= u64::from(self.block_size_bytes)
        {
            return Err(CoreError::bad_config(
                "MAC header does not fit inside the block size",
            ));
        }
        if self.external_iv_chaining && !self.chained_name_iv {
            return Err(CoreError::bad_config(
                "external IV chaining requires chained name IVs",
            ));
        }
        if self.external_iv_chaining && !self.unique_iv {
            return Err(CoreError::bad_config(
                "external IV chaining requires per-file header IVs",
            ));
        }
        if self.kdf_iterations == 0 {
            return Err(CoreError::bad_config(
                "a created volume must persist its KDF iteration count",
            ));
        }
        Ok(())
    }

    /// Serializes to a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::BadConfig`] if serialization fails.
    pub fn to_toml(&self) -> CoreResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| CoreError::bad_config(format!("config serialization failed: {e}")))
    }

    /// Parses a TOML document and validates it.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::BadConfig`] on parse or validation failure.
    pub fn from_toml(text: &str) -> CoreResult<Self> {
        let config: Self = toml::from_str(text)
            .map_err(|e| CoreError::bad_config(format!("config parse failed: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Writes the document to `root/.cloakfs.toml`.
    ///
    /// # Errors
    ///
    /// Returns an error on serialization or I/O failure.
    pub fn save(&self, root: &Path) -> CoreResult<()> {
        let text = self.to_toml()?;
        std::fs::write(root.join(CONFIG_FILE_NAME), text)
            .map_err(|e| CoreError::Storage(e.into()))?;
        Ok(())
    }

    /// Loads and validates the document from `root/.cloakfs.toml`.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O, parse or validation failure.
    pub fn load(root: &Path) -> CoreResult<Self> {
        let text = std::fs::read_to_string(root.join(CONFIG_FILE_NAME))
            .map_err(|e| CoreError::Storage(e.into()))?;
        Self::from_toml(&text)
    }
}
