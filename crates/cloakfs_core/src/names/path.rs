//! Component-wise path encoding.
//!
//! Paths are encoded root to leaf so the IV accumulator, when chaining
//! is enabled, evolves the same way on the encode and decode walks.
//! Empty components (leading or doubled separators) and the `.`/`..`
//! entries pass through unchanged.

use crate::error::{CoreError, CoreResult};
use crate::names::NameCodec;

fn passthrough(component: &str) -> bool {
    component.is_empty() || component == "." || component == ".."
}

/// Encodes every component of `path`, carrying `iv` across components.
///
/// # Errors
///
/// Propagates codec failures; fails on non-UTF-8 encoder output (the
/// built-in codecs always emit ASCII).
pub fn encode_path(codec: &dyn NameCodec, path: &str, iv: &mut u64) -> CoreResult<String> {
    let mut parts = Vec::new();
    for component in path.split('/') {
        if passthrough(component) {
            parts.push(component.to_string());
            continue;
        }
        let encoded = codec.encode_name(component.as_bytes(), Some(iv))?;
        parts.push(
            String::from_utf8(encoded)
                .map_err(|_| CoreError::invalid("encoded name is not valid UTF-8"))?,
        );
    }
    Ok(parts.join("/"))
}

/// Decodes every component of `path`, carrying `iv` across components.
///
/// # Errors
///
/// Propagates codec failures; fails on non-UTF-8 plaintext.
pub fn decode_path(codec: &dyn NameCodec, path: &str, iv: &mut u64) -> CoreResult<String> {
    let mut parts = Vec::new();
    for component in path.split('/') {
        if passthrough(component) {
            parts.push(component.to_string());
            continue;
        }
        let decoded = codec.decode_name(component.as_bytes(), Some(iv))?;
        parts.push(
            String::from_utf8(decoded)
                .map_err(|_| CoreError::invalid("decoded name is not valid UTF-8"))?,
        );
    }
    Ok(parts.join("/"))
}
