//! Bit-exact conversion between power-of-two bases.
//!
//! Each byte of a buffer carries a single symbol in its low
//! `bits`-per-symbol bits. Conversion repacks the bit stream low-to-high
//! through a rolling accumulator, so for compatible widths the operation
//! is exactly reversible.

use crate::error::{CodecError, CodecResult};

fn check_width(bits: u32) -> CodecResult<()> {
    if (1..=8).contains(&bits) {
        Ok(())
    } else {
        Err(CodecError::InvalidSymbolWidth { bits })
    }
}

/// Number of output symbols produced when converting `len` symbols of
/// `src_bits` each into symbols of `dst_bits` each.
///
/// With `emit_partial` set, a trailing partial symbol is counted.
#[must_use]
pub fn converted_len(len: usize, src_bits: u32, dst_bits: u32, emit_partial: bool) -> usize {
    let total_bits = len * src_bits as usize;
    let whole = total_bits / dst_bits as usize;
    if emit_partial && total_bits % dst_bits as usize != 0 {
        whole + 1
    } else {
        whole
    }
}

fn convert(src: &[u8], src_bits: u32, dst_bits: u32, emit_partial: bool) -> Vec<u8> {
    let mask = (1u32 << dst_bits) - 1;
    let mut out = Vec::with_capacity(converted_len(src.len(), src_bits, dst_bits, emit_partial));

    // New bits land on the high end of the accumulator; symbols fall off
    // the low end.
    let mut work: u32 = 0;
    let mut work_bits: u32 = 0;
    for &byte in src {
        work |= u32::from(byte) << work_bits;
        work_bits += src_bits;

        while work_bits >= dst_bits {
            out.push((work & mask) as u8);
            work >>= dst_bits;
            work_bits -= dst_bits;
        }
    }

    if emit_partial && work_bits > 0 {
        out.push((work & mask) as u8);
    }

    out
}

/// Re-packs `src` from `src_bits`-wide symbols into `dst_bits`-wide
/// symbols, emitting a trailing partial symbol when the bit counts do
/// not divide evenly.
///
/// # Errors
///
/// Returns [`CodecError::InvalidSymbolWidth`] if either width is outside
/// `1..=8`.
pub fn change_base_2(src: &[u8], src_bits: u32, dst_bits: u32) -> CodecResult<Vec<u8>> {
    check_width(src_bits)?;
    check_width(dst_bits)?;
    Ok(convert(src, src_bits, dst_bits, true))
}

/// In-place variant of [`change_base_2`]: the converted symbols replace
/// the buffer contents.
///
/// The output size is computed before any data is overwritten. The
/// `emit_partial` policy controls whether a trailing partial symbol is
/// kept; callers must use the same setting on the encode and decode
/// sides of a round trip.
///
/// # Errors
///
/// Returns [`CodecError::InvalidSymbolWidth`] if either width is outside
/// `1..=8`.
pub fn change_base_2_inline(
    buf: &mut Vec<u8>,
    src_bits: u32,
    dst_bits: u32,
    emit_partial: bool,
) -> CodecResult<()> {
    check_width(src_bits)?;
    check_width(dst_bits)?;
    *buf = convert(buf, src_bits, dst_bits, emit_partial);
    Ok(())
}

/// Bytes needed to hold `len` raw bytes re-packed as 6-bit symbols.
#[must_use]
pub const fn b256_to_b64_len(len: usize) -> usize {
    (len * 8 + 5) / 6
}

/// Bytes needed to hold `len` raw bytes re-packed as 5-bit symbols.
#[must_use]
pub const fn b256_to_b32_len(len: usize) -> usize {
    (len * 8 + 4) / 5
}

/// Raw bytes recoverable from `len` 6-bit symbols.
#[must_use]
pub const fn b64_to_b256_len(len: usize) -> usize {
    (len * 6) / 8
}

/// Raw bytes recoverable from `len` 5-bit symbols.
#[must_use]
pub const fn b32_to_b256_len(len: usize) -> usize {
    (len * 5) / 8
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn widths_are_validated() {
        assert_eq!(
            change_base_2(b"x", 0, 6),
            Err(CodecError::InvalidSymbolWidth { bits: 0 })
        );
        assert_eq!(
            change_base_2(b"x", 8, 9),
            Err(CodecError::InvalidSymbolWidth { bits: 9 })
        );
    }

    #[test]
    fn eight_to_six_known_value() {
        // 0xFF 0x00 -> low-to-high bit order: 111111 11|0000 000000...
        let out = change_base_2(&[0xff, 0x00], 8, 6).unwrap();
        assert_eq!(out, vec![0x3f, 0x03, 0x00]);
    }

    #[test]
    fn empty_input() {
        assert!(change_base_2(&[], 8, 6).unwrap().is_empty());
    }

    #[test]
    fn inline_matches_allocating() {
        let data = b"the quick brown fox".to_vec();
        let expected = change_base_2(&data, 8, 5).unwrap();
        let mut buf = data;
        change_base_2_inline(&mut buf, 8, 5, true).unwrap();
        assert_eq!(buf, expected);
    }

    #[test]
    fn partial_policy_changes_length() {
        let data = vec![0xaa; 3]; // 24 bits -> 4 whole + 1 partial 5-bit symbol
        let mut with = data.clone();
        let mut without = data;
        change_base_2_inline(&mut with, 8, 5, true).unwrap();
        change_base_2_inline(&mut without, 8, 5, false).unwrap();
        assert_eq!(with.len(), 5);
        assert_eq!(without.len(), 4);
    }

    #[test]
    fn len_helpers_match_conversion() {
        for n in 0..64 {
            let data = vec![0u8; n];
            assert_eq!(change_base_2(&data, 8, 6).unwrap().len(), b256_to_b64_len(n));
            assert_eq!(change_base_2(&data, 8, 5).unwrap().len(), b256_to_b32_len(n));
        }
    }

    proptest! {
        #[test]
        fn roundtrip_restores_input(
            src_bits in 1u32..=8,
            dst_bits in 1u32..=8,
            data in proptest::collection::vec(any::<u8>(), 0..256),
        ) {
            // Symbols must fit their declared width.
            let mask = ((1u32 << src_bits) - 1) as u8;
            let data: Vec<u8> = data.into_iter().map(|b| b & mask).collect();

            let mid = change_base_2(&data, src_bits, dst_bits).unwrap();
            let back = change_base_2(&mid, dst_bits, src_bits).unwrap();

            prop_assert!(back.len() >= data.len());
            prop_assert_eq!(&back[..data.len()], &data[..]);
            // Anything past the original length is residue of the partial
            // symbol and must be zero.
            prop_assert!(back[data.len()..].iter().all(|&b| b == 0));
        }
    }
}
