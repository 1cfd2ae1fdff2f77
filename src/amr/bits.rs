//! # Bit Field Utilities
//!
//! MSB-first bit-range access over byte slices, used for the packed
//! differential-consumption arrays and for undoing sub-byte capture offsets.
//!
//! Bit 0 is the most significant bit of `data[0]`:
//! ```text
//! data[0]         data[1]
//! 7 6 5 4 3 2 1 0 7 6 5 4 3 2 1 0
//! 0 1 2 3 4 5 6 7 8 9 ...            <- bit offsets
//! ```

use crate::error::{AmrError, Result};

/// Widest field [`read_bits`] and [`write_bits`] accept
pub const MAX_FIELD_BITS: u8 = 32;

fn check_range(data_len: usize, offset: usize, len: u8) -> Result<()> {
    let available = data_len * 8;
    if len == 0 || len > MAX_FIELD_BITS || offset + len as usize > available {
        return Err(AmrError::BitRange {
            offset,
            len,
            available,
        });
    }
    Ok(())
}

/// Read `len` bits (1-32) starting at bit `offset`, MSB first
///
/// # Errors
///
/// Returns [`AmrError::BitRange`] if `len` is 0 or above 32, or the range
/// runs past the end of `data`.
///
/// # Examples
///
/// ```
/// use amr_decoder::amr::bits::read_bits;
///
/// // 0b1010_1100, 0b0101_0000: 9 bits from offset 4 = 0b1100_0101_0
/// let value = read_bits(&[0xAC, 0x50], 4, 9).unwrap();
/// assert_eq!(value, 0b1_1000_1010);
/// ```
pub fn read_bits(data: &[u8], offset: usize, len: u8) -> Result<u32> {
    check_range(data.len(), offset, len)?;

    let end = offset + len as usize;
    let first = offset / 8;
    let last = (end - 1) / 8;

    // At most 5 bytes: 32 bits plus up to 7 bits of leading offset
    let mut acc: u64 = 0;
    for &byte in &data[first..=last] {
        acc = (acc << 8) | byte as u64;
    }

    let trailing = (last + 1) * 8 - end;
    let mask = (1u64 << len) - 1;

    Ok(((acc >> trailing) & mask) as u32)
}

/// Write the low `len` bits (1-32) of `value` at bit `offset`, MSB first
///
/// Bits outside the range are left untouched.
pub fn write_bits(data: &mut [u8], offset: usize, len: u8, value: u32) -> Result<()> {
    check_range(data.len(), offset, len)?;

    for i in 0..len as usize {
        let bit = (value >> (len as usize - 1 - i)) & 1;
        let pos = offset + i;
        let mask = 0x80u8 >> (pos % 8);
        if bit == 1 {
            data[pos / 8] |= mask;
        } else {
            data[pos / 8] &= !mask;
        }
    }

    Ok(())
}

/// Read `N` consecutive packed fields of `width` bits starting at bit `offset`
pub fn read_packed<const N: usize>(data: &[u8], offset: usize, width: u8) -> Result<[u16; N]> {
    let mut values = [0u16; N];

    for (i, value) in values.iter_mut().enumerate() {
        *value = read_bits(data, offset + i * width as usize, width)? as u16;
    }

    Ok(values)
}

/// Shift every byte left by `shift` bits (0-7), carrying in from the next byte
///
/// Restores byte alignment of a payload captured `shift` bits into its first
/// byte. The last byte is filled with zeros from the right.
pub fn realign(data: &mut [u8], shift: u8) {
    let shift = shift % 8;
    if shift == 0 || data.is_empty() {
        return;
    }

    let last = data.len() - 1;
    for i in 0..last {
        data[i] = (data[i] << shift) | (data[i + 1] >> (8 - shift));
    }
    data[last] <<= shift;
}
