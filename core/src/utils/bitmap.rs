//! Bitmap bit math over byte strings
//!
//! Bitmaps are stored as plain byte strings in which bit offset `n` lives in
//! byte `n / 8` at position `7 - n % 8`, i.e. the most significant bit of
//! each byte comes first. Existing indexes rely on this layout.

/// Set the bit at `offset`, growing the byte string with zero bytes as needed
pub fn set_bit(bytes: &mut Vec<u8>, offset: u64) {
    let byte_index = (offset / 8) as usize;
    if bytes.len() <= byte_index {
        bytes.resize(byte_index + 1, 0);
    }
    bytes[byte_index] |= 0x80 >> (offset % 8);
}

/// Read the bit at `offset`; bits past the end are zero
pub fn get_bit(bytes: &[u8], offset: u64) -> bool {
    let byte_index = (offset / 8) as usize;
    match bytes.get(byte_index) {
        Some(byte) => byte & (0x80 >> (offset % 8)) != 0,
        None => false,
    }
}

/// Offsets of all set bits in ascending order, scanning MSB-first within each byte
pub fn set_bit_offsets(bytes: &[u8]) -> Vec<u64> {
    let mut offsets = Vec::new();
    for (byte_index, byte) in bytes.iter().enumerate() {
        if *byte == 0 {
            continue;
        }
        for bit in 0..8u64 {
            if byte & (0x80 >> bit) != 0 {
                offsets.push(byte_index as u64 * 8 + bit);
            }
        }
    }
    offsets
}

/// Bitwise OR of several byte strings; the result is as long as the longest input
pub fn bitop_or(inputs: &[&[u8]]) -> Vec<u8> {
    let len = inputs.iter().map(|b| b.len()).max().unwrap_or(0);
    let mut result = vec![0u8; len];
    for input in inputs {
        for (dst, src) in result.iter_mut().zip(input.iter()) {
            *dst |= src;
        }
    }
    result
}

/// Bitwise AND of several byte strings; shorter inputs are zero-padded
pub fn bitop_and(inputs: &[&[u8]]) -> Vec<u8> {
    let len = inputs.iter().map(|b| b.len()).max().unwrap_or(0);
    if inputs.is_empty() {
        return Vec::new();
    }
    (0..len)
        .map(|i| {
            inputs
                .iter()
                .fold(0xffu8, |acc, input| acc & input.get(i).copied().unwrap_or(0))
        })
        .collect()
}
