//! Variable-length unsigned integers
//!
//! Base-128, most significant group first. Every byte except the last has the
//! continuation bit (`0x80`) set. Zero is the single byte `00`; values with bit 63 set
//! take ten bytes and start with `0x81`.

use crate::error::AuthorityError;

pub const MAX_VARINT_LEN: usize = 10;

pub fn encode_varint(buf: &mut Vec<u8>, value: u64) {
    if value == 0 {
        buf.push(0);
        return;
    }

    let mut groups = [0u8; MAX_VARINT_LEN];
    let mut count = 0;
    let mut rest = value;
    while rest > 0 {
        groups[count] = (rest & 0x7f) as u8;
        rest >>= 7;
        count += 1;
    }

    for (i, group) in groups[..count].iter().enumerate().rev() {
        if i == 0 {
            buf.push(*group);
        } else {
            buf.push(group | 0x80);
        }
    }
}

pub fn varint_len(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    bits.div_ceil(7).max(1)
}

/// Returns the value and the number of bytes it occupied.
pub fn decode_varint(data: &[u8]) -> Result<(u64, usize), AuthorityError> {
    let mut value: u64 = 0;
    for (i, byte) in data.iter().enumerate() {
        if i >= MAX_VARINT_LEN || value >> 57 != 0 {
            return Err(AuthorityError::Malformed {
                context: "varint",
                reason: "value exceeds 64 bits".to_string(),
            });
        }
        value = (value << 7) | u64::from(byte & 0x7f);
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }

    Err(AuthorityError::Truncation {
        context: "varint",
        needed: data.len() + 1,
        available: data.len(),
    })
}
