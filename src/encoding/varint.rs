//! # Variable-Length Integer Encoding
//!
//! Counts, byte lengths and variant tags on the wire are 32-bit unsigned
//! integers in little-endian base-128 form: seven value bits per byte, low
//! group first, high bit set when another byte follows.
//!
//! ## Encoding Format
//!
//! | Value Range                 | Bytes |
//! |-----------------------------|-------|
//! | 0 - 127                     | 1     |
//! | 128 - 16,383                | 2     |
//! | 16,384 - 2,097,151          | 3     |
//! | 2,097,152 - 268,435,455     | 4     |
//! | 268,435,456 - 4,294,967,295 | 5     |
//!
//! ```text
//! 300 = 0b1_0010_1100
//!        low 7 bits  0101100 | continuation -> 0xAC
//!        next bits   0000010               -> 0x02
//! wire: [0xAC, 0x02]
//! ```
//!
//! ## Strictness
//!
//! Decoding rejects with `MalformedVarInt`:
//! - a sequence that runs off the end of the buffer
//! - a sixth byte (continuation bit set on the fifth)
//! - value bits beyond bit 31 in the fifth byte
//! - a non-minimal encoding whose final group is zero
//!
//! Rejecting non-minimal forms keeps `length(buf, pos) == size(peek(buf, pos))`
//! true for every sequence that decodes at all.
//!
//! ## Usage Example
//!
//! ```rust
//! use proxywire::encoding::varint;
//!
//! let mut out = Vec::new();
//! varint::write(&mut out, 300);
//! assert_eq!(out, [0xAC, 0x02]);
//! assert_eq!(varint::size(300), 2);
//! assert_eq!(varint::peek(&out, 0).unwrap(), 300);
//! assert_eq!(varint::length(&out, 0).unwrap(), 2);
//! ```

use eyre::{bail, Result};

use crate::config::MAX_VARINT_LEN;
use crate::error::ProtocolError;

const CONTINUATION: u8 = 0x80;
const GROUP_MASK: u8 = 0x7F;

pub fn size(value: u32) -> usize {
    if value & 0xFFFF_FF80 == 0 {
        1
    } else if value & 0xFFFF_C000 == 0 {
        2
    } else if value & 0xFFE0_0000 == 0 {
        3
    } else if value & 0xF000_0000 == 0 {
        4
    } else {
        5
    }
}

pub fn write(out: &mut Vec<u8>, value: u32) {
    let mut v = value;
    while v >= u32::from(CONTINUATION) {
        out.push((v as u8 & GROUP_MASK) | CONTINUATION);
        v >>= 7;
    }
    out.push(v as u8);
}

/// Decodes the VarInt at `pos`, returning the value and its encoded length.
pub fn read(buf: &[u8], pos: usize) -> Result<(u32, usize)> {
    let mut value: u32 = 0;

    for i in 0..MAX_VARINT_LEN {
        let Some(&byte) = pos.checked_add(i).and_then(|at| buf.get(at)) else {
            bail!(ProtocolError::MalformedVarInt { pos });
        };
        let group = byte & GROUP_MASK;

        if i == MAX_VARINT_LEN - 1 && group > 0x0F {
            bail!(ProtocolError::MalformedVarInt { pos });
        }
        value |= u32::from(group) << (7 * i);

        if byte & CONTINUATION == 0 {
            if i > 0 && group == 0 {
                bail!(ProtocolError::MalformedVarInt { pos });
            }
            return Ok((value, i + 1));
        }
    }

    bail!(ProtocolError::MalformedVarInt { pos })
}

pub fn peek(buf: &[u8], pos: usize) -> Result<u32> {
    read(buf, pos).map(|(value, _)| value)
}

pub fn length(buf: &[u8], pos: usize) -> Result<usize> {
    read(buf, pos).map(|(_, len)| len)
}

/// Reads a length or count prefix. Peers treat these as signed 32-bit, so a
/// value with bit 31 set is a negative length, not a large one.
pub fn read_len(buf: &[u8], pos: usize) -> Result<(usize, usize)> {
    let (value, len) = read(buf, pos)?;
    if value > i32::MAX as u32 {
        bail!(ProtocolError::NegativeLength {
            len: i64::from(value as i32),
        });
    }
    Ok((value as usize, len))
}
