//! # Fixed-Width Primitive Codec
//!
//! Every fixed-width value on the wire is little-endian with a static size.
//! Readers take a byte slice and an absolute position and bounds-check before
//! touching memory, so a hostile length never turns into a panic.
//!
//! | Type | Size | Notes |
//! |------|------|-------|
//! | bool | 1 | any non-zero byte reads as `true`, writes `0`/`1` |
//! | i8/u8 | 1 | |
//! | i16/u16 | 2 | LE |
//! | i32/u32 | 4 | LE; offset slots are i32 |
//! | i64 | 8 | LE |
//! | f32/f64 | 4/8 | LE IEEE-754 bit pattern |
//! | uuid | 16 | most-significant half first, each half big-endian |
//! | fixed ascii | N | zero padded, read up to the first NUL |
//!
//! The UUID is the one big-endian value in the format: it travels as two
//! 64-bit halves in network order, which is also the natural `u128` order.

use eyre::{bail, ensure, Result};

use crate::config::UUID_SIZE;
use crate::error::ProtocolError;

/// Fails with `BufferTooSmall` unless `len` bytes are readable at `pos`.
/// Arithmetic is 64-bit so a huge `len` cannot wrap.
pub fn check_span(buf: &[u8], pos: usize, len: u64) -> Result<()> {
    let needed = (pos as u64).saturating_add(len);
    ensure!(
        needed <= buf.len() as u64,
        ProtocolError::BufferTooSmall {
            needed,
            available: buf.len(),
        }
    );
    Ok(())
}

fn take<const N: usize>(buf: &[u8], pos: usize) -> Result<[u8; N]> {
    check_span(buf, pos, N as u64)?;
    let mut bytes = [0u8; N];
    bytes.copy_from_slice(&buf[pos..pos + N]);
    Ok(bytes)
}

pub fn read_bool(buf: &[u8], pos: usize) -> Result<bool> {
    Ok(take::<1>(buf, pos)?[0] != 0)
}

pub fn read_u8(buf: &[u8], pos: usize) -> Result<u8> {
    Ok(take::<1>(buf, pos)?[0])
}

pub fn read_i8(buf: &[u8], pos: usize) -> Result<i8> {
    Ok(i8::from_le_bytes(take(buf, pos)?))
}

pub fn read_i16(buf: &[u8], pos: usize) -> Result<i16> {
    Ok(i16::from_le_bytes(take(buf, pos)?))
}

pub fn read_u16(buf: &[u8], pos: usize) -> Result<u16> {
    Ok(u16::from_le_bytes(take(buf, pos)?))
}

pub fn read_i32(buf: &[u8], pos: usize) -> Result<i32> {
    Ok(i32::from_le_bytes(take(buf, pos)?))
}

pub fn read_u32(buf: &[u8], pos: usize) -> Result<u32> {
    Ok(u32::from_le_bytes(take(buf, pos)?))
}

pub fn read_i64(buf: &[u8], pos: usize) -> Result<i64> {
    Ok(i64::from_le_bytes(take(buf, pos)?))
}

pub fn read_f32(buf: &[u8], pos: usize) -> Result<f32> {
    Ok(f32::from_le_bytes(take(buf, pos)?))
}

pub fn read_f64(buf: &[u8], pos: usize) -> Result<f64> {
    Ok(f64::from_le_bytes(take(buf, pos)?))
}

pub fn read_uuid(buf: &[u8], pos: usize) -> Result<u128> {
    Ok(u128::from_be_bytes(take::<UUID_SIZE>(buf, pos)?))
}

pub fn write_bool(out: &mut Vec<u8>, value: bool) {
    out.push(u8::from(value));
}

pub fn write_i32(out: &mut Vec<u8>, value: i32) {
    out.extend_from_slice(&value.to_le_bytes());
}

pub fn write_uuid(out: &mut Vec<u8>, value: u128) {
    out.extend_from_slice(&value.to_be_bytes());
}

/// Overwrites four bytes at `pos` with an offset-table value.
pub fn patch_i32(out: &mut [u8], pos: usize, value: i32) -> Result<()> {
    let Some(slot) = out.get_mut(pos..pos.saturating_add(4)) else {
        bail!(ProtocolError::BufferTooSmall {
            needed: (pos as u64).saturating_add(4),
            available: out.len(),
        });
    };
    slot.copy_from_slice(&value.to_le_bytes());
    Ok(())
}

/// Builds a UUID from its two 64-bit halves.
pub fn uuid_from_halves(most: u64, least: u64) -> u128 {
    (u128::from(most) << 64) | u128::from(least)
}

pub fn write_fixed_ascii(out: &mut Vec<u8>, value: &str, len: usize) -> Result<()> {
    ensure!(
        value.bytes().all(|b| b.is_ascii() && b != 0),
        ProtocolError::InvalidAscii
    );
    ensure!(
        value.len() <= len,
        ProtocolError::StringTooLong {
            len: value.len(),
            max: len,
        }
    );
    out.extend_from_slice(value.as_bytes());
    out.resize(out.len() + (len - value.len()), 0);
    Ok(())
}

/// Returns the meaningful prefix of a fixed ASCII field: the bytes before the
/// first NUL, checked to be ASCII.
pub fn fixed_ascii_bytes(buf: &[u8], pos: usize, len: usize) -> Result<&[u8]> {
    check_span(buf, pos, len as u64)?;
    let field = &buf[pos..pos + len];
    let end = field.iter().position(|&b| b == 0).unwrap_or(len);
    let text = &field[..end];
    ensure!(text.is_ascii(), ProtocolError::InvalidAscii);
    Ok(text)
}

pub fn read_fixed_ascii(buf: &[u8], pos: usize, len: usize) -> Result<String> {
    let text = fixed_ascii_bytes(buf, pos, len)?;
    Ok(text.iter().map(|&b| char::from(b)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::kind_of;

    #[test]
    fn little_endian_reads() {
        let buf = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];
        assert_eq!(read_u16(&buf, 0).unwrap(), 0x0201);
        assert_eq!(read_i32(&buf, 0).unwrap(), 0x0403_0201);
        assert_eq!(read_u32(&buf, 4).unwrap(), 0x0807_0605);
        assert_eq!(read_i64(&buf, 0).unwrap(), 0x0807_0605_0403_0201);
    }

    #[test]
    fn bool_reads_any_nonzero_as_true() {
        assert!(!read_bool(&[0], 0).unwrap());
        assert!(read_bool(&[1], 0).unwrap());
        assert!(read_bool(&[0x7F], 0).unwrap());
    }

    #[test]
    fn float_bit_patterns_survive() {
        let mut out = Vec::new();
        out.extend_from_slice(&f32::NAN.to_le_bytes());
        out.extend_from_slice(&(-0.0f64).to_le_bytes());
        assert!(read_f32(&out, 0).unwrap().is_nan());
        assert_eq!(read_f64(&out, 4).unwrap().to_bits(), (-0.0f64).to_bits());
    }

    #[test]
    fn uuid_is_most_significant_half_first_big_endian() {
        let uuid = uuid_from_halves(0x0011_2233_4455_6677, 0x8899_AABB_CCDD_EEFF);
        let mut out = Vec::new();
        write_uuid(&mut out, uuid);

        assert_eq!(
            out,
            [
                0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xAA, 0xBB, 0xCC,
                0xDD, 0xEE, 0xFF
            ]
        );
        assert_eq!(read_uuid(&out, 0).unwrap(), uuid);
    }

    #[test]
    fn short_buffer_is_buffer_too_small() {
        let err = read_i32(&[1, 2, 3], 0).unwrap_err();
        assert_eq!(
            kind_of(&err),
            Some(&ProtocolError::BufferTooSmall {
                needed: 4,
                available: 3
            })
        );
    }

    #[test]
    fn check_span_does_not_wrap() {
        assert!(check_span(&[0; 8], usize::MAX, u64::MAX).is_err());
        assert!(check_span(&[0; 8], 8, 0).is_ok());
    }

    #[test]
    fn patch_i32_overwrites_slot() {
        let mut out = vec![0u8; 8];
        patch_i32(&mut out, 4, -1).unwrap();
        assert_eq!(out, [0, 0, 0, 0, 0xFF, 0xFF, 0xFF, 0xFF]);
        assert!(patch_i32(&mut out, 6, 1).is_err());
    }

    #[test]
    fn fixed_ascii_pads_and_truncates_at_nul() {
        let mut out = Vec::new();
        write_fixed_ascii(&mut out, "abc", 6).unwrap();
        assert_eq!(out, b"abc\0\0\0");
        assert_eq!(read_fixed_ascii(&out, 0, 6).unwrap(), "abc");
    }

    #[test]
    fn fixed_ascii_exact_length_has_no_terminator() {
        let mut out = Vec::new();
        write_fixed_ascii(&mut out, "abcd", 4).unwrap();
        assert_eq!(read_fixed_ascii(&out, 0, 4).unwrap(), "abcd");
    }

    #[test]
    fn fixed_ascii_rejects_overlong_and_non_ascii() {
        let mut out = Vec::new();
        let err = write_fixed_ascii(&mut out, "abcde", 4).unwrap_err();
        assert!(matches!(
            kind_of(&err),
            Some(ProtocolError::StringTooLong { len: 5, max: 4 })
        ));

        let err = write_fixed_ascii(&mut out, "é", 4).unwrap_err();
        assert_eq!(kind_of(&err), Some(&ProtocolError::InvalidAscii));

        let err = read_fixed_ascii(&[0xC3, 0xA9, 0, 0], 0, 4).unwrap_err();
        assert_eq!(kind_of(&err), Some(&ProtocolError::InvalidAscii));
    }
}
