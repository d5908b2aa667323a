//! # Length-Prefixed String Codec
//!
//! ```text
//! +------------------+------------------------+
//! | VarInt byte len  | UTF-8 or ASCII bytes   |
//! +------------------+------------------------+
//! ```
//!
//! Two charsets share the framing. UTF-8 strings go through [`write`] and
//! [`read`]; ASCII strings (names, language tags) go through [`write_ascii`]
//! and [`read_ascii`], which reject any byte above 0x7F with `InvalidAscii`
//! on both paths.
//!
//! The prefix counts bytes, not characters. Each string field declares a
//! maximum byte length (at most `MAX_COLLECTION_LEN`); the maximum is applied
//! on write and on read, so an oversized string is rejected rather than cut.
//!
//! `read` borrows the text out of the buffer. The validator and the decoder
//! both call it, which keeps their bounds rules identical; only the decoder
//! goes on to copy the `&str` into an owned `String`.

use eyre::{ensure, Result};

use crate::encoding::primitive::check_span;
use crate::encoding::varint;
use crate::error::ProtocolError;

pub fn encoded_size(value: &str) -> usize {
    varint::size(value.len() as u32) + value.len()
}

pub fn write(out: &mut Vec<u8>, value: &str, max_len: usize) -> Result<()> {
    write_bytes(out, value, max_len)
}

pub fn write_ascii(out: &mut Vec<u8>, value: &str, max_len: usize) -> Result<()> {
    ensure!(value.is_ascii(), ProtocolError::InvalidAscii);
    write_bytes(out, value, max_len)
}

fn write_bytes(out: &mut Vec<u8>, value: &str, max_len: usize) -> Result<()> {
    ensure!(
        value.len() <= max_len,
        ProtocolError::StringTooLong {
            len: value.len(),
            max: max_len,
        }
    );
    varint::write(out, value.len() as u32);
    out.extend_from_slice(value.as_bytes());
    Ok(())
}

/// Reads the string at `pos`, returning the text and the position just past it.
pub fn read(buf: &[u8], pos: usize, max_len: usize) -> Result<(&str, usize)> {
    let (bytes, end) = read_bytes(buf, pos, max_len)?;
    let text = std::str::from_utf8(bytes).map_err(|_| ProtocolError::InvalidUtf8)?;
    Ok((text, end))
}

pub fn read_ascii(buf: &[u8], pos: usize, max_len: usize) -> Result<(&str, usize)> {
    let (bytes, end) = read_bytes(buf, pos, max_len)?;
    ensure!(bytes.is_ascii(), ProtocolError::InvalidAscii);
    let text = std::str::from_utf8(bytes).map_err(|_| ProtocolError::InvalidUtf8)?;
    Ok((text, end))
}

fn read_bytes(buf: &[u8], pos: usize, max_len: usize) -> Result<(&[u8], usize)> {
    let (len, prefix) = varint::read_len(buf, pos)?;
    ensure!(
        len <= max_len,
        ProtocolError::StringTooLong { len, max: max_len }
    );
    let start = pos + prefix;
    check_span(buf, start, len as u64)?;
    Ok((&buf[start..start + len], start + len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::kind_of;

    #[test]
    fn write_then_read_multibyte_text() {
        let mut out = Vec::new();
        write(&mut out, "héllo", 16).unwrap();

        assert_eq!(out[0], 6);
        assert_eq!(read(&out, 0, 16).unwrap(), ("héllo", 7));
        assert_eq!(encoded_size("héllo"), out.len());
    }

    #[test]
    fn empty_string_is_single_zero_byte() {
        let mut out = Vec::new();
        write(&mut out, "", 0).unwrap();
        assert_eq!(out, [0]);
        assert_eq!(read(&out, 0, 0).unwrap(), ("", 1));
    }

    #[test]
    fn max_len_counts_bytes_not_chars() {
        let mut out = Vec::new();
        let err = write(&mut out, "ééé", 5).unwrap_err();
        assert_eq!(
            kind_of(&err),
            Some(&ProtocolError::StringTooLong { len: 6, max: 5 })
        );
        assert!(out.is_empty());
    }

    #[test]
    fn read_rejects_length_over_field_max() {
        let mut out = Vec::new();
        write(&mut out, "abcdef", 6).unwrap();
        let err = read(&out, 0, 5).unwrap_err();
        assert_eq!(
            kind_of(&err),
            Some(&ProtocolError::StringTooLong { len: 6, max: 5 })
        );
    }

    #[test]
    fn read_rejects_length_past_buffer_end() {
        let buf = [10, b'a', b'b'];
        let err = read(&buf, 0, 100).unwrap_err();
        assert!(matches!(
            kind_of(&err),
            Some(ProtocolError::BufferTooSmall { needed: 11, .. })
        ));
    }

    #[test]
    fn read_rejects_invalid_utf8() {
        let buf = [2, 0xC3, 0x28];
        let err = read(&buf, 0, 100).unwrap_err();
        assert_eq!(kind_of(&err), Some(&ProtocolError::InvalidUtf8));
    }

    #[test]
    fn ascii_round_trip_uses_one_byte_per_char() {
        let mut out = Vec::new();
        write_ascii(&mut out, "en_US", 128).unwrap();

        assert_eq!(out, [5, b'e', b'n', b'_', b'U', b'S']);
        assert_eq!(read_ascii(&out, 0, 128).unwrap(), ("en_US", 6));
    }

    #[test]
    fn ascii_write_rejects_non_ascii_text() {
        let mut out = Vec::new();
        let err = write_ascii(&mut out, "é", 16).unwrap_err();
        assert_eq!(kind_of(&err), Some(&ProtocolError::InvalidAscii));
        assert!(out.is_empty());
    }

    #[test]
    fn ascii_read_rejects_high_bytes_even_when_valid_utf8() {
        let mut out = Vec::new();
        write(&mut out, "é", 16).unwrap();

        assert_eq!(read(&out, 0, 16).unwrap().0, "é");
        let err = read_ascii(&out, 0, 16).unwrap_err();
        assert_eq!(kind_of(&err), Some(&ProtocolError::InvalidAscii));
    }

    #[test]
    fn read_rejects_negative_length() {
        let mut buf = Vec::new();
        varint::write(&mut buf, u32::MAX);
        let err = read(&buf, 0, 100).unwrap_err();
        assert_eq!(
            kind_of(&err),
            Some(&ProtocolError::NegativeLength { len: -1 })
        );
    }
}
