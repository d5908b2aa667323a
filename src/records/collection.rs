//! # Array and Dictionary Codecs
//!
//! ```text
//! Array<T>:     [VarInt count][T][T][T]...
//! Dict<K, V>:   [VarInt count][K][V][K][V]...
//! ```
//!
//! Elements sit back to back with no padding and no per-element length.
//! Fixed-size elements are bounds-checked as one span of `count * size`
//! bytes before anything is allocated; variable-size elements are walked one
//! by one, each starting where the previous one ended. Every element kind has
//! a minimum encoded size (one byte for anything length-prefixed, the fixed
//! block for a nested record), and `count * min_size` is checked against the
//! remaining bytes first. Both products use 64-bit arithmetic.
//!
//! ## Duplicate Keys
//!
//! Dictionary keys are scalars (numbers, enums, UUIDs, strings). Decode and
//! validation both detect repeats by comparing each key's canonical bytes:
//! the raw encoding, except that any non-zero bool byte means `true` and a
//! fixed ASCII key ends at its first NUL. That is exactly when two decoded
//! keys compare equal, so the validator and the decoder agree. Encode detects
//! repeats on the values themselves.

use eyre::{bail, ensure, Result, WrapErr};
use hashbrown::HashSet;

use crate::encoding::primitive::check_span;
use crate::encoding::varint;
use crate::error::ProtocolError;
use crate::records::layout::{read_value, value_size, write_value};
use crate::records::schema::{Catalog, FieldKind};
use crate::records::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CollectionKind {
    Array,
    Dict,
}

/// Reads a count prefix and applies the field maximum. Returns the count and
/// the position of the first element.
pub(crate) fn read_count(
    buf: &[u8],
    pos: usize,
    max: usize,
    what: CollectionKind,
) -> Result<(usize, usize)> {
    let (count, prefix) = varint::read_len(buf, pos)?;
    check_count(count, max, what)?;
    Ok((count, pos + prefix))
}

fn check_count(count: usize, max: usize, what: CollectionKind) -> Result<()> {
    if count > max {
        bail!(match what {
            CollectionKind::Array => ProtocolError::ArrayTooLong { count, max },
            CollectionKind::Dict => ProtocolError::DictionaryTooLarge { count, max },
        });
    }
    Ok(())
}

/// Smallest number of bytes any encoding of `kind` occupies.
pub(crate) fn min_encoded_size(catalog: &Catalog, kind: &FieldKind) -> usize {
    if let Some(size) = catalog.fixed_kind_size(kind) {
        return size;
    }
    match kind {
        FieldKind::Struct(id) => catalog
            .layout(*id)
            .map(|layout| layout.variable_block_start())
            .unwrap_or(1),
        _ => 1,
    }
}

/// Fails with `BufferTooSmall` when `count` elements of at least
/// `element_size` bytes cannot fit at `pos`.
pub(crate) fn check_elements_fit(
    buf: &[u8],
    pos: usize,
    count: usize,
    element_size: usize,
) -> Result<()> {
    check_span(buf, pos, (count as u64).saturating_mul(element_size as u64))
}

/// Canonical comparison bytes for an encoded dictionary key.
pub(crate) fn key_bytes<'a>(kind: &FieldKind, raw: &'a [u8]) -> &'a [u8] {
    match kind {
        FieldKind::Bool => {
            if raw.iter().any(|&b| b != 0) {
                &[1]
            } else {
                &[0]
            }
        }
        FieldKind::FixedAscii { .. } => {
            let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
            &raw[..end]
        }
        _ => raw,
    }
}

/// Preallocation bound: never reserve more slots than bytes remain.
fn capacity_hint(buf: &[u8], pos: usize, count: usize) -> usize {
    count.min(buf.len().saturating_sub(pos))
}

pub(crate) fn write_array(
    catalog: &Catalog,
    element: &FieldKind,
    max: usize,
    items: &[Value],
    out: &mut Vec<u8>,
    depth: usize,
) -> Result<()> {
    check_count(items.len(), max, CollectionKind::Array)?;
    varint::write(out, items.len() as u32);
    for (i, item) in items.iter().enumerate() {
        write_value(catalog, element, item, out, depth).wrap_err_with(|| format!("[{}]", i))?;
    }
    Ok(())
}

pub(crate) fn array_size(
    catalog: &Catalog,
    element: &FieldKind,
    max: usize,
    items: &[Value],
    depth: usize,
) -> Result<usize> {
    check_count(items.len(), max, CollectionKind::Array)?;
    let mut size = varint::size(items.len() as u32);
    for (i, item) in items.iter().enumerate() {
        size += value_size(catalog, element, item, depth).wrap_err_with(|| format!("[{}]", i))?;
    }
    Ok(size)
}

pub(crate) fn read_array(
    catalog: &Catalog,
    element: &FieldKind,
    max: usize,
    buf: &[u8],
    pos: usize,
    depth: usize,
) -> Result<(Value, usize)> {
    let (count, mut cursor) = read_count(buf, pos, max, CollectionKind::Array)?;
    check_elements_fit(buf, cursor, count, min_encoded_size(catalog, element))?;

    let mut items = Vec::with_capacity(capacity_hint(buf, cursor, count));
    for i in 0..count {
        let (item, next) = read_value(catalog, element, buf, cursor, depth)
            .wrap_err_with(|| format!("[{}]", i))?;
        items.push(item);
        cursor = next;
    }
    Ok((Value::Array(items), cursor))
}

pub(crate) fn write_dict(
    catalog: &Catalog,
    key: &FieldKind,
    value: &FieldKind,
    max: usize,
    entries: &[(Value, Value)],
    out: &mut Vec<u8>,
    depth: usize,
) -> Result<()> {
    check_count(entries.len(), max, CollectionKind::Dict)?;
    ensure_unique_keys(entries)?;
    varint::write(out, entries.len() as u32);
    for (i, (k, v)) in entries.iter().enumerate() {
        write_value(catalog, key, k, out, depth)
            .and_then(|_| write_value(catalog, value, v, out, depth))
            .wrap_err_with(|| format!("[{}]", i))?;
    }
    Ok(())
}

pub(crate) fn dict_size(
    catalog: &Catalog,
    key: &FieldKind,
    value: &FieldKind,
    max: usize,
    entries: &[(Value, Value)],
    depth: usize,
) -> Result<usize> {
    check_count(entries.len(), max, CollectionKind::Dict)?;
    ensure_unique_keys(entries)?;
    let mut size = varint::size(entries.len() as u32);
    for (i, (k, v)) in entries.iter().enumerate() {
        let entry = value_size(catalog, key, k, depth)
            .and_then(|ks| Ok(ks + value_size(catalog, value, v, depth)?))
            .wrap_err_with(|| format!("[{}]", i))?;
        size += entry;
    }
    Ok(size)
}

fn ensure_unique_keys(entries: &[(Value, Value)]) -> Result<()> {
    let mut seen = HashSet::with_capacity(entries.len());
    for (k, _) in entries {
        ensure!(seen.insert(k), ProtocolError::DuplicateKey);
    }
    Ok(())
}

pub(crate) fn read_dict(
    catalog: &Catalog,
    key: &FieldKind,
    value: &FieldKind,
    max: usize,
    buf: &[u8],
    pos: usize,
    depth: usize,
) -> Result<(Value, usize)> {
    let (count, mut cursor) = read_count(buf, pos, max, CollectionKind::Dict)?;
    let entry_min = min_encoded_size(catalog, key) + min_encoded_size(catalog, value);
    check_elements_fit(buf, cursor, count, entry_min)?;

    let capacity = capacity_hint(buf, cursor, count);
    let mut seen: HashSet<&[u8]> = HashSet::with_capacity(capacity);
    let mut entries = Vec::with_capacity(capacity);

    for i in 0..count {
        let entry = (|| -> Result<(Value, Value, usize)> {
            let (k, key_end) = read_value(catalog, key, buf, cursor, depth)?;
            ensure!(
                seen.insert(key_bytes(key, &buf[cursor..key_end])),
                ProtocolError::DuplicateKey
            );
            let (v, value_end) = read_value(catalog, value, buf, key_end, depth)?;
            Ok((k, v, value_end))
        })()
        .wrap_err_with(|| format!("[{}]", i))?;

        entries.push((entry.0, entry.1));
        cursor = entry.2;
    }
    Ok((Value::Dict(entries), cursor))
}
