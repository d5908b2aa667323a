//! # Structural Validator
//!
//! Untrusted payloads are certified by `validate_structure` before
//! `deserialize` runs on them. The validator walks the same layout the
//! decoder does, with the same helpers for offsets, prefixes, ceilings and
//! spans, but builds no values. It does not trust a length or offset until it
//! has been checked against the end of the buffer.
//!
//! ## Walk Modes
//!
//! One walker serves two operations:
//!
//! | Mode | Used by | Checks |
//! |------|---------|--------|
//! | `Validate` | `validate_structure`, `validate_variant` | bounds, ceilings, offsets, depth, tags, UTF-8, ASCII, enum ranges, duplicate keys |
//! | `Measure` | `compute_bytes_consumed`, `variant_bytes_consumed` | bounds, ceilings, offsets, depth, tags |
//!
//! Both return the furthest byte the record reaches, computed exactly as the
//! decoder computes it: the maximum end over present variable fields, floored
//! at `FIXED_BLOCK_SIZE`. `Measure` skips fixed fields entirely, and skips
//! element-by-element walks for arrays of plain fixed-size numbers.
//!
//! ## Guarantee
//!
//! Every condition the decoder can fail on is checked here in `Validate`
//! mode, so a buffer that validates decodes without error. The only
//! allocations are the per-dictionary key set and the error report.
//!
//! ## Error Paths
//!
//! Failures carry the path to the offending field as report context, one
//! entry per level:
//!
//! ```text
//! TagPattern.operands: [2]: TagPattern.not: TagPattern.kind: enum value 9 out of range for 4 variants
//! ```

use eyre::{ensure, Result, WrapErr};
use hashbrown::HashSet;

use crate::encoding::primitive::{check_span, fixed_ascii_bytes};
use crate::encoding::{string, varint};
use crate::error::ProtocolError;
use crate::records::collection::{
    check_elements_fit, key_bytes, min_encoded_size, read_count, CollectionKind,
};
use crate::records::layout::{check_depth, field_path, is_present, read_enum, resolve_offset};
use crate::records::polymorphic::variant_struct;
use crate::records::schema::{Catalog, FamilyId, FieldKind, Placement, StructId};

impl Catalog {
    /// Checks that the record at `offset` can be decoded. Run on every
    /// untrusted payload before `deserialize`.
    pub fn validate_structure(&self, id: StructId, buf: &[u8], offset: usize) -> Result<()> {
        Walker::new(self, Mode::Validate)
            .record_end(id, buf, offset, 0)
            .map(|_| ())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    Validate,
    Measure,
}

pub(crate) struct Walker<'c> {
    catalog: &'c Catalog,
    mode: Mode,
}

impl<'c> Walker<'c> {
    pub(crate) fn new(catalog: &'c Catalog, mode: Mode) -> Self {
        Self { catalog, mode }
    }

    fn validating(&self) -> bool {
        self.mode == Mode::Validate
    }

    /// Absolute end of the record at `offset`.
    pub(crate) fn record_end(
        &self,
        id: StructId,
        buf: &[u8],
        offset: usize,
        depth: usize,
    ) -> Result<usize> {
        check_depth(depth)?;
        let layout = self.catalog.layout(id)?;
        check_span(buf, offset, layout.variable_block_start() as u64)?;

        let variable_block_start = offset + layout.variable_block_start();
        let mut end = variable_block_start;

        for field in layout.fields() {
            if !is_present(buf, offset, field) {
                continue;
            }
            match field.placement {
                Placement::Fixed { offset: at, .. } => {
                    if self.validating() {
                        self.value_end(&field.kind, buf, offset + at, depth)
                            .wrap_err_with(|| field_path(layout, field))?;
                    }
                }
                Placement::Variable { slot } => {
                    let field_end = resolve_offset(buf, offset, layout, slot, variable_block_start)
                        .and_then(|pos| self.value_end(&field.kind, buf, pos, depth))
                        .wrap_err_with(|| field_path(layout, field))?;
                    end = end.max(field_end);
                }
            }
        }

        Ok(end)
    }

    /// Absolute end of the polymorphic value at `pos`.
    pub(crate) fn variant_end(
        &self,
        family: FamilyId,
        buf: &[u8],
        pos: usize,
        depth: usize,
    ) -> Result<usize> {
        let family = self.catalog.family(family)?;
        let (tag, tag_len) = varint::read(buf, pos)?;
        let id = variant_struct(family, tag)?;
        self.record_end(id, buf, pos + tag_len, depth)
    }

    fn value_end(&self, kind: &FieldKind, buf: &[u8], pos: usize, depth: usize) -> Result<usize> {
        match kind {
            FieldKind::Enum { variants } => {
                read_enum(buf, pos, *variants)?;
                Ok(pos + 1)
            }
            FieldKind::FixedAscii { len } => {
                if self.validating() {
                    fixed_ascii_bytes(buf, pos, *len)?;
                } else {
                    check_span(buf, pos, *len as u64)?;
                }
                Ok(pos + len)
            }
            FieldKind::VarAscii { max_len } if self.validating() => {
                string::read_ascii(buf, pos, *max_len).map(|(_, end)| end)
            }
            FieldKind::String { max_len } | FieldKind::VarAscii { max_len } => {
                if self.validating() {
                    string::read(buf, pos, *max_len).map(|(_, end)| end)
                } else {
                    let (len, prefix) = varint::read_len(buf, pos)?;
                    ensure!(
                        len <= *max_len,
                        ProtocolError::StringTooLong { len, max: *max_len }
                    );
                    check_span(buf, pos + prefix, len as u64)?;
                    Ok(pos + prefix + len)
                }
            }
            FieldKind::Array { element, max_count } => {
                self.array_end(element, *max_count, buf, pos, depth)
            }
            FieldKind::Dict {
                key,
                value,
                max_count,
            } => self.dict_end(key, value, *max_count, buf, pos, depth),
            FieldKind::Struct(id) => self.record_end(*id, buf, pos, depth + 1),
            FieldKind::Polymorphic(family) => self.variant_end(*family, buf, pos, depth + 1),
            primitive => {
                let size = self.catalog.fixed_kind_size(primitive).unwrap_or(0);
                check_span(buf, pos, size as u64)?;
                Ok(pos + size)
            }
        }
    }

    fn array_end(
        &self,
        element: &FieldKind,
        max: usize,
        buf: &[u8],
        pos: usize,
        depth: usize,
    ) -> Result<usize> {
        let (count, mut cursor) = read_count(buf, pos, max, CollectionKind::Array)?;
        check_elements_fit(buf, cursor, count, min_encoded_size(self.catalog, element))?;

        if let Some(size) = self.catalog.fixed_kind_size(element) {
            if !self.validating() || is_plain_number(element) {
                return Ok(cursor + count * size);
            }
        }

        for i in 0..count {
            cursor = self
                .value_end(element, buf, cursor, depth)
                .wrap_err_with(|| format!("[{}]", i))?;
        }
        Ok(cursor)
    }

    fn dict_end(
        &self,
        key: &FieldKind,
        value: &FieldKind,
        max: usize,
        buf: &[u8],
        pos: usize,
        depth: usize,
    ) -> Result<usize> {
        let (count, mut cursor) = read_count(buf, pos, max, CollectionKind::Dict)?;
        let entry_min = min_encoded_size(self.catalog, key) + min_encoded_size(self.catalog, value);
        check_elements_fit(buf, cursor, count, entry_min)?;

        let mut seen: HashSet<&[u8]> = HashSet::new();
        for i in 0..count {
            let next = (|| -> Result<usize> {
                let key_end = self.value_end(key, buf, cursor, depth)?;
                if self.validating() {
                    ensure!(
                        seen.insert(key_bytes(key, &buf[cursor..key_end])),
                        ProtocolError::DuplicateKey
                    );
                }
                self.value_end(value, buf, key_end, depth)
            })()
            .wrap_err_with(|| format!("[{}]", i))?;
            cursor = next;
        }
        Ok(cursor)
    }
}

/// Fixed-size kinds whose every bit pattern decodes.
fn is_plain_number(kind: &FieldKind) -> bool {
    matches!(
        kind,
        FieldKind::Bool
            | FieldKind::Int8
            | FieldKind::UInt8
            | FieldKind::Int16
            | FieldKind::UInt16
            | FieldKind::Int32
            | FieldKind::UInt32
            | FieldKind::Int64
            | FieldKind::Float32
            | FieldKind::Float64
            | FieldKind::Uuid
    )
}
