//! # Record Layout Engine
//!
//! Encodes and decodes records against their compiled [`StructLayout`].
//!
//! ## Record Binary Layout
//!
//! ```text
//! record_start
//! +-------------+------------------+---------------------+------------------+
//! | Null Bitmap | Fixed Fields     | Offset Table        | Variable Block   |
//! | [u8; B]     | static offsets   | [i32 LE; V]         | payloads         |
//! +-------------+------------------+---------------------+------------------+
//!                                                        ^
//!                                   variable_block_start = record_start + FIXED_BLOCK_SIZE
//! ```
//!
//! Offset slots are relative to `variable_block_start`, never to the record
//! start, and `-1` marks an absent field. The quantity is computed once per
//! record in each path and passed down; nothing recomputes it ad hoc.
//!
//! ## Serialize
//!
//! Presence is known from the record before any byte is written, so the
//! bitmask goes out first and complete. Fixed fields follow (absent nullable
//! ones as zeros), then zeroed slots, then each variable field in declaration
//! order with its slot patched to the cursor's distance from the variable
//! block. A failed serialize truncates the output back to where it started.
//!
//! ## Deserialize
//!
//! Reads the bitmask, each fixed field at its static offset, and for each
//! present variable field follows its slot. Absent fields become `None` and
//! their slots are never followed. The end of a record is the furthest byte
//! any present variable field reaches, floored at `FIXED_BLOCK_SIZE`, so the
//! decoder does not depend on the order payloads were laid out in.
//!
//! ## Depth
//!
//! Every path counts record nesting and stops at `MAX_NESTING_DEPTH`, which
//! bounds recursion for self-referencing types on hostile input.

use eyre::{bail, ensure, Result, WrapErr};
use smallvec::{smallvec, SmallVec};

use crate::config::{
    ABSENT_OFFSET, MAX_NESTING_DEPTH, MAX_PACKET_SIZE, NULL_BITS_PER_BYTE, OFFSET_SLOT_SIZE,
};
use crate::encoding::primitive::{self, check_span, patch_i32};
use crate::encoding::string;
use crate::error::ProtocolError;
use crate::records::collection;
use crate::records::polymorphic;
use crate::records::schema::{Catalog, FieldKind, FieldLayout, Placement, StructId, StructLayout};
use crate::records::validate::{Mode, Walker};
use crate::records::value::{Record, Value};

impl Catalog {
    /// Appends the encoding of `record` to `out`.
    pub fn serialize(&self, record: &Record, out: &mut Vec<u8>) -> Result<()> {
        let start = out.len();
        let result = write_record(self, record, out, 0);
        if result.is_err() {
            out.truncate(start);
        }
        result
    }

    /// Number of bytes `serialize` writes for `record`.
    pub fn compute_size(&self, record: &Record) -> Result<usize> {
        record_size(self, record, 0)
    }

    pub fn deserialize(&self, id: StructId, buf: &[u8], offset: usize) -> Result<Record> {
        read_record(self, id, buf, offset, 0).map(|(record, _)| record)
    }

    /// Bytes `deserialize` would consume at `offset`, without building values.
    pub fn compute_bytes_consumed(&self, id: StructId, buf: &[u8], offset: usize) -> Result<usize> {
        let end = Walker::new(self, Mode::Measure).record_end(id, buf, offset, 0)?;
        Ok(end - offset)
    }
}

pub(crate) fn field_path(layout: &StructLayout, field: &FieldLayout) -> String {
    format!("{}.{}", layout.name, field.name)
}

pub(crate) fn check_depth(depth: usize) -> Result<()> {
    ensure!(
        depth < MAX_NESTING_DEPTH,
        ProtocolError::NestingTooDeep {
            max: MAX_NESTING_DEPTH
        }
    );
    Ok(())
}

/// Whether `field` is present in the record at `record_start`. Non-nullable
/// fields are always present. The caller has bounds-checked the fixed block.
pub(crate) fn is_present(buf: &[u8], record_start: usize, field: &FieldLayout) -> bool {
    match field.null_bit {
        None => true,
        Some(bit) => {
            let byte = buf[record_start + bit / NULL_BITS_PER_BYTE];
            byte & (1 << (bit % NULL_BITS_PER_BYTE)) != 0
        }
    }
}

/// Follows a present field's offset slot to the absolute payload position.
pub(crate) fn resolve_offset(
    buf: &[u8],
    record_start: usize,
    layout: &StructLayout,
    slot: usize,
    variable_block_start: usize,
) -> Result<usize> {
    let relative = primitive::read_i32(buf, record_start + layout.slot_position(slot))?;
    let out_of_bounds = ProtocolError::OffsetOutOfBounds {
        offset: i64::from(relative),
        limit: buf.len(),
    };
    if relative < 0 {
        bail!(out_of_bounds);
    }
    match variable_block_start.checked_add(relative as usize) {
        Some(pos) if pos < buf.len() => Ok(pos),
        _ => bail!(out_of_bounds),
    }
}

pub(crate) fn kind_name(kind: &FieldKind) -> &'static str {
    match kind {
        FieldKind::Bool => "bool",
        FieldKind::Int8 => "int8",
        FieldKind::UInt8 => "uint8",
        FieldKind::Int16 => "int16",
        FieldKind::UInt16 => "uint16",
        FieldKind::Int32 => "int32",
        FieldKind::UInt32 => "uint32",
        FieldKind::Int64 => "int64",
        FieldKind::Float32 => "float32",
        FieldKind::Float64 => "float64",
        FieldKind::Uuid => "uuid",
        FieldKind::Enum { .. } => "enum",
        FieldKind::FixedAscii { .. } | FieldKind::String { .. } | FieldKind::VarAscii { .. } => {
            "text"
        }
        FieldKind::Array { .. } => "array",
        FieldKind::Dict { .. } => "dict",
        FieldKind::Struct(_) => "struct",
        FieldKind::Polymorphic(_) => "variant",
    }
}

/// Shallow shape check: does `value` have the variant `kind` stores?
pub(crate) fn kind_accepts(kind: &FieldKind, value: &Value) -> bool {
    matches!(
        (kind, value),
        (FieldKind::Bool, Value::Bool(_))
            | (FieldKind::Int8, Value::Int8(_))
            | (FieldKind::UInt8, Value::UInt8(_))
            | (FieldKind::Int16, Value::Int16(_))
            | (FieldKind::UInt16, Value::UInt16(_))
            | (FieldKind::Int32, Value::Int32(_))
            | (FieldKind::UInt32, Value::UInt32(_))
            | (FieldKind::Int64, Value::Int64(_))
            | (FieldKind::Float32, Value::Float32(_))
            | (FieldKind::Float64, Value::Float64(_))
            | (FieldKind::Uuid, Value::Uuid(_))
            | (FieldKind::Enum { .. }, Value::Enum(_))
            | (FieldKind::FixedAscii { .. }, Value::Text(_))
            | (FieldKind::String { .. }, Value::Text(_))
            | (FieldKind::VarAscii { .. }, Value::Text(_))
            | (FieldKind::Array { .. }, Value::Array(_))
            | (FieldKind::Dict { .. }, Value::Dict(_))
            | (FieldKind::Struct(_), Value::Struct(_))
            | (FieldKind::Polymorphic(_), Value::Variant(_))
    )
}

fn mismatch(kind: &FieldKind) -> ProtocolError {
    ProtocolError::TypeMismatch {
        expected: kind_name(kind),
    }
}

fn checked_layout<'c>(catalog: &'c Catalog, record: &Record) -> Result<&'c StructLayout> {
    let layout = catalog.layout(record.struct_id())?;
    ensure!(
        record.len() == layout.fields.len(),
        ProtocolError::IllegalArgument(format!(
            "record has {} fields but '{}' declares {}",
            record.len(),
            layout.name,
            layout.fields.len()
        ))
    );
    Ok(layout)
}

pub(crate) fn write_record(
    catalog: &Catalog,
    record: &Record,
    out: &mut Vec<u8>,
    depth: usize,
) -> Result<()> {
    check_depth(depth)?;
    let layout = checked_layout(catalog, record)?;
    let start = out.len();

    let mut bitmask: SmallVec<[u8; 4]> = smallvec![0; layout.bitmask_size];
    for (field, value) in layout.fields.iter().zip(record.fields()) {
        match (value, field.null_bit) {
            (Some(_), Some(bit)) => {
                bitmask[bit / NULL_BITS_PER_BYTE] |= 1 << (bit % NULL_BITS_PER_BYTE)
            }
            (None, None) => bail!(ProtocolError::MissingField {
                field: field_path(layout, field),
            }),
            _ => {}
        }
    }
    out.extend_from_slice(&bitmask);

    for (field, value) in layout.fields.iter().zip(record.fields()) {
        if let Placement::Fixed { size, .. } = field.placement {
            match value {
                Some(value) => write_value(catalog, &field.kind, value, out, depth)
                    .wrap_err_with(|| field_path(layout, field))?,
                None => out.resize(out.len() + size, 0),
            }
        }
    }

    out.resize(
        out.len() + layout.variable_field_count * OFFSET_SLOT_SIZE,
        0,
    );
    let variable_block_start = start + layout.variable_block_start;

    for (field, value) in layout.fields.iter().zip(record.fields()) {
        let Placement::Variable { slot } = field.placement else {
            continue;
        };
        let slot_pos = start + layout.slot_position(slot);
        match value {
            None => patch_i32(out, slot_pos, ABSENT_OFFSET)?,
            Some(value) => {
                let relative = out.len() - variable_block_start;
                let Ok(relative) = i32::try_from(relative) else {
                    bail!(ProtocolError::PacketTooLarge {
                        size: out.len() - start,
                        max: MAX_PACKET_SIZE,
                    });
                };
                patch_i32(out, slot_pos, relative)?;
                write_value(catalog, &field.kind, value, out, depth)
                    .wrap_err_with(|| field_path(layout, field))?;
            }
        }
    }

    Ok(())
}

pub(crate) fn record_size(catalog: &Catalog, record: &Record, depth: usize) -> Result<usize> {
    check_depth(depth)?;
    let layout = checked_layout(catalog, record)?;
    let mut size = layout.variable_block_start;

    for (field, value) in layout.fields.iter().zip(record.fields()) {
        match (field.placement, value) {
            (Placement::Variable { .. }, Some(value)) => {
                size += value_size(catalog, &field.kind, value, depth)
                    .wrap_err_with(|| field_path(layout, field))?;
            }
            (_, None) if !field.nullable => bail!(ProtocolError::MissingField {
                field: field_path(layout, field),
            }),
            _ => {}
        }
    }

    Ok(size)
}

pub(crate) fn write_value(
    catalog: &Catalog,
    kind: &FieldKind,
    value: &Value,
    out: &mut Vec<u8>,
    depth: usize,
) -> Result<()> {
    match (kind, value) {
        (FieldKind::Bool, Value::Bool(v)) => primitive::write_bool(out, *v),
        (FieldKind::Int8, Value::Int8(v)) => out.extend_from_slice(&v.to_le_bytes()),
        (FieldKind::UInt8, Value::UInt8(v)) => out.push(*v),
        (FieldKind::Int16, Value::Int16(v)) => out.extend_from_slice(&v.to_le_bytes()),
        (FieldKind::UInt16, Value::UInt16(v)) => out.extend_from_slice(&v.to_le_bytes()),
        (FieldKind::Int32, Value::Int32(v)) => primitive::write_i32(out, *v),
        (FieldKind::UInt32, Value::UInt32(v)) => out.extend_from_slice(&v.to_le_bytes()),
        (FieldKind::Int64, Value::Int64(v)) => out.extend_from_slice(&v.to_le_bytes()),
        (FieldKind::Float32, Value::Float32(v)) => out.extend_from_slice(&v.to_le_bytes()),
        (FieldKind::Float64, Value::Float64(v)) => out.extend_from_slice(&v.to_le_bytes()),
        (FieldKind::Uuid, Value::Uuid(v)) => primitive::write_uuid(out, *v),
        (FieldKind::Enum { variants }, Value::Enum(v)) => {
            ensure!(
                usize::from(*v) < *variants,
                ProtocolError::InvalidEnumValue {
                    value: *v,
                    variants: *variants,
                }
            );
            out.push(*v);
        }
        (FieldKind::FixedAscii { len }, Value::Text(s)) => {
            primitive::write_fixed_ascii(out, s, *len)?
        }
        (FieldKind::String { max_len }, Value::Text(s)) => string::write(out, s, *max_len)?,
        (FieldKind::VarAscii { max_len }, Value::Text(s)) => {
            string::write_ascii(out, s, *max_len)?
        }
        (FieldKind::Array { element, max_count }, Value::Array(items)) => {
            collection::write_array(catalog, element, *max_count, items, out, depth)?
        }
        (
            FieldKind::Dict {
                key,
                value,
                max_count,
            },
            Value::Dict(entries),
        ) => collection::write_dict(catalog, key, value, *max_count, entries, out, depth)?,
        (FieldKind::Struct(id), Value::Struct(record)) => {
            ensure!(record.struct_id() == *id, mismatch(kind));
            write_record(catalog, record, out, depth + 1)?
        }
        (FieldKind::Polymorphic(family), Value::Variant(variant)) => {
            polymorphic::write_variant(catalog, *family, variant, out, depth + 1)?
        }
        _ => bail!(mismatch(kind)),
    }
    Ok(())
}

pub(crate) fn value_size(
    catalog: &Catalog,
    kind: &FieldKind,
    value: &Value,
    depth: usize,
) -> Result<usize> {
    if let Some(size) = catalog.fixed_kind_size(kind) {
        ensure!(kind_accepts(kind, value), mismatch(kind));
        return Ok(size);
    }
    Ok(match (kind, value) {
        (FieldKind::String { max_len }, Value::Text(s))
        | (FieldKind::VarAscii { max_len }, Value::Text(s)) => {
            ensure!(
                s.len() <= *max_len,
                ProtocolError::StringTooLong {
                    len: s.len(),
                    max: *max_len,
                }
            );
            string::encoded_size(s)
        }
        (FieldKind::Array { element, max_count }, Value::Array(items)) => {
            collection::array_size(catalog, element, *max_count, items, depth)?
        }
        (
            FieldKind::Dict {
                key,
                value,
                max_count,
            },
            Value::Dict(entries),
        ) => collection::dict_size(catalog, key, value, *max_count, entries, depth)?,
        (FieldKind::Struct(id), Value::Struct(record)) => {
            ensure!(record.struct_id() == *id, mismatch(kind));
            record_size(catalog, record, depth + 1)?
        }
        (FieldKind::Polymorphic(family), Value::Variant(variant)) => {
            polymorphic::variant_size(catalog, *family, variant, depth + 1)?
        }
        _ => bail!(mismatch(kind)),
    })
}

pub(crate) fn read_record(
    catalog: &Catalog,
    id: StructId,
    buf: &[u8],
    offset: usize,
    depth: usize,
) -> Result<(Record, usize)> {
    check_depth(depth)?;
    let layout = catalog.layout(id)?;
    check_span(buf, offset, layout.variable_block_start as u64)?;

    let variable_block_start = offset + layout.variable_block_start;
    let mut end = variable_block_start;
    let mut fields = Vec::with_capacity(layout.fields.len());

    for field in &layout.fields {
        if !is_present(buf, offset, field) {
            fields.push(None);
            continue;
        }
        let value = match field.placement {
            Placement::Fixed { offset: at, .. } => {
                read_value(catalog, &field.kind, buf, offset + at, depth).map(|(v, _)| v)
            }
            Placement::Variable { slot } => {
                resolve_offset(buf, offset, layout, slot, variable_block_start)
                    .and_then(|pos| read_value(catalog, &field.kind, buf, pos, depth))
                    .map(|(v, field_end)| {
                        end = end.max(field_end);
                        v
                    })
            }
        }
        .wrap_err_with(|| field_path(layout, field))?;
        fields.push(Some(value));
    }

    Ok((Record::from_fields(id, fields), end))
}

/// Decodes one value at `pos`, returning it and the position just past it.
pub(crate) fn read_value(
    catalog: &Catalog,
    kind: &FieldKind,
    buf: &[u8],
    pos: usize,
    depth: usize,
) -> Result<(Value, usize)> {
    let fixed = |value: Value, size: usize| Ok((value, pos + size));
    match kind {
        FieldKind::Bool => fixed(Value::Bool(primitive::read_bool(buf, pos)?), 1),
        FieldKind::Int8 => fixed(Value::Int8(primitive::read_i8(buf, pos)?), 1),
        FieldKind::UInt8 => fixed(Value::UInt8(primitive::read_u8(buf, pos)?), 1),
        FieldKind::Int16 => fixed(Value::Int16(primitive::read_i16(buf, pos)?), 2),
        FieldKind::UInt16 => fixed(Value::UInt16(primitive::read_u16(buf, pos)?), 2),
        FieldKind::Int32 => fixed(Value::Int32(primitive::read_i32(buf, pos)?), 4),
        FieldKind::UInt32 => fixed(Value::UInt32(primitive::read_u32(buf, pos)?), 4),
        FieldKind::Int64 => fixed(Value::Int64(primitive::read_i64(buf, pos)?), 8),
        FieldKind::Float32 => fixed(Value::Float32(primitive::read_f32(buf, pos)?), 4),
        FieldKind::Float64 => fixed(Value::Float64(primitive::read_f64(buf, pos)?), 8),
        FieldKind::Uuid => fixed(Value::Uuid(primitive::read_uuid(buf, pos)?), 16),
        FieldKind::Enum { variants } => {
            let v = read_enum(buf, pos, *variants)?;
            fixed(Value::Enum(v), 1)
        }
        FieldKind::FixedAscii { len } => {
            fixed(Value::Text(primitive::read_fixed_ascii(buf, pos, *len)?), *len)
        }
        FieldKind::String { max_len } => {
            let (text, end) = string::read(buf, pos, *max_len)?;
            Ok((Value::Text(text.to_owned()), end))
        }
        FieldKind::VarAscii { max_len } => {
            let (text, end) = string::read_ascii(buf, pos, *max_len)?;
            Ok((Value::Text(text.to_owned()), end))
        }
        FieldKind::Array { element, max_count } => {
            collection::read_array(catalog, element, *max_count, buf, pos, depth)
        }
        FieldKind::Dict {
            key,
            value,
            max_count,
        } => collection::read_dict(catalog, key, value, *max_count, buf, pos, depth),
        FieldKind::Struct(id) => {
            let (record, end) = read_record(catalog, *id, buf, pos, depth + 1)?;
            Ok((Value::record(record), end))
        }
        FieldKind::Polymorphic(family) => {
            let (variant, end) = polymorphic::read_variant(catalog, *family, buf, pos, depth + 1)?;
            Ok((Value::Variant(Box::new(variant)), end))
        }
    }
}

pub(crate) fn read_enum(buf: &[u8], pos: usize, variants: usize) -> Result<u8> {
    let value = primitive::read_u8(buf, pos)?;
    ensure!(
        usize::from(value) < variants,
        ProtocolError::InvalidEnumValue { value, variants }
    );
    Ok(value)
}
