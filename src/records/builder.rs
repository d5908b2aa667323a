//! # RecordBuilder - Record Construction
//!
//! Builds a [`Record`] field by field, by name. Every field starts out at its
//! default: absent for nullable fields, the zero value of its kind otherwise
//! (empty string, empty collection, a default nested record, the first
//! variant of a family). Setters check the value's shape against the field
//! kind, so a mistyped field fails at the setter rather than at serialize.
//!
//! ## Usage
//!
//! ```ignore
//! let mut builder = catalog.builder_for("Connect")?;
//! builder.set("client_type", Value::Enum(1))?;
//! builder.set("username", "alice")?;
//! builder.set_null("language")?;
//! let record = builder.build();
//!
//! // Reuse the builder for the next record
//! builder.reset()?;
//! ```

use eyre::{bail, ensure, Result};

use crate::error::ProtocolError;
use crate::records::layout::{check_depth, kind_accepts, kind_name};
use crate::records::schema::{Catalog, FieldKind, StructId, StructLayout};
use crate::records::value::{Record, Value};

pub struct RecordBuilder<'a> {
    catalog: &'a Catalog,
    layout: &'a StructLayout,
    fields: Vec<Option<Value>>,
}

impl<'a> RecordBuilder<'a> {
    pub fn new(catalog: &'a Catalog, id: StructId) -> Result<Self> {
        let layout = catalog.layout(id)?;
        let fields = default_fields(catalog, layout, 0)?;
        Ok(Self {
            catalog,
            layout,
            fields,
        })
    }

    pub fn reset(&mut self) -> Result<()> {
        self.fields = default_fields(self.catalog, self.layout, 0)?;
        Ok(())
    }

    fn index_of(&self, name: &str) -> Result<usize> {
        match self.layout.field_index(name) {
            Some(idx) => Ok(idx),
            None => bail!("struct '{}' has no field '{}'", self.layout.name(), name),
        }
    }

    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let idx = self.index_of(name)?;
        let value = value.into();
        let kind = &self.layout.fields()[idx].kind;
        ensure!(
            kind_accepts(kind, &value),
            ProtocolError::TypeMismatch {
                expected: kind_name(kind),
            }
        );
        self.fields[idx] = Some(value);
        Ok(())
    }

    pub fn set_null(&mut self, name: &str) -> Result<()> {
        let idx = self.index_of(name)?;
        let field = &self.layout.fields()[idx];
        ensure!(
            field.nullable,
            ProtocolError::MissingField {
                field: format!("{}.{}", self.layout.name(), field.name),
            }
        );
        self.fields[idx] = None;
        Ok(())
    }

    pub fn build(self) -> Record {
        Record::from_fields(self.layout.id(), self.fields)
    }
}

impl Catalog {
    pub fn builder_for(&self, name: &str) -> Result<RecordBuilder<'_>> {
        RecordBuilder::new(self, self.require_struct(name)?)
    }

    /// A record of struct `id` with every field at its default.
    pub fn default_record(&self, id: StructId) -> Result<Record> {
        let layout = self.layout(id)?;
        Ok(Record::from_fields(id, default_fields(self, layout, 0)?))
    }

    /// Looks a field up by name.
    pub fn field<'r>(&self, record: &'r Record, name: &str) -> Option<&'r Value> {
        let layout = self.layout(record.struct_id()).ok()?;
        record.get(layout.field_index(name)?)
    }
}

fn default_fields(
    catalog: &Catalog,
    layout: &StructLayout,
    depth: usize,
) -> Result<Vec<Option<Value>>> {
    check_depth(depth)?;
    layout
        .fields()
        .iter()
        .map(|field| {
            if field.nullable {
                Ok(None)
            } else {
                default_value(catalog, &field.kind, depth).map(Some)
            }
        })
        .collect()
}

fn default_value(catalog: &Catalog, kind: &FieldKind, depth: usize) -> Result<Value> {
    Ok(match kind {
        FieldKind::Bool => Value::Bool(false),
        FieldKind::Int8 => Value::Int8(0),
        FieldKind::UInt8 => Value::UInt8(0),
        FieldKind::Int16 => Value::Int16(0),
        FieldKind::UInt16 => Value::UInt16(0),
        FieldKind::Int32 => Value::Int32(0),
        FieldKind::UInt32 => Value::UInt32(0),
        FieldKind::Int64 => Value::Int64(0),
        FieldKind::Float32 => Value::Float32(0.0),
        FieldKind::Float64 => Value::Float64(0.0),
        FieldKind::Uuid => Value::Uuid(0),
        FieldKind::Enum { .. } => Value::Enum(0),
        FieldKind::FixedAscii { .. } | FieldKind::String { .. } | FieldKind::VarAscii { .. } => {
            Value::Text(String::new())
        }
        FieldKind::Array { .. } => Value::Array(Vec::new()),
        FieldKind::Dict { .. } => Value::Dict(Vec::new()),
        FieldKind::Struct(id) => {
            let layout = catalog.layout(*id)?;
            Value::record(Record::from_fields(
                *id,
                default_fields(catalog, layout, depth + 1)?,
            ))
        }
        FieldKind::Polymorphic(family) => {
            let family = catalog.family(*family)?;
            let Some(&(tag, id)) = family.variants().first() else {
                bail!("family '{}' has no variants", family.name());
            };
            let layout = catalog.layout(id)?;
            Value::variant(
                tag,
                Record::from_fields(id, default_fields(catalog, layout, depth + 1)?),
            )
        }
    })
}
