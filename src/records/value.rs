//! # In-Memory Record Graph
//!
//! Decoded packets are plain owned values: a [`Record`] holds one
//! `Option<Value>` per declared field, in declaration order, tagged with the
//! [`StructId`] of its layout. `None` means the field is absent, which only
//! nullable fields may be on the wire.
//!
//! ## Value Semantics
//!
//! - `Clone` is deep: nested records, arrays and dictionary entries are copied.
//! - Equality and hashing are structural. Floats compare by bit pattern, so a
//!   record containing NaN still equals its own decode.
//! - Dictionaries keep insertion order for encoding but compare and hash
//!   independent of entry order.
//! - Polymorphic values carry their variant tag explicitly in [`Variant`].

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use hashbrown::HashMap;

use crate::records::schema::StructId;

#[derive(Debug, Clone)]
pub enum Value {
    Bool(bool),
    Int8(i8),
    UInt8(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Uuid(u128),
    Enum(u8),
    Text(String),
    Array(Vec<Value>),
    Dict(Vec<(Value, Value)>),
    Struct(Box<Record>),
    Variant(Box<Variant>),
}

impl Value {
    pub fn text(value: impl Into<String>) -> Self {
        Value::Text(value.into())
    }

    pub fn record(record: Record) -> Self {
        Value::Struct(Box::new(record))
    }

    pub fn variant(tag: u32, record: Record) -> Self {
        Value::Variant(Box::new(Variant { tag, record }))
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int8(_) => "int8",
            Value::UInt8(_) => "uint8",
            Value::Int16(_) => "int16",
            Value::UInt16(_) => "uint16",
            Value::Int32(_) => "int32",
            Value::UInt32(_) => "uint32",
            Value::Int64(_) => "int64",
            Value::Float32(_) => "float32",
            Value::Float64(_) => "float64",
            Value::Uuid(_) => "uuid",
            Value::Enum(_) => "enum",
            Value::Text(_) => "text",
            Value::Array(_) => "array",
            Value::Dict(_) => "dict",
            Value::Struct(_) => "struct",
            Value::Variant(_) => "variant",
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::Int32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Struct(record) => Some(record),
            _ => None,
        }
    }

    pub fn as_variant(&self) -> Option<&Variant> {
        match self {
            Value::Variant(variant) => Some(variant),
            _ => None,
        }
    }
}

macro_rules! impl_from_scalar {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

impl_from_scalar! {
    bool => Bool,
    i8 => Int8,
    u8 => UInt8,
    i16 => Int16,
    u16 => UInt16,
    i32 => Int32,
    u32 => UInt32,
    i64 => Int64,
    f32 => Float32,
    f64 => Float64,
    String => Text,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_owned())
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        Value::record(record)
    }
}

impl From<Variant> for Value {
    fn from(variant: Variant) -> Self {
        Value::Variant(Box::new(variant))
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int8(a), Value::Int8(b)) => a == b,
            (Value::UInt8(a), Value::UInt8(b)) => a == b,
            (Value::Int16(a), Value::Int16(b)) => a == b,
            (Value::UInt16(a), Value::UInt16(b)) => a == b,
            (Value::Int32(a), Value::Int32(b)) => a == b,
            (Value::UInt32(a), Value::UInt32(b)) => a == b,
            (Value::Int64(a), Value::Int64(b)) => a == b,
            (Value::Float32(a), Value::Float32(b)) => a.to_bits() == b.to_bits(),
            (Value::Float64(a), Value::Float64(b)) => a.to_bits() == b.to_bits(),
            (Value::Uuid(a), Value::Uuid(b)) => a == b,
            (Value::Enum(a), Value::Enum(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Dict(a), Value::Dict(b)) => dict_eq(a, b),
            (Value::Struct(a), Value::Struct(b)) => a == b,
            (Value::Variant(a), Value::Variant(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

fn dict_eq(a: &[(Value, Value)], b: &[(Value, Value)]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let lookup: HashMap<&Value, &Value> = b.iter().map(|(k, v)| (k, v)).collect();
    lookup.len() == b.len() && a.iter().all(|(k, v)| lookup.get(k) == Some(&v))
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Bool(v) => v.hash(state),
            Value::Int8(v) => v.hash(state),
            Value::UInt8(v) => v.hash(state),
            Value::Int16(v) => v.hash(state),
            Value::UInt16(v) => v.hash(state),
            Value::Int32(v) => v.hash(state),
            Value::UInt32(v) => v.hash(state),
            Value::Int64(v) => v.hash(state),
            Value::Float32(v) => v.to_bits().hash(state),
            Value::Float64(v) => v.to_bits().hash(state),
            Value::Uuid(v) => v.hash(state),
            Value::Enum(v) => v.hash(state),
            Value::Text(v) => v.hash(state),
            Value::Array(v) => v.hash(state),
            Value::Dict(entries) => {
                // entry order must not change the hash
                let mut combined = 0u64;
                for (k, v) in entries {
                    let mut entry = DefaultHasher::new();
                    k.hash(&mut entry);
                    v.hash(&mut entry);
                    combined = combined.wrapping_add(entry.finish());
                }
                entries.len().hash(state);
                combined.hash(state);
            }
            Value::Struct(v) => v.hash(state),
            Value::Variant(v) => v.hash(state),
        }
    }
}

/// One decoded or application-built record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Record {
    struct_id: StructId,
    fields: Vec<Option<Value>>,
}

impl Record {
    pub fn from_fields(struct_id: StructId, fields: Vec<Option<Value>>) -> Self {
        Self { struct_id, fields }
    }

    pub fn struct_id(&self) -> StructId {
        self.struct_id
    }

    pub fn fields(&self) -> &[Option<Value>] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&Value> {
        self.fields.get(idx).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, idx: usize) -> Option<&mut Option<Value>> {
        self.fields.get_mut(idx)
    }

    pub fn is_present(&self, idx: usize) -> bool {
        self.get(idx).is_some()
    }
}

/// A polymorphic value: the family tag and the concrete variant record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Variant {
    pub tag: u32,
    pub record: Record,
}
