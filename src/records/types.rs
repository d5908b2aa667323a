//! # Field Types and Schema Descriptions
//!
//! A record type is described to the [`Catalog`](super::Catalog) as a
//! [`StructDef`]: an ordered list of [`FieldDef`]s. Names of nested structs and
//! polymorphic families stay unresolved strings here; the catalog resolves them
//! when it compiles layouts.
//!
//! ## Type Categories
//!
//! | Category | Types | Storage |
//! |----------|-------|---------|
//! | **Fixed** | bool, int8..int64, float32/64, uuid, enum, fixed ascii | Static offset in the fixed block |
//! | **Variable** | string, ascii string, array, dict, polymorphic | Offset slot + variable block |
//! | **Either** | nested struct | Inline when the struct is fixed-size, else offset slot |
//!
//! ## Fixed-Width Type Sizes
//!
//! | Type | Size (bytes) |
//! |------|--------------|
//! | bool | 1 |
//! | int8 / uint8 | 1 |
//! | int16 / uint16 | 2 |
//! | int32 / uint32 | 4 |
//! | int64 | 8 |
//! | float32 | 4 |
//! | float64 | 8 |
//! | uuid | 16 |
//! | enum | 1 |
//! | fixed ascii | declared length |

use crate::config::{MAX_COLLECTION_LEN, UUID_SIZE};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    Bool,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    Float32,
    Float64,
    Uuid,
    Enum {
        name: String,
        variants: usize,
    },
    FixedAscii {
        len: usize,
    },
    String {
        max_len: usize,
    },
    /// VarInt-prefixed string restricted to 7-bit ASCII.
    VarAscii {
        max_len: usize,
    },
    Array {
        element: Box<FieldType>,
        max_count: usize,
    },
    Dict {
        key: Box<FieldType>,
        value: Box<FieldType>,
        max_count: usize,
    },
    Struct(String),
    Polymorphic(String),
}

impl FieldType {
    pub fn string() -> Self {
        FieldType::String {
            max_len: MAX_COLLECTION_LEN,
        }
    }

    pub fn string_max(max_len: usize) -> Self {
        FieldType::String { max_len }
    }

    pub fn ascii_max(max_len: usize) -> Self {
        FieldType::VarAscii { max_len }
    }

    pub fn array(element: FieldType) -> Self {
        Self::array_max(element, MAX_COLLECTION_LEN)
    }

    pub fn array_max(element: FieldType, max_count: usize) -> Self {
        FieldType::Array {
            element: Box::new(element),
            max_count,
        }
    }

    pub fn dict(key: FieldType, value: FieldType) -> Self {
        Self::dict_max(key, value, MAX_COLLECTION_LEN)
    }

    pub fn dict_max(key: FieldType, value: FieldType, max_count: usize) -> Self {
        FieldType::Dict {
            key: Box::new(key),
            value: Box::new(value),
            max_count,
        }
    }

    pub fn enumeration(name: impl Into<String>, variants: usize) -> Self {
        FieldType::Enum {
            name: name.into(),
            variants,
        }
    }

    pub fn record(name: impl Into<String>) -> Self {
        FieldType::Struct(name.into())
    }

    pub fn polymorphic(family: impl Into<String>) -> Self {
        FieldType::Polymorphic(family.into())
    }

    /// Size of a primitive kind. `None` for variable kinds and for nested
    /// structs, whose size depends on the catalog.
    pub fn primitive_size(&self) -> Option<usize> {
        match self {
            FieldType::Bool | FieldType::Int8 | FieldType::UInt8 | FieldType::Enum { .. } => {
                Some(1)
            }
            FieldType::Int16 | FieldType::UInt16 => Some(2),
            FieldType::Int32 | FieldType::UInt32 | FieldType::Float32 => Some(4),
            FieldType::Int64 | FieldType::Float64 => Some(8),
            FieldType::Uuid => Some(UUID_SIZE),
            FieldType::FixedAscii { len } => Some(*len),
            FieldType::String { .. }
            | FieldType::VarAscii { .. }
            | FieldType::Array { .. }
            | FieldType::Dict { .. }
            | FieldType::Struct(_)
            | FieldType::Polymorphic(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    pub name: String,
    pub ty: FieldType,
    pub nullable: bool,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
            nullable: false,
        }
    }

    pub fn nullable(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
            nullable: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructDef {
    pub name: String,
    pub fields: Vec<FieldDef>,
}

impl StructDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, name: impl Into<String>, ty: FieldType) -> Self {
        self.fields.push(FieldDef::new(name, ty));
        self
    }

    pub fn optional(mut self, name: impl Into<String>, ty: FieldType) -> Self {
        self.fields.push(FieldDef::nullable(name, ty));
        self
    }
}

/// A closed, numbered set of concrete struct types sharing one wire slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FamilyDef {
    pub name: String,
    pub variants: Vec<(u32, String)>,
}

impl FamilyDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            variants: Vec::new(),
        }
    }

    pub fn variant(mut self, tag: u32, record: impl Into<String>) -> Self {
        self.variants.push((tag, record.into()));
        self
    }
}
