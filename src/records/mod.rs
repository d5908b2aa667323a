//! # Record Codec
//!
//! Schema-driven encoding of packet records. A [`Catalog`] compiles struct
//! and family descriptions into layouts once; afterwards every encode,
//! decode, size computation and validation is a walk over those layouts.
//!
//! ## Record Binary Layout
//!
//! ```text
//! +------------------+------------------+------------------+------------------+
//! | Null Bitmap      | Fixed Fields     | Offset Table     | Variable Block   |
//! | [u8; (N+7)/8]    | static offsets   | [i32 LE; V]      | payloads         |
//! +------------------+------------------+------------------+------------------+
//! ```
//!
//! | Component | Type | Description |
//! |-----------|------|-------------|
//! | **Null Bitmap** | `[u8; (N+7)/8]` | 1 bit per nullable field. `1` = present, `0` = absent |
//! | **Fixed Fields** | static | Primitives and fixed-size nested structs, in declaration order |
//! | **Offset Table** | `[i32; V]` | One slot per variable field, relative to the variable block, `-1` when absent |
//! | **Variable Block** | `[u8; ...]` | Strings, collections, variable structs and polymorphic values |
//!
//! ## Module Structure
//!
//! - `types`: FieldType, FieldDef, StructDef and FamilyDef descriptions
//! - `schema`: Catalog with compiled StructLayout and FamilyLayout
//! - `value`: Value, Record and Variant
//! - `layout`: serialize, deserialize, compute_size, compute_bytes_consumed
//! - `collection`: array and dictionary codecs
//! - `polymorphic`: tagged variant codec
//! - `validate`: structural validation of untrusted input
//! - `builder`: RecordBuilder for construction by field name

pub mod builder;
mod collection;
pub mod layout;
pub mod polymorphic;
pub mod schema;
pub mod types;
pub mod validate;
pub mod value;


pub use builder::RecordBuilder;
pub use schema::{
    Catalog, CatalogBuilder, FamilyId, FamilyLayout, FieldKind, FieldLayout, Placement, StructId,
    StructLayout,
};
pub use types::{FamilyDef, FieldDef, FieldType, StructDef};
pub use value::{Record, Value, Variant};
