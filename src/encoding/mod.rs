//! # Encoding Module
//!
//! Leaf codecs the record layer is built on:
//!
//! - **VarInt**: little-endian base-128 counts, lengths and variant tags
//! - **Primitives**: fixed-width little-endian values, UUIDs, fixed ASCII
//! - **Strings**: VarInt byte length followed by UTF-8

pub mod primitive;
pub mod string;
pub mod varint;

pub use primitive::{check_span, uuid_from_halves};
