//! # proxywire - Game Proxy Wire Codec
//!
//! proxywire is the binary codec underneath a game network proxy. Every
//! message type shares one record layout and one bounds-safe validation
//! discipline, so a proxy can inspect, rewrite and forward packets without
//! trusting a single length or offset it reads.
//!
//! - **Hybrid record layout**: nullable bitmask, static fixed fields, a
//!   relative offset table and a variable block
//! - **Validate, then decode**: a structural validator certifies untrusted
//!   bytes before the decoder touches them
//! - **Encode once, send many**: pre-serialized, reference-counted packets for
//!   broadcast traffic
//!
//! ## Quick Start
//!
//! ```ignore
//! use proxywire::protocol;
//!
//! let registry = protocol::default_registry()?;
//! let catalog = registry.catalog();
//!
//! let mut chat = catalog.builder_for("ChatMessage")?;
//! chat.set("message", "hello")?;
//! let packet = registry.bind(chat.build())?;
//!
//! let mut payload = Vec::new();
//! registry.write_packet(&packet, &mut payload)?;
//!
//! let record = registry.decode(protocol::CHAT_MESSAGE, &payload)?;
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │   Packet Registry (id → record)      │
//! ├─────────────────────────────────────┤
//! │   Packets: Bound │ Cached (shared)   │
//! ├─────────────────────────────────────┤
//! │   Validator │ Record Layout Engine   │
//! ├─────────────────────────────────────┤
//! │   Arrays, Dictionaries, Polymorphic  │
//! ├─────────────────────────────────────┤
//! │   VarInt │ Primitives │ Strings      │
//! └─────────────────────────────────────┘
//! ```
//!
//! ## Module Overview
//!
//! - [`config`]: ceilings and layout constants
//! - [`error`]: `ProtocolError` kinds and report helpers
//! - [`encoding`]: VarInt, little-endian primitives, strings
//! - [`records`]: catalog, layouts, values, codec and validator
//! - [`packet`]: `Packet` trait, bound and cached packets
//! - [`registry`]: packet ID dispatch
//! - [`stats`]: process-wide codec counters and per-packet size statistics
//! - [`protocol`]: sample message catalogue

pub mod config;
pub mod encoding;
pub mod error;
pub mod packet;
pub mod protocol;
pub mod records;
pub mod registry;
pub mod stats;

pub use error::ProtocolError;
pub use packet::{BoundPacket, CachedPacket, Packet};
pub use records::{
    Catalog, FamilyDef, FamilyId, FieldType, Record, RecordBuilder, StructDef, StructId, Value,
    Variant,
};
pub use registry::{PacketInfo, PacketRegistry, RegistryBuilder};
