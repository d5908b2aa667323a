//! # Sample Protocol Catalogue
//!
//! A small set of message types that exercises every part of the record
//! codec: fixed-length ASCII, per-field maxima, nullable fixed and variable
//! fields, enums, inline fixed structs, recursion, dictionaries with float
//! keys and a five-variant polymorphic family. Tests, benches and fuzz
//! targets share it.
//!
//! ## Packets
//!
//! | ID | Name | Record | Exercises |
//! |----|------|--------|-----------|
//! | 0 | Connect | `Connect` | fixed and variable ASCII, uuid, enum, 5 variable fields, nested struct |
//! | 1 | Disconnect | `Disconnect` | nullable string, enum |
//! | 2 | Ping | `Ping` | all-fixed record |
//! | 3 | Pong | `Pong` | all-fixed record |
//! | 211 | ChatMessage | `ChatMessage` | single nullable string |
//! | 300 | TagPatternUpdate | `TagPattern` | self-recursion through array and struct |
//! | 301 | SelectorUpdate | `SelectorUpdate` | polymorphic `Selector` family |
//! | 302 | CloudUpdate | `Cloud` | dictionaries keyed by float |
//!
//! ## Layout Reference
//!
//! ```text
//! Connect     bitmask(1) hash(64) client_type(1) uuid(16) | 5 slots | variable
//!             FIXED_BLOCK_SIZE = 102
//! TagPattern  bitmask(1) type(1) tag_index(4) | 2 slots | variable
//!             FIXED_BLOCK_SIZE = 14
//! Cloud       bitmask(1) | 3 slots | variable
//!             FIXED_BLOCK_SIZE = 13
//! ```

use std::sync::Arc;

use eyre::Result;

use crate::records::{Catalog, FamilyDef, FieldType, StructDef};
use crate::registry::PacketRegistry;

pub const CONNECT: u32 = 0;
pub const DISCONNECT: u32 = 1;
pub const PING: u32 = 2;
pub const PONG: u32 = 3;
pub const CHAT_MESSAGE: u32 = 211;
pub const TAG_PATTERN_UPDATE: u32 = 300;
pub const SELECTOR_UPDATE: u32 = 301;
pub const CLOUD_UPDATE: u32 = 302;

/// Variant tags of the `Selector` family.
pub mod selector {
    pub const AOE_CIRCLE: u32 = 0;
    pub const AOE_CYLINDER: u32 = 1;
    pub const RAYCAST: u32 = 2;
    pub const HORIZONTAL: u32 = 3;
    pub const STAB: u32 = 4;
}

fn floats(def: StructDef, names: &[&str]) -> StructDef {
    names
        .iter()
        .fold(def, |def, name| def.field(*name, FieldType::Float32))
}

fn connection_structs() -> Vec<StructDef> {
    vec![
        StructDef::new("HostAddress")
            .field("host", FieldType::string_max(256))
            .field("port", FieldType::Int16),
        StructDef::new("Connect")
            .field("protocol_hash", FieldType::FixedAscii { len: 64 })
            .field("client_type", FieldType::enumeration("ClientType", 2))
            .optional("language", FieldType::ascii_max(128))
            .optional("identity_token", FieldType::string_max(8192))
            .field("uuid", FieldType::Uuid)
            .field("username", FieldType::ascii_max(16))
            .optional("referral_data", FieldType::array_max(FieldType::Int8, 4096))
            .optional("referral_source", FieldType::record("HostAddress")),
        StructDef::new("Disconnect")
            .optional("reason", FieldType::string())
            .field("disconnect_type", FieldType::enumeration("DisconnectType", 2)),
        StructDef::new("Ping")
            .field("id", FieldType::Int32)
            .field("sent_at", FieldType::Int64),
        StructDef::new("Pong")
            .field("id", FieldType::Int32)
            .field("sent_at", FieldType::Int64)
            .field("received_at", FieldType::Int64),
        StructDef::new("ChatMessage").optional("message", FieldType::string()),
    ]
}

fn world_structs() -> Vec<StructDef> {
    vec![
        StructDef::new("TagPattern")
            .field("type", FieldType::enumeration("TagPatternType", 4))
            .field("tag_index", FieldType::Int32)
            .optional("operands", FieldType::array(FieldType::record("TagPattern")))
            .optional("not", FieldType::record("TagPattern")),
        floats(StructDef::new("Vector3f"), &["x", "y", "z"]),
        floats(StructDef::new("AOECircleSelector"), &["range"])
            .optional("offset", FieldType::record("Vector3f")),
        floats(StructDef::new("AOECylinderSelector"), &["range", "height"])
            .optional("offset", FieldType::record("Vector3f")),
        StructDef::new("RaycastSelector")
            .optional("offset", FieldType::record("Vector3f"))
            .field("distance", FieldType::Int32)
            .optional("block_tag", FieldType::string_max(64))
            .field("ignore_fluids", FieldType::Bool)
            .field("ignore_empty_collision_material", FieldType::Bool),
        floats(
            StructDef::new("HorizontalSelector"),
            &[
                "extend_top",
                "extend_bottom",
                "yaw_length",
                "yaw_start_offset",
                "pitch_offset",
                "roll_offset",
                "start_distance",
                "end_distance",
            ],
        )
        .field("direction", FieldType::enumeration("HorizontalDirection", 2))
        .field("test_line_of_sight", FieldType::Bool),
        floats(
            StructDef::new("StabSelector"),
            &[
                "extend_top",
                "extend_bottom",
                "extend_left",
                "extend_right",
                "yaw_offset",
                "pitch_offset",
                "roll_offset",
                "start_distance",
                "end_distance",
            ],
        )
        .field("test_line_of_sight", FieldType::Bool),
        StructDef::new("SelectorUpdate")
            .field("entity_id", FieldType::Int32)
            .field("selector", FieldType::polymorphic("Selector"))
            .optional("filter", FieldType::record("TagPattern")),
        StructDef::new("ColorAlpha")
            .field("alpha", FieldType::Int8)
            .field("red", FieldType::Int8)
            .field("green", FieldType::Int8)
            .field("blue", FieldType::Int8),
        StructDef::new("Cloud")
            .optional("texture", FieldType::string())
            .optional("speeds", FieldType::dict(FieldType::Float32, FieldType::Float32))
            .optional(
                "colors",
                FieldType::dict(FieldType::Float32, FieldType::record("ColorAlpha")),
            ),
    ]
}

/// Compiles the sample catalogue.
pub fn catalog() -> Result<Catalog> {
    let structs = connection_structs().into_iter().chain(world_structs());
    structs
        .fold(Catalog::builder(), |builder, def| builder.with_struct(def))
        .with_family(
            FamilyDef::new("Selector")
                .variant(selector::AOE_CIRCLE, "AOECircleSelector")
                .variant(selector::AOE_CYLINDER, "AOECylinderSelector")
                .variant(selector::RAYCAST, "RaycastSelector")
                .variant(selector::HORIZONTAL, "HorizontalSelector")
                .variant(selector::STAB, "StabSelector"),
        )
        .build()
}

/// Registers every sample packet against a freshly compiled catalogue.
pub fn default_registry() -> Result<PacketRegistry> {
    let registry = PacketRegistry::builder(Arc::new(catalog()?))
        .register(CONNECT, "Connect", "Connect", false)?
        .register(DISCONNECT, "Disconnect", "Disconnect", false)?
        .register(PING, "Ping", "Ping", false)?
        .register(PONG, "Pong", "Pong", false)?
        .register(CHAT_MESSAGE, "ChatMessage", "ChatMessage", false)?
        .register(TAG_PATTERN_UPDATE, "TagPatternUpdate", "TagPattern", false)?
        .register(SELECTOR_UPDATE, "SelectorUpdate", "SelectorUpdate", false)?
        .register(CLOUD_UPDATE, "CloudUpdate", "Cloud", true)?
        .build();
    Ok(registry)
}
