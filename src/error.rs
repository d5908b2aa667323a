//! # Protocol Error Kinds
//!
//! Every failure the codec detects has a typed kind in [`ProtocolError`]. The
//! kinds are raised through `eyre` (`bail!`/`ensure!` with the error value) so
//! the typed error sits at the root of the report chain, while the record and
//! field path of the failure is attached as `wrap_err` context on the way out:
//!
//! ```text
//! Report
//!   ├─ "TagPattern.operands"   (context, outermost)
//!   ├─ "[2]"                   (context)
//!   ├─ "TagPattern.not"        (context)
//!   ├─ "TagPattern.kind"       (context)
//!   └─ ProtocolError::InvalidEnumValue { value: 9, variants: 4 }  (root)
//! ```
//!
//! Callers that need to branch on the kind use [`kind_of`]; logs and tests
//! that want the whole path use [`describe`].
//!
//! ## Policy
//!
//! | Path | Behavior |
//! |------|----------|
//! | `validate_structure` | returns the first failure; never panics |
//! | `deserialize` | fails loudly with the same kinds on unvalidated input |
//! | catalog / registry build | startup errors, process should not serve traffic |
//! | cached packet misuse | `IllegalArgument` / `IllegalState`, surfaced immediately |

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    MalformedVarInt { pos: usize },
    NegativeLength { len: i64 },
    StringTooLong { len: usize, max: usize },
    ArrayTooLong { count: usize, max: usize },
    DictionaryTooLarge { count: usize, max: usize },
    BufferTooSmall { needed: u64, available: usize },
    DuplicateKey,
    InvalidEnumValue { value: u8, variants: usize },
    UnknownVariantTag { family: String, tag: u32 },
    OffsetOutOfBounds { offset: i64, limit: usize },
    InvalidUtf8,
    InvalidAscii,
    NestingTooDeep { max: usize },
    MissingField { field: String },
    TypeMismatch { expected: &'static str },
    DuplicateVariantTag { family: String, tag: u32 },
    DuplicatePacketId { id: u32, name: String, existing: String },
    DuplicatePacketType { record: String, id: u32, existing: u32 },
    UnknownPacketId { id: u32 },
    PacketTooLarge { size: usize, max: usize },
    IllegalArgument(String),
    IllegalState(String),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::MalformedVarInt { pos } => {
                write!(f, "malformed varint at byte {}", pos)
            }
            ProtocolError::NegativeLength { len } => write!(f, "negative length {}", len),
            ProtocolError::StringTooLong { len, max } => {
                write!(f, "string of {} bytes exceeds max length {}", len, max)
            }
            ProtocolError::ArrayTooLong { count, max } => {
                write!(f, "array of {} elements exceeds max length {}", count, max)
            }
            ProtocolError::DictionaryTooLarge { count, max } => {
                write!(f, "dictionary of {} entries exceeds max size {}", count, max)
            }
            ProtocolError::BufferTooSmall { needed, available } => write!(
                f,
                "buffer too small: need {} bytes, {} readable",
                needed, available
            ),
            ProtocolError::DuplicateKey => write!(f, "duplicate dictionary key"),
            ProtocolError::InvalidEnumValue { value, variants } => write!(
                f,
                "enum value {} out of range for {} variants",
                value, variants
            ),
            ProtocolError::UnknownVariantTag { family, tag } => {
                write!(f, "unknown variant tag {} for '{}'", tag, family)
            }
            ProtocolError::OffsetOutOfBounds { offset, limit } => {
                write!(f, "offset {} out of bounds (limit {})", offset, limit)
            }
            ProtocolError::InvalidUtf8 => write!(f, "string is not valid UTF-8"),
            ProtocolError::InvalidAscii => write!(f, "string is not ASCII"),
            ProtocolError::NestingTooDeep { max } => {
                write!(f, "record nesting exceeds depth {}", max)
            }
            ProtocolError::MissingField { field } => {
                write!(f, "non-nullable field '{}' has no value", field)
            }
            ProtocolError::TypeMismatch { expected } => {
                write!(f, "value does not match field type, expected {}", expected)
            }
            ProtocolError::DuplicateVariantTag { family, tag } => {
                write!(f, "variant tag {} declared twice in '{}'", tag, family)
            }
            ProtocolError::DuplicatePacketId { id, name, existing } => write!(
                f,
                "duplicate packet ID {}: '{}' conflicts with '{}'",
                id, name, existing
            ),
            ProtocolError::DuplicatePacketType {
                record,
                id,
                existing,
            } => write!(
                f,
                "record '{}' registered as packet {} is already packet {}",
                record, id, existing
            ),
            ProtocolError::UnknownPacketId { id } => write!(f, "unknown packet ID {}", id),
            ProtocolError::PacketTooLarge { size, max } => {
                write!(f, "packet of {} bytes exceeds max size {}", size, max)
            }
            ProtocolError::IllegalArgument(msg) => write!(f, "illegal argument: {}", msg),
            ProtocolError::IllegalState(msg) => write!(f, "illegal state: {}", msg),
        }
    }
}

impl std::error::Error for ProtocolError {}

/// Returns the typed kind at the root of a report, if the failure came from the
/// codec rather than from a catalog description message.
pub fn kind_of(report: &eyre::Report) -> Option<&ProtocolError> {
    report
        .chain()
        .find_map(|cause| cause.downcast_ref::<ProtocolError>())
}

/// Renders the report chain outermost first, joined by `": "`.
pub fn describe(report: &eyre::Report) -> String {
    report
        .chain()
        .map(|cause| cause.to_string())
        .collect::<Vec<_>>()
        .join(": ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use eyre::{bail, Result, WrapErr};

    fn failing_leaf() -> Result<()> {
        bail!(ProtocolError::StringTooLong { len: 9, max: 8 })
    }

    #[test]
    fn kind_of_finds_root_kind_under_context() {
        let err = failing_leaf()
            .wrap_err("Connect.username")
            .unwrap_err();

        assert_eq!(
            kind_of(&err),
            Some(&ProtocolError::StringTooLong { len: 9, max: 8 })
        );
    }

    #[test]
    fn describe_joins_path_outermost_first() {
        let err = failing_leaf()
            .wrap_err("Inner.name")
            .wrap_err("Outer.inner")
            .unwrap_err();

        assert_eq!(
            describe(&err),
            "Outer.inner: Inner.name: string of 9 bytes exceeds max length 8"
        );
    }

    #[test]
    fn kind_of_plain_message_is_none() {
        let err = eyre::eyre!("struct 'Foo' already exists");
        assert!(kind_of(&err).is_none());
    }

    #[test]
    fn duplicate_packet_id_message_names_both_packets() {
        let err = ProtocolError::DuplicatePacketId {
            id: 5,
            name: "Pong".to_string(),
            existing: "Ping".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "duplicate packet ID 5: 'Pong' conflicts with 'Ping'"
        );
    }
}
