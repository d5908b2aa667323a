//! # proxywire Wire Format Constants
//!
//! Centralizes the limits every record type shares. Per-field maxima declared
//! in a schema may only tighten these, never loosen them.
//!
//! ## Dependency Graph
//!
//! ```text
//! MAX_COLLECTION_LEN (4,096,000)
//!       │
//!       ├─> string byte length, array count, dictionary count (one ceiling)
//!       │
//!       └─> must be <= i32::MAX: lengths travel as VarInts but are
//!           interpreted as signed 32-bit by peers
//!
//! MAX_PACKET_SIZE (0x6400_0000)
//!       │
//!       ├─> caps every computed per-record MAX_SIZE
//!       │
//!       └─> must be <= i32::MAX: offsets into the variable block are i32
//!
//! OFFSET_SLOT_SIZE (4)
//!       │
//!       └─> one little-endian i32 per variable field, ABSENT_OFFSET = -1
//!
//! MAX_VARINT_LEN (5)
//!       └─> ceil(32 / 7); a sixth byte is always malformed
//! ```

// ============================================================================
// LENGTH CEILINGS
// Shared by strings, arrays and dictionaries of every record type
// ============================================================================

/// Shared ceiling for a string's byte length, an array's element count and a
/// dictionary's entry count.
pub const MAX_COLLECTION_LEN: usize = 4_096_000;

/// Upper bound on any single serialized packet payload.
pub const MAX_PACKET_SIZE: usize = 0x6400_0000;

const _: () = assert!(
    MAX_COLLECTION_LEN <= i32::MAX as usize,
    "MAX_COLLECTION_LEN must fit a signed 32-bit length"
);

const _: () = assert!(
    MAX_PACKET_SIZE <= i32::MAX as usize,
    "MAX_PACKET_SIZE must be addressable by an i32 offset slot"
);

const _: () = assert!(
    MAX_COLLECTION_LEN <= MAX_PACKET_SIZE,
    "a single collection cannot exceed a whole packet"
);

// ============================================================================
// RECORD LAYOUT
// ============================================================================

/// Width of one offset-table slot.
pub const OFFSET_SLOT_SIZE: usize = 4;

/// Offset slot sentinel for an absent variable field.
pub const ABSENT_OFFSET: i32 = -1;

/// Bits per nullable-bitmask byte.
pub const NULL_BITS_PER_BYTE: usize = 8;

/// Maximum record nesting depth accepted by encode, decode and validation.
/// Recursive types (expression trees) are bounded by this rather than by
/// stack size.
pub const MAX_NESTING_DEPTH: usize = 64;

/// Largest number of values a one-byte enum field can index.
pub const MAX_ENUM_VARIANTS: usize = 256;

// ============================================================================
// PRIMITIVE SIZES
// ============================================================================

/// Maximum encoded length of a 32-bit VarInt.
pub const MAX_VARINT_LEN: usize = 5;

/// Encoded size of a UUID: two 64-bit halves.
pub const UUID_SIZE: usize = 16;

const _: () = assert!(
    MAX_VARINT_LEN * 7 >= 32 && (MAX_VARINT_LEN - 1) * 7 < 32,
    "MAX_VARINT_LEN must be the minimum group count for 32 bits"
);

const _: () = assert!(
    OFFSET_SLOT_SIZE == std::mem::size_of::<i32>(),
    "offset slots hold one i32"
);
