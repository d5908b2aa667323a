//! # Codec Statistics
//!
//! Process-wide counters for the packet paths, cheap enough to stay enabled
//! in production builds.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Codec Statistics                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  PAYLOADS_VALIDATED  │  inbound payloads that passed         │
//! │  PAYLOADS_REJECTED   │  inbound payloads that failed         │
//! │  PACKETS_DECODED     │  records built from inbound payloads  │
//! │  BYTES_DECODED       │  payload bytes decoded                │
//! │  PACKETS_ENCODED     │  outbound packets written             │
//! │  BYTES_ENCODED       │  outbound bytes written               │
//! │  CACHED_CREATED      │  pre-serialized buffers created       │
//! │  CACHED_FREED        │  pre-serialized buffers freed         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each counter is an `AtomicU64` updated with Relaxed ordering: lock-free
//! from any thread, approximate across threads, exact once the threads that
//! updated it have been joined.
//!
//! ## Per-Packet Statistics
//!
//! Every registered packet also owns a [`PacketStatsEntry`] keyed by its ID.
//! Decoding records a receive and `write_packet` records a send, each with
//! the uncompressed payload size:
//!
//! | Direction | Tracked |
//! |-----------|---------|
//! | sent | count, total bytes, min, max |
//! | received | count, total bytes, min, max |
//!
//! Entries use the same Relaxed atomics as the process-wide counters.
//! [`PacketStatsEntry::snapshot`] copies one into a plain [`PacketStats`].
//!
//! ## Usage
//!
//! ```ignore
//! use proxywire::stats::{codec_stats, reset_codec_stats};
//!
//! reset_codec_stats();
//! for (id, payload) in inbound {
//!     registry.decode(id, payload)?;
//! }
//! println!("{}", codec_stats());
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

pub(crate) static PAYLOADS_VALIDATED: AtomicU64 = AtomicU64::new(0);
pub(crate) static PAYLOADS_REJECTED: AtomicU64 = AtomicU64::new(0);
pub(crate) static PACKETS_DECODED: AtomicU64 = AtomicU64::new(0);
pub(crate) static BYTES_DECODED: AtomicU64 = AtomicU64::new(0);
pub(crate) static PACKETS_ENCODED: AtomicU64 = AtomicU64::new(0);
pub(crate) static BYTES_ENCODED: AtomicU64 = AtomicU64::new(0);
pub(crate) static CACHED_CREATED: AtomicU64 = AtomicU64::new(0);
pub(crate) static CACHED_FREED: AtomicU64 = AtomicU64::new(0);

#[inline]
pub(crate) fn bump(counter: &AtomicU64, by: u64) {
    counter.fetch_add(by, Ordering::Relaxed);
}

/// Snapshot of every counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CodecStats {
    pub payloads_validated: u64,
    pub payloads_rejected: u64,
    pub packets_decoded: u64,
    pub bytes_decoded: u64,
    pub packets_encoded: u64,
    pub bytes_encoded: u64,
    pub cached_created: u64,
    pub cached_freed: u64,
}

impl CodecStats {
    /// Cached buffers created but not yet freed.
    pub fn cached_live(&self) -> u64 {
        self.cached_created.saturating_sub(self.cached_freed)
    }
}

impl fmt::Display for CodecStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "validated={} rejected={} decoded={} ({} bytes) encoded={} ({} bytes) cached live={} created={}",
            self.payloads_validated,
            self.payloads_rejected,
            self.packets_decoded,
            self.bytes_decoded,
            self.packets_encoded,
            self.bytes_encoded,
            self.cached_live(),
            self.cached_created,
        )
    }
}

/// Size counters for one direction of one packet ID.
#[derive(Debug)]
struct DirectionCounters {
    count: AtomicU64,
    total: AtomicU64,
    min: AtomicU64,
    max: AtomicU64,
}

impl DirectionCounters {
    const fn new() -> Self {
        Self {
            count: AtomicU64::new(0),
            total: AtomicU64::new(0),
            min: AtomicU64::new(u64::MAX),
            max: AtomicU64::new(0),
        }
    }

    fn record(&self, size: u64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.total.fetch_add(size, Ordering::Relaxed);
        self.min.fetch_min(size, Ordering::Relaxed);
        self.max.fetch_max(size, Ordering::Relaxed);
    }

    fn snapshot(&self) -> DirectionStats {
        let count = self.count.load(Ordering::Relaxed);
        let min = self.min.load(Ordering::Relaxed);
        DirectionStats {
            count,
            total: self.total.load(Ordering::Relaxed),
            min: if min == u64::MAX { 0 } else { min },
            max: self.max.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) {
        self.count.store(0, Ordering::Relaxed);
        self.total.store(0, Ordering::Relaxed);
        self.min.store(u64::MAX, Ordering::Relaxed);
        self.max.store(0, Ordering::Relaxed);
    }
}

/// Uncompressed payload sizes seen in one direction.
///
/// `min` and `max` are 0 until the first packet is recorded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirectionStats {
    pub count: u64,
    pub total: u64,
    pub min: u64,
    pub max: u64,
}

impl DirectionStats {
    pub fn average(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total as f64 / self.count as f64
        }
    }
}

/// Live send and receive counters for one packet ID.
#[derive(Debug)]
pub struct PacketStatsEntry {
    id: u32,
    name: String,
    sent: DirectionCounters,
    received: DirectionCounters,
}

impl PacketStatsEntry {
    pub fn new(id: u32, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            sent: DirectionCounters::new(),
            received: DirectionCounters::new(),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn record_sent(&self, size: usize) {
        self.sent.record(size as u64);
    }

    pub fn record_received(&self, size: usize) {
        self.received.record(size as u64);
    }

    pub fn reset(&self) {
        self.sent.reset();
        self.received.reset();
    }

    pub fn snapshot(&self) -> PacketStats {
        PacketStats {
            id: self.id,
            name: self.name.clone(),
            sent: self.sent.snapshot(),
            received: self.received.snapshot(),
        }
    }
}

/// Point-in-time copy of a [`PacketStatsEntry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketStats {
    pub id: u32,
    pub name: String,
    pub sent: DirectionStats,
    pub received: DirectionStats,
}

impl PacketStats {
    pub fn has_data(&self) -> bool {
        self.sent.count > 0 || self.received.count > 0
    }
}

impl fmt::Display for PacketStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}): sent={} ({} bytes, {}..{}) received={} ({} bytes, {}..{})",
            self.name,
            self.id,
            self.sent.count,
            self.sent.total,
            self.sent.min,
            self.sent.max,
            self.received.count,
            self.received.total,
            self.received.min,
            self.received.max,
        )
    }
}

pub fn reset_codec_stats() {
    for counter in all_counters() {
        counter.store(0, Ordering::Relaxed);
    }
}

pub fn codec_stats() -> CodecStats {
    CodecStats {
        payloads_validated: PAYLOADS_VALIDATED.load(Ordering::Relaxed),
        payloads_rejected: PAYLOADS_REJECTED.load(Ordering::Relaxed),
        packets_decoded: PACKETS_DECODED.load(Ordering::Relaxed),
        bytes_decoded: BYTES_DECODED.load(Ordering::Relaxed),
        packets_encoded: PACKETS_ENCODED.load(Ordering::Relaxed),
        bytes_encoded: BYTES_ENCODED.load(Ordering::Relaxed),
        cached_created: CACHED_CREATED.load(Ordering::Relaxed),
        cached_freed: CACHED_FREED.load(Ordering::Relaxed),
    }
}

fn all_counters() -> [&'static AtomicU64; 8] {
    [
        &PAYLOADS_VALIDATED,
        &PAYLOADS_REJECTED,
        &PACKETS_DECODED,
        &BYTES_DECODED,
        &PACKETS_ENCODED,
        &BYTES_ENCODED,
        &CACHED_CREATED,
        &CACHED_FREED,
    ]
}
