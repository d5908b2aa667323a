//! # Outbound Packets
//!
//! Anything the proxy writes to a connection implements [`Packet`]: it knows
//! its packet ID, how many bytes it encodes to and how to append those bytes.
//!
//! | Type | Source of bytes |
//! |------|-----------------|
//! | [`BoundPacket`] | a [`Record`] encoded through its catalog on every write |
//! | [`CachedPacket`] | a buffer encoded once and copied on every write |
//!
//! Broadcast traffic encodes a `BoundPacket` once into a `CachedPacket` and
//! hands each recipient connection a shared handle. A packet can only be
//! claimed by a cache once; caching the result of a cache is rejected.

mod cached;

pub use cached::CachedPacket;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use eyre::Result;

use crate::records::{Catalog, Record};

pub trait Packet: Send + Sync {
    fn packet_id(&self) -> u32;

    /// Appends the payload bytes to `out`.
    fn serialize(&self, out: &mut Vec<u8>) -> Result<()>;

    fn compute_size(&self) -> Result<usize>;

    fn is_cached(&self) -> bool {
        false
    }

    /// Marks the packet as taken by a cache. Returns `false` if it already was.
    fn claim_for_cache(&self) -> bool {
        true
    }
}

/// A record bound to the packet ID it is sent under.
#[derive(Debug)]
pub struct BoundPacket {
    id: u32,
    catalog: Arc<Catalog>,
    record: Record,
    claimed: AtomicBool,
}

impl BoundPacket {
    pub fn new(id: u32, catalog: Arc<Catalog>, record: Record) -> Self {
        Self {
            id,
            catalog,
            record,
            claimed: AtomicBool::new(false),
        }
    }

    pub fn record(&self) -> &Record {
        &self.record
    }

    pub fn into_record(self) -> Record {
        self.record
    }
}

impl Packet for BoundPacket {
    fn packet_id(&self) -> u32 {
        self.id
    }

    fn serialize(&self, out: &mut Vec<u8>) -> Result<()> {
        self.catalog.serialize(&self.record, out)
    }

    fn compute_size(&self) -> Result<usize> {
        self.catalog.compute_size(&self.record)
    }

    fn claim_for_cache(&self) -> bool {
        !self.claimed.swap(true, Ordering::AcqRel)
    }
}
