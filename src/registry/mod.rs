//! # Packet Registry
//!
//! Maps numeric packet IDs to record types so the proxy can dispatch inbound
//! payloads and stamp outbound ones. The registry is built once at startup
//! from a compiled [`Catalog`] and is immutable afterwards.
//!
//! ## Dispatch
//!
//! ```text
//! (id, payload)
//!     │
//!     ├─ unknown id ────────────────► UnknownPacketId
//!     ├─ payload.len() > max_size ──► PacketTooLarge
//!     ├─ validate(payload, 0) ──────► first structural failure
//!     └─ deserialize(payload, 0) ───► Record
//! ```
//!
//! `validate` and `deserialize` are stored per packet as shared closures over
//! the catalog, so a dispatcher can call them without knowing record types.
//!
//! ## Registration Rules
//!
//! | Conflict | Error |
//! |----------|-------|
//! | two packets under one ID | `DuplicatePacketId`, naming both |
//! | one record type under two IDs | `DuplicatePacketType` |
//! | explicit max size above `MAX_PACKET_SIZE` | `IllegalArgument` |
//!
//! All of these are startup errors.
//!
//! ## Statistics
//!
//! Each [`PacketInfo`] carries a [`PacketStatsEntry`]. `decode` records a
//! receive once the payload is decoded and `write_packet` records a send once
//! the payload is written. [`PacketRegistry::entry`] reads one ID and
//! [`PacketRegistry::packet_stats`] snapshots every ID that has seen traffic.
//!
//! ## Process-Wide Registry
//!
//! [`install`] publishes one registry for the whole process through a
//! `OnceLock`; [`global`] reads it without locking. Installing twice is
//! `IllegalState`.

use std::fmt;
use std::sync::{Arc, OnceLock};

use eyre::{bail, ensure, Result, WrapErr};
use hashbrown::HashMap;

use crate::config::MAX_PACKET_SIZE;
use crate::error::ProtocolError;
use crate::packet::{BoundPacket, Packet};
use crate::records::{Catalog, Record, StructId};
use crate::stats::{
    bump, PacketStats, PacketStatsEntry, BYTES_DECODED, BYTES_ENCODED, PACKETS_DECODED,
    PACKETS_ENCODED, PAYLOADS_REJECTED, PAYLOADS_VALIDATED,
};

pub type ValidateFn = Arc<dyn Fn(&[u8], usize) -> Result<()> + Send + Sync>;
pub type DeserializeFn = Arc<dyn Fn(&[u8], usize) -> Result<Record> + Send + Sync>;

#[derive(Clone)]
pub struct PacketInfo {
    pub id: u32,
    pub name: String,
    pub record: StructId,
    /// Bytes before the variable block: bitmask, fixed fields and offset slots.
    pub fixed_block_size: usize,
    pub max_size: usize,
    pub compressed: bool,
    pub stats: Arc<PacketStatsEntry>,
    pub validate: ValidateFn,
    pub deserialize: DeserializeFn,
}

impl fmt::Debug for PacketInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacketInfo")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("record", &self.record)
            .field("fixed_block_size", &self.fixed_block_size)
            .field("max_size", &self.max_size)
            .field("compressed", &self.compressed)
            .finish_non_exhaustive()
    }
}

pub struct RegistryBuilder {
    catalog: Arc<Catalog>,
    packets: Vec<PacketInfo>,
    by_id: HashMap<u32, usize>,
    by_record: HashMap<StructId, u32>,
}

impl RegistryBuilder {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self {
            catalog,
            packets: Vec::new(),
            by_id: HashMap::new(),
            by_record: HashMap::new(),
        }
    }

    /// Registers `record_name` under `id` with the max size computed by the
    /// catalog.
    pub fn register(self, id: u32, name: &str, record_name: &str, compressed: bool) -> Result<Self> {
        let record = self.catalog.require_struct(record_name)?;
        let max_size = self.catalog.layout(record)?.max_size();
        self.insert(id, name, record, max_size, compressed)
    }

    pub fn register_with_max_size(
        self,
        id: u32,
        name: &str,
        record_name: &str,
        compressed: bool,
        max_size: usize,
    ) -> Result<Self> {
        ensure!(
            max_size <= MAX_PACKET_SIZE,
            ProtocolError::IllegalArgument(format!(
                "max size {} of packet '{}' exceeds {}",
                max_size, name, MAX_PACKET_SIZE
            ))
        );
        let record = self.catalog.require_struct(record_name)?;
        self.insert(id, name, record, max_size, compressed)
    }

    fn insert(
        mut self,
        id: u32,
        name: &str,
        record: StructId,
        max_size: usize,
        compressed: bool,
    ) -> Result<Self> {
        if let Some(&idx) = self.by_id.get(&id) {
            bail!(ProtocolError::DuplicatePacketId {
                id,
                name: name.to_string(),
                existing: self.packets[idx].name.clone(),
            });
        }
        let layout = self.catalog.layout(record)?;
        if let Some(&existing) = self.by_record.get(&record) {
            bail!(ProtocolError::DuplicatePacketType {
                record: layout.name().to_string(),
                id,
                existing,
            });
        }
        let fixed_block_size = layout.variable_block_start();
        ensure!(
            max_size >= fixed_block_size,
            ProtocolError::IllegalArgument(format!(
                "max size {} of packet '{}' is below its fixed block of {} bytes",
                max_size, name, fixed_block_size
            ))
        );

        let catalog = Arc::clone(&self.catalog);
        let validate: ValidateFn = Arc::new(move |buf: &[u8], offset: usize| {
            catalog.validate_structure(record, buf, offset)
        });
        let catalog = Arc::clone(&self.catalog);
        let deserialize: DeserializeFn = Arc::new(move |buf: &[u8], offset: usize| {
            catalog.deserialize(record, buf, offset)
        });

        self.by_id.insert(id, self.packets.len());
        self.by_record.insert(record, id);
        self.packets.push(PacketInfo {
            id,
            name: name.to_string(),
            record,
            fixed_block_size,
            max_size,
            compressed,
            stats: Arc::new(PacketStatsEntry::new(id, name)),
            validate,
            deserialize,
        });
        Ok(self)
    }

    pub fn build(mut self) -> PacketRegistry {
        self.packets.sort_by_key(|info| info.id);
        let by_id = self
            .packets
            .iter()
            .enumerate()
            .map(|(idx, info)| (info.id, idx))
            .collect();
        PacketRegistry {
            catalog: self.catalog,
            packets: self.packets,
            by_id,
            by_record: self.by_record,
        }
    }
}

pub struct PacketRegistry {
    catalog: Arc<Catalog>,
    packets: Vec<PacketInfo>,
    by_id: HashMap<u32, usize>,
    by_record: HashMap<StructId, u32>,
}

impl PacketRegistry {
    pub fn builder(catalog: Arc<Catalog>) -> RegistryBuilder {
        RegistryBuilder::new(catalog)
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn get(&self, id: u32) -> Option<&PacketInfo> {
        self.packets.get(*self.by_id.get(&id)?)
    }

    pub fn id_of(&self, record: StructId) -> Option<u32> {
        self.by_record.get(&record).copied()
    }

    pub fn info_for(&self, record: StructId) -> Option<&PacketInfo> {
        self.get(self.id_of(record)?)
    }

    /// Every registered packet, by ascending ID.
    pub fn all(&self) -> &[PacketInfo] {
        &self.packets
    }

    pub fn entry(&self, id: u32) -> Option<&PacketStatsEntry> {
        self.get(id).map(|info| info.stats.as_ref())
    }

    /// Snapshots of every packet that has been sent or received, by ID.
    pub fn packet_stats(&self) -> Vec<PacketStats> {
        self.packets
            .iter()
            .map(|info| info.stats.snapshot())
            .filter(PacketStats::has_data)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    fn require(&self, id: u32) -> Result<&PacketInfo> {
        match self.get(id) {
            Some(info) => Ok(info),
            None => bail!(ProtocolError::UnknownPacketId { id }),
        }
    }

    /// Validates then decodes an inbound payload.
    pub fn decode(&self, id: u32, payload: &[u8]) -> Result<Record> {
        let info = self.require(id)?;
        let checked = check_payload_size(info, payload.len())
            .and_then(|_| (info.validate)(payload, 0))
            .wrap_err_with(|| format!("packet {} ({})", info.id, info.name));
        if let Err(err) = checked {
            bump(&PAYLOADS_REJECTED, 1);
            return Err(err);
        }
        bump(&PAYLOADS_VALIDATED, 1);

        let record = (info.deserialize)(payload, 0)
            .wrap_err_with(|| format!("packet {} ({})", info.id, info.name))?;
        bump(&PACKETS_DECODED, 1);
        bump(&BYTES_DECODED, payload.len() as u64);
        info.stats.record_received(payload.len());
        Ok(record)
    }

    /// Binds a record to the ID its type is registered under.
    pub fn bind(&self, record: Record) -> Result<BoundPacket> {
        let Some(id) = self.id_of(record.struct_id()) else {
            let name = self.catalog.layout(record.struct_id())?.name().to_string();
            bail!(ProtocolError::IllegalArgument(format!(
                "record type '{}' is not registered as a packet",
                name
            )));
        };
        Ok(BoundPacket::new(id, Arc::clone(&self.catalog), record))
    }

    /// Appends an outbound packet's payload, enforcing its max size.
    pub fn write_packet(&self, packet: &dyn Packet, out: &mut Vec<u8>) -> Result<()> {
        let info = self.require(packet.packet_id())?;
        let size = packet.compute_size()?;
        check_payload_size(info, size)?;

        let start = out.len();
        packet.serialize(out)?;
        let written = out.len() - start;
        bump(&PACKETS_ENCODED, 1);
        bump(&BYTES_ENCODED, written as u64);
        info.stats.record_sent(written);
        Ok(())
    }
}

fn check_payload_size(info: &PacketInfo, size: usize) -> Result<()> {
    ensure!(
        size <= info.max_size,
        ProtocolError::PacketTooLarge {
            size,
            max: info.max_size,
        }
    );
    Ok(())
}

static GLOBAL: OnceLock<PacketRegistry> = OnceLock::new();

/// Publishes `registry` process-wide. Only the first call succeeds.
pub fn install(registry: PacketRegistry) -> Result<&'static PacketRegistry> {
    if GLOBAL.set(registry).is_err() {
        bail!(ProtocolError::IllegalState(
            "packet registry already installed".to_string()
        ));
    }
    global()
}

pub fn global() -> Result<&'static PacketRegistry> {
    match GLOBAL.get() {
        Some(registry) => Ok(registry),
        None => bail!(ProtocolError::IllegalState(
            "packet registry not installed".to_string()
        )),
    }
}
