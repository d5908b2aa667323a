//! # Pre-Serialized Packets
//!
//! A [`CachedPacket`] holds a packet's bytes encoded once and shared by every
//! connection it is sent to. Each connection owns a handle; the buffer lives
//! until the last handle is released.
//!
//! ## Reference Counting
//!
//! ```text
//!   cache()          share()          share()
//!     │                │                │
//!     ▼                ▼                ▼
//!  handle A ──┐     handle B ──┐     handle C ──┐
//!             ├── SharedPayload { refs: 3, bytes: Some(..) }
//!  release()  │     release()         release()
//!   refs 2    │      refs 1            refs 0 → bytes freed
//! ```
//!
//! - `refs` is an `AtomicUsize`; `share()` increments it with a
//!   compare-and-swap loop that refuses to move it off zero, so a freed
//!   buffer is never revived.
//! - Each handle releases its count at most once: explicitly through
//!   `release()` or implicitly on drop.
//! - The handle that takes `refs` to zero frees the buffer, exactly once.
//! - The buffer sits behind a `parking_lot::Mutex`, taken only to copy it out
//!   or to free it.
//!
//! Writing through a released handle, or after the buffer was freed, fails
//! with `IllegalState`.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use eyre::{bail, ensure, Result};
use parking_lot::Mutex;

use crate::error::ProtocolError;
use crate::packet::Packet;
use crate::stats::{bump, CACHED_CREATED, CACHED_FREED};

#[derive(Debug)]
struct SharedPayload {
    refs: AtomicUsize,
    len: usize,
    bytes: Mutex<Option<Box<[u8]>>>,
}

#[derive(Debug)]
pub struct CachedPacket {
    packet_id: u32,
    payload: Arc<SharedPayload>,
    held: AtomicBool,
}

impl CachedPacket {
    /// Encodes `packet` once. The returned handle holds the only reference.
    pub fn cache(packet: &dyn Packet) -> Result<Self> {
        ensure!(
            !packet.is_cached(),
            ProtocolError::IllegalArgument("packet is already pre-serialized".to_string())
        );

        // claimed only after a successful encode
        let mut bytes = Vec::with_capacity(packet.compute_size()?);
        packet.serialize(&mut bytes)?;
        ensure!(
            packet.claim_for_cache(),
            ProtocolError::IllegalArgument(format!(
                "packet {} was already cached",
                packet.packet_id()
            ))
        );
        bump(&CACHED_CREATED, 1);

        Ok(Self {
            packet_id: packet.packet_id(),
            payload: Arc::new(SharedPayload {
                refs: AtomicUsize::new(1),
                len: bytes.len(),
                bytes: Mutex::new(Some(bytes.into_boxed_slice())),
            }),
            held: AtomicBool::new(true),
        })
    }

    /// Another handle to the same buffer, for one more recipient.
    pub fn share(&self) -> Result<Self> {
        self.ensure_held()?;

        let refs = &self.payload.refs;
        let mut current = refs.load(Ordering::Acquire);
        loop {
            if current == 0 {
                bail!(freed());
            }
            match refs.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }

        Ok(Self {
            packet_id: self.packet_id,
            payload: Arc::clone(&self.payload),
            held: AtomicBool::new(true),
        })
    }

    /// Gives up this handle's reference. Returns `true` when this call freed
    /// the buffer.
    pub fn release(&self) -> Result<bool> {
        ensure!(
            self.held.swap(false, Ordering::AcqRel),
            ProtocolError::IllegalState("cached packet handle already released".to_string())
        );
        Ok(self.drop_ref())
    }

    fn drop_ref(&self) -> bool {
        if self.payload.refs.fetch_sub(1, Ordering::AcqRel) != 1 {
            return false;
        }
        let freed = self.payload.bytes.lock().take();
        if freed.is_some() {
            bump(&CACHED_FREED, 1);
        }
        true
    }

    pub fn ref_count(&self) -> usize {
        self.payload.refs.load(Ordering::Acquire)
    }

    pub fn is_freed(&self) -> bool {
        self.payload.bytes.lock().is_none()
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }

    fn ensure_held(&self) -> Result<()> {
        ensure!(
            self.is_held(),
            ProtocolError::IllegalState("cached packet handle already released".to_string())
        );
        Ok(())
    }
}

fn freed() -> ProtocolError {
    ProtocolError::IllegalState("cached packet buffer already freed".to_string())
}

impl Packet for CachedPacket {
    fn packet_id(&self) -> u32 {
        self.packet_id
    }

    fn serialize(&self, out: &mut Vec<u8>) -> Result<()> {
        self.ensure_held()?;
        match self.payload.bytes.lock().as_deref() {
            Some(bytes) => {
                out.extend_from_slice(bytes);
                Ok(())
            }
            None => bail!(freed()),
        }
    }

    fn compute_size(&self) -> Result<usize> {
        self.ensure_held()?;
        ensure!(!self.is_freed(), freed());
        Ok(self.payload.len)
    }

    fn is_cached(&self) -> bool {
        true
    }

    fn claim_for_cache(&self) -> bool {
        false
    }
}

impl Drop for CachedPacket {
    fn drop(&mut self) {
        if std::mem::replace(self.held.get_mut(), false) {
            self.drop_ref();
        }
    }
}
