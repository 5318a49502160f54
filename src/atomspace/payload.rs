//! Opaque per-atom payloads.
//!
//! The graph and attention core never interpret payloads. Downstream consumers
//! (inference, embeddings) park byte buffers on atoms through the
//! [`PayloadStore`] capability so the backing can be swapped out. Buffers are
//! shared as `Arc<[u8]>`; readers never copy them.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;

use crate::handle::Handle;

/// Storage capability for atom payloads.
pub trait PayloadStore: Send + Sync {
    /// Attach `payload` to `atom`, returning the buffer it replaces.
    fn attach(&self, atom: Handle, payload: Arc<[u8]>) -> Option<Arc<[u8]>>;

    fn payload(&self, atom: Handle) -> Option<Arc<[u8]>>;

    /// Drop the payload of `atom`, returning it.
    fn detach(&self, atom: Handle) -> Option<Arc<[u8]>>;

    /// Atoms carrying a payload.
    fn count(&self) -> usize;

    /// Bytes held across all payloads.
    fn total_bytes(&self) -> usize;
}

/// In-memory payloads on a sharded map, with a running byte total.
#[derive(Debug, Default)]
pub struct MemPayloadStore {
    payloads: DashMap<Handle, Arc<[u8]>>,
    bytes: AtomicUsize,
}

impl MemPayloadStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PayloadStore for MemPayloadStore {
    fn attach(&self, atom: Handle, payload: Arc<[u8]>) -> Option<Arc<[u8]>> {
        self.bytes.fetch_add(payload.len(), Ordering::Relaxed);
        let replaced = self.payloads.insert(atom, payload);
        if let Some(old) = &replaced {
            self.bytes.fetch_sub(old.len(), Ordering::Relaxed);
        }
        replaced
    }

    fn payload(&self, atom: Handle) -> Option<Arc<[u8]>> {
        self.payloads.get(&atom).map(|p| Arc::clone(p.value()))
    }

    fn detach(&self, atom: Handle) -> Option<Arc<[u8]>> {
        let (_, old) = self.payloads.remove(&atom)?;
        self.bytes.fetch_sub(old.len(), Ordering::Relaxed);
        Some(old)
    }

    fn count(&self) -> usize {
        self.payloads.len()
    }

    fn total_bytes(&self) -> usize {
        self.bytes.load(Ordering::Relaxed)
    }
}
