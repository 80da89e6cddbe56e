//! Shared plumbing behind lazily decoded views.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use crate::cache::DecodeCache;
use crate::error::{Error, Result};
use crate::header::HEADER_SIZE;
use crate::reference::Reference;
use crate::region::Region;

/// The read side of a mold: its region and the published end of its records.
pub(crate) struct Store {
    id: u64,
    region: Arc<dyn Region>,
    limit: Arc<AtomicU64>,
}

impl Store {
    pub fn new(id: u64, region: Arc<dyn Region>, limit: Arc<AtomicU64>) -> Self {
        Store { id, region, limit }
    }

    /// Process-unique identity of the mold this store belongs to.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn region(&self) -> &dyn Region {
        self.region.as_ref()
    }

    /// End of the published records. Everything below it is fully written.
    pub fn limit(&self) -> u64 {
        self.limit.load(Ordering::Acquire)
    }

    /// Fails unless `len` bytes at `addr` lie within the published records.
    pub fn check(&self, reference: Reference, addr: u64, len: u64) -> Result<()> {
        let limit = self.limit();
        let end = addr.checked_add(len);
        if addr < HEADER_SIZE || end.is_none_or(|end| end > limit) {
            return Err(Error::invalid(
                reference,
                format!("record of {len} bytes at {addr:#x} outside [{HEADER_SIZE:#x}, {limit:#x})"),
            ));
        }
        Ok(())
    }
}

/// What a view needs to decode further references: the store, plus the decode
/// cache if the owning mold still has one.
///
/// The cache is held weakly because the cache itself holds views.
#[derive(Clone)]
pub(crate) struct Context {
    pub store: Arc<Store>,
    pub cache: Weak<DecodeCache>,
}

impl Context {
    pub fn cached(&self, reference: Reference) -> Option<crate::node::Node> {
        self.cache.upgrade().and_then(|cache| cache.get(reference))
    }

    pub fn remember(&self, reference: Reference, node: &crate::node::Node) {
        if let Some(cache) = self.cache.upgrade() {
            cache.insert(reference, node);
        }
    }
}

/// A decoded variable-length record: `(store, address, length, hash)`.
///
/// `data` is the address of the first payload byte; nothing beyond the record
/// header has been read when a view is created.
#[derive(Clone)]
pub(crate) struct View {
    pub context: Context,
    pub reference: Reference,
    pub data: u64,
    pub len: usize,
    pub hash: u32,
}

impl View {
    pub fn region(&self) -> &dyn Region {
        self.context.store.region()
    }

    /// The view's own reference if it was decoded from the store with identity `id`.
    pub fn resident_in(&self, id: u64) -> Option<Reference> {
        (self.context.store.id() == id).then_some(self.reference)
    }

    /// True if both views decode the very same record.
    pub fn same_record(&self, other: &View) -> bool {
        self.context.store.id() == other.context.store.id() && self.reference == other.reference
    }

    pub fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.len {
            return Err(Error::IndexOutOfBounds {
                index,
                length: self.len,
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for View {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("View")
            .field("store", &self.context.store.id())
            .field("reference", &self.reference)
            .field("len", &self.len)
            .field("hash", &self.hash)
            .finish()
    }
}
