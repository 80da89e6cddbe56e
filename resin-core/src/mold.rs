use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, instrument};

use crate::arena::Arena;
use crate::cache::DecodeCache;
use crate::config::MoldConfig;
use crate::decode;
use crate::encode::Writer;
use crate::error::{Error, Result};
use crate::header::{self, HEADER_SIZE, Header};
use crate::node::{Node, NodeKind};
use crate::reference::Reference;
use crate::region::{MemoryRegion, Region};
use crate::view::{Context, Store};

static NEXT_STORE_ID: AtomicU64 = AtomicU64::new(1);

/// A node graph persisted in a region.
///
/// Writes are serialized by an internal lock. Reads run concurrently with each other
/// and with a writer, and only observe fully written records. Cloning is cheap and
/// shares all state.
///
/// ```
/// use resin_core::{Mold, Node};
///
/// let mold = Mold::in_memory()?;
/// mold.set(&Node::array(vec![Node::Integer(1), Node::string("ab"), Node::Bool(true)]))?;
///
/// let Some(Node::Array(root)) = mold.root()? else { unreachable!() };
/// assert_eq!(root.get(1)?, Node::string("ab"));
/// # Ok::<(), resin_core::Error>(())
/// ```
#[derive(Clone)]
pub struct Mold {
    inner: Arc<MoldInner>,
}

struct MoldInner {
    store: Arc<Store>,
    cache: Option<Arc<DecodeCache>>,
    writer: Mutex<Writer>,
    config: MoldConfig,
}

impl Mold {
    /// Opens a mold over `region`, initializing the header if the region is empty
    /// and validating it otherwise.
    #[instrument(skip(region), fields(size = region.size()))]
    pub fn open(region: Arc<dyn Region>, config: MoldConfig) -> Result<Mold> {
        let next_free = if region.size() == 0 {
            if region.is_read_only() {
                return Err(Error::ReadOnlyViolation);
            }
            region.grow(HEADER_SIZE)?;
            Header::new().write(region.as_ref())?;
            debug!("initialized empty region");
            HEADER_SIZE
        } else {
            let header = Header::read(region.as_ref())?;
            header.validate(region.size())?;
            debug!(next_free = header.next_free, root = %header.root, "opened region");
            header.next_free
        };

        let id = NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed);
        let arena = Arena::new(Arc::clone(&region), next_free, config.grow_step)?;
        let store = Arc::new(Store::new(id, region, arena.limit()));
        let writer = Writer::new(arena, id, config.dedup, config.index_arrays);
        let cache = config.decode_cache.then(|| Arc::new(DecodeCache::new()));
        Ok(Mold {
            inner: Arc::new(MoldInner {
                store,
                cache,
                writer: Mutex::new(writer),
                config,
            }),
        })
    }

    /// Opens a mold over `region` with the default configuration.
    pub fn new(region: impl Region + 'static) -> Result<Mold> {
        Self::open(Arc::new(region), MoldConfig::default())
    }

    /// Creates a mold over a fresh in-memory region.
    pub fn in_memory() -> Result<Mold> {
        Self::new(MemoryRegion::new())
    }

    pub fn config(&self) -> &MoldConfig {
        &self.inner.config
    }

    pub fn is_read_only(&self) -> bool {
        self.region().is_read_only()
    }

    fn region(&self) -> &dyn Region {
        self.inner.store.region()
    }

    fn context(&self) -> Context {
        Context {
            store: Arc::clone(&self.inner.store),
            cache: self.inner.cache.as_ref().map_or_else(Weak::new, Arc::downgrade),
        }
    }

    fn check_writable(&self) -> Result<()> {
        if self.is_read_only() {
            return Err(Error::ReadOnlyViolation);
        }
        Ok(())
    }

    /// Writes `node` and everything it references, returning its reference.
    ///
    /// A failed put may leave unreachable records behind.
    pub fn put(&self, node: &Node) -> Result<Reference> {
        self.check_writable()?;
        self.inner.writer.lock().put(node)
    }

    /// Writes `nodes` under a single lock.
    pub fn put_all(&self, nodes: &[Node]) -> Result<Vec<Reference>> {
        self.check_writable()?;
        let mut writer = self.inner.writer.lock();
        nodes.iter().map(|node| writer.put(node)).collect()
    }

    /// Decodes the node at `reference`.
    pub fn get(&self, reference: Reference) -> Result<Node> {
        decode::decode(&self.context(), reference)
    }

    /// Decodes the node at `reference`, failing unless it is of kind `kind`.
    pub fn get_as(&self, reference: Reference, kind: NodeKind) -> Result<Node> {
        let node = self.get(reference)?;
        if node.kind() != kind {
            return Err(Error::invalid(
                reference,
                format!("expected {kind:?}, found {:?}", node.kind()),
            ));
        }
        Ok(node)
    }

    pub fn get_all(&self, references: &[Reference]) -> Result<Vec<Node>> {
        let context = self.context();
        references
            .iter()
            .map(|reference| decode::decode(&context, *reference))
            .collect()
    }

    /// The root reference, [`Reference::NULL`] if none was set.
    pub fn root_reference(&self) -> Result<Reference> {
        header::read_root(self.region())
    }

    /// The root node, or `None` if no root was set.
    pub fn root(&self) -> Result<Option<Node>> {
        let root = self.root_reference()?;
        if root.is_null() {
            return Ok(None);
        }
        self.get(root).map(Some)
    }

    /// Writes `node` and makes it the root.
    #[instrument(skip_all)]
    pub fn set(&self, node: &Node) -> Result<Reference> {
        self.check_writable()?;
        let mut writer = self.inner.writer.lock();
        let root = writer.put(node)?;
        header::write_root(self.region(), root)?;
        debug!(%root, "root updated");
        Ok(root)
    }

    /// References of the dedup table, oldest first.
    pub fn reusables(&self) -> Vec<Reference> {
        self.inner.writer.lock().reusables()
    }

    /// Forgets all reusable references. Later puts write equal content again.
    pub fn clear_reusables(&self) {
        self.inner.writer.lock().clear_reusables();
    }

    /// Drops all cached decoded nodes.
    pub fn clear_cache(&self) {
        if let Some(cache) = &self.inner.cache {
            cache.clear();
        }
    }

    pub fn stats(&self) -> MoldStats {
        MoldStats {
            used: self.inner.store.limit(),
            capacity: self.region().size(),
            reusables: self.inner.writer.lock().reusable_count(),
            cached: self.inner.cache.as_ref().map_or(0, |cache| cache.len()),
        }
    }

    /// Flushes the region to its durable backing, if any.
    pub fn flush(&self) -> Result<()> {
        Ok(self.region().flush()?)
    }
}

impl fmt::Debug for Mold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mold")
            .field("id", &self.inner.store.id())
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

/// Usage counters of a mold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoldStats {
    /// Bytes in use, header included.
    pub used: u64,
    /// Current region size in bytes.
    pub capacity: u64,
    /// Entries in the dedup table.
    pub reusables: usize,
    /// Entries in the decode cache.
    pub cached: usize,
}

impl fmt::Display for MoldStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} bytes used, {} reusables, {} cached",
            self.used, self.capacity, self.reusables, self.cached
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::Kind;

    #[test]
    fn empty_mold_has_no_root() {
        let mold = Mold::in_memory().unwrap();
        assert_eq!(mold.root_reference().unwrap(), Reference::NULL);
        assert!(mold.root().unwrap().is_none());
    }

    #[test]
    fn set_then_root() {
        let mold = Mold::in_memory().unwrap();
        let root = mold.set(&Node::Integer(42)).unwrap();
        assert_eq!(root.kind(), Kind::Integer);
        assert_eq!(mold.root_reference().unwrap(), root);
        assert_eq!(mold.root().unwrap(), Some(Node::Integer(42)));
    }

    #[test]
    fn get_as_checks_kind() {
        let mold = Mold::in_memory().unwrap();
        let reference = mold.put(&Node::Duration(5)).unwrap();
        assert_eq!(
            mold.get_as(reference, NodeKind::Duration).unwrap(),
            Node::Duration(5)
        );
        assert!(matches!(
            mold.get_as(reference, NodeKind::Integer),
            Err(Error::InvalidReference { .. })
        ));
    }

    #[test]
    fn stats_track_usage() {
        let mold = Mold::open(
            Arc::new(MemoryRegion::new()),
            MoldConfig::default().with_grow_step(64),
        )
        .unwrap();
        let before = mold.stats();
        assert_eq!(before.used, HEADER_SIZE);
        assert_eq!(before.reusables, 0);

        let reference = mold.put(&Node::string("hello")).unwrap();
        mold.get(reference).unwrap();
        let after = mold.stats();
        assert_eq!(after.used, HEADER_SIZE + 24);
        assert_eq!(after.capacity, 64);
        assert_eq!(after.reusables, 1);
        assert_eq!(after.cached, 1);
        assert_eq!(after.to_string(), "48 of 64 bytes used, 1 reusables, 1 cached");

        mold.clear_cache();
        mold.clear_reusables();
        let cleared = mold.stats();
        assert_eq!((cleared.reusables, cleared.cached), (0, 0));
        assert!(mold.reusables().is_empty());
    }

    #[test]
    fn oversized_grow_step_is_rejected() {
        let config = MoldConfig::default().with_grow_step(1 << 63 | 1);
        assert!(matches!(
            Mold::open(Arc::new(MemoryRegion::new()), config),
            Err(Error::CapacityOverflow { .. })
        ));
    }

    #[test]
    fn clones_share_state() {
        let mold = Mold::in_memory().unwrap();
        let clone = mold.clone();
        let reference = clone.put(&Node::Object(3)).unwrap();
        assert_eq!(mold.get(reference).unwrap(), Node::Object(3));
        assert_eq!(mold.put(&Node::Object(3)).unwrap(), reference);
    }
}
