use std::collections::HashMap;

use parking_lot::RwLock;

use crate::node::Node;
use crate::reference::Reference;

/// Decode-side map from reference to the node it decoded to.
///
/// Nodes are immutable and references are never reused, so entries never go stale;
/// clearing the cache only costs re-decoding.
#[derive(Default)]
pub(crate) struct DecodeCache {
    nodes: RwLock<HashMap<Reference, Node>>,
}

impl DecodeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, reference: Reference) -> Option<Node> {
        self.nodes.read().get(&reference).cloned()
    }

    pub fn insert(&self, reference: Reference, node: &Node) {
        self.nodes.write().insert(reference, node.clone());
    }

    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn clear(&self) {
        let mut nodes = self.nodes.write();
        nodes.clear();
        nodes.shrink_to_fit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::Kind;

    #[test]
    fn cache_insert_get_clear() {
        let cache = DecodeCache::new();
        let reference = Reference::pack(Kind::Integer, 24);

        assert!(cache.get(reference).is_none());
        cache.insert(reference, &Node::Integer(5));
        assert_eq!(cache.get(reference), Some(Node::Integer(5)));
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.get(reference).is_none());
        assert_eq!(cache.len(), 0);
    }
}
