// Copyright (C) 2023, Ava Labs, Inc. All rights reserved.
// See the file LICENSE.md for licensing terms.

//! Per-commit staging of created and shadowed nodes.

use std::collections::{BTreeMap, BTreeSet};

use storage::{Node, NodeBatch, NodeKey, StaleNodeKey, StoreError, TreeStore, Version};

/// Collects everything one version's put creates before the single atomic
/// `put_nodes`.
///
/// Reads go through the stage first so the descent sees the nodes earlier
/// inserts of the same batch produced. Shadowing is delete-then-create: a
/// node staged and then shadowed within the same version is dropped from the
/// stage outright, since the store never saw it and never needs a stale
/// marker for it.
#[derive(Debug)]
pub(crate) struct TreeCache<'a, S> {
    store: &'a S,
    version: Version,
    staged: BTreeMap<NodeKey, Node>,
    stale: BTreeSet<StaleNodeKey>,
}

impl<'a, S: TreeStore> TreeCache<'a, S> {
    pub(crate) fn new(store: &'a S, version: Version) -> Self {
        TreeCache {
            store,
            version,
            staged: BTreeMap::new(),
            stale: BTreeSet::new(),
        }
    }

    /// Fetch through the stage, then the store. The flag is true for staged
    /// nodes, which this commit produced itself and need no hash check.
    pub(crate) fn get_node(&self, key: &NodeKey) -> Result<Option<(Node, bool)>, StoreError> {
        if let Some(node) = self.staged.get(key) {
            return Ok(Some((node.clone(), true)));
        }
        Ok(self.store.get_node(key)?.map(|node| (node, false)))
    }

    /// Stage `node` under `key`, replacing any earlier staging of the same
    /// key by this commit.
    pub(crate) fn stage(&mut self, key: NodeKey, node: Node) {
        debug_assert_eq!(key.version, self.version);
        self.staged.insert(key, node);
    }

    /// Record that this commit shadowed the node under `key`.
    pub(crate) fn mark_stale(&mut self, key: NodeKey) {
        if key.version == self.version {
            self.staged.remove(&key);
        } else {
            self.stale.insert(StaleNodeKey::new(self.version, key));
        }
    }

    /// Turns the stage into the batch the store applies, rooted at `root`.
    pub(crate) fn freeze(self, root: NodeKey) -> NodeBatch {
        NodeBatch {
            version: self.version,
            root,
            nodes: self.staged,
            stale: self.stale,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use storage::{KeyHash, LeafNode, MemoryStore};

    fn leaf(byte: u8) -> Node {
        LeafNode::new(KeyHash::new([byte; 32]), vec![byte]).into()
    }

    #[test]
    fn stage_shadows_the_store() {
        let store = MemoryStore::default();
        let mut batch = NodeBatch::new(1, NodeKey::root(1));
        batch.nodes.insert(NodeKey::root(1), leaf(1));
        store.put_nodes(batch).unwrap();

        let mut cache = TreeCache::new(&store, 2);
        assert_eq!(
            cache.get_node(&NodeKey::root(1)).unwrap(),
            Some((leaf(1), false))
        );

        cache.stage(NodeKey::root(2), leaf(2));
        assert_eq!(
            cache.get_node(&NodeKey::root(2)).unwrap(),
            Some((leaf(2), true))
        );
    }

    #[test]
    fn same_version_shadowing_leaves_no_marker() {
        let store = MemoryStore::default();
        let mut cache = TreeCache::new(&store, 1);

        cache.stage(NodeKey::root(1), leaf(1));
        cache.mark_stale(NodeKey::root(1));
        cache.stage(NodeKey::root(1), leaf(2));

        let batch = cache.freeze(NodeKey::root(1));
        assert_eq!(batch.nodes.len(), 1);
        assert_eq!(batch.nodes.get(&NodeKey::root(1)), Some(&leaf(2)));
        assert!(batch.stale.is_empty());
    }

    #[test]
    fn cross_version_shadowing_records_a_marker() {
        let store = MemoryStore::default();
        let mut cache = TreeCache::new(&store, 5);

        cache.mark_stale(NodeKey::root(3));
        let batch = cache.freeze(NodeKey::root(5));
        assert!(batch.nodes.is_empty());
        assert_eq!(
            batch.stale.iter().collect::<Vec<_>>(),
            [&StaleNodeKey::new(5, NodeKey::root(3))]
        );
    }
}
