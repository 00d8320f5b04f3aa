// Copyright (C) 2023, Ava Labs, Inc. All rights reserved.
// See the file LICENSE.md for licensing terms.

//! A read-through node cache over any [`TreeStore`].

use std::num::NonZero;

use lru::LruCache;
use metrics::counter;
use parking_lot::Mutex;

use crate::node::Node;
use crate::node_key::{NodeKey, Version};
use crate::store::{NodeBatch, StoreError, TreeStore};

/// Wraps a [`TreeStore`] with an LRU cache of nodes.
///
/// Node records are immutable once written, so a cached copy can go away but
/// never change; coherence needs no invalidation protocol. The one exception
/// is pruning, which the wrapper handles by dropping the whole cache.
#[derive(Debug)]
pub struct CachedStore<S> {
    inner: S,
    cache: Mutex<LruCache<NodeKey, Node>>,
}

impl<S> CachedStore<S> {
    /// Wraps `inner`, keeping up to `capacity` nodes in memory.
    pub fn new(inner: S, capacity: NonZero<usize>) -> Self {
        CachedStore {
            inner,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// The wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Unwraps the underlying store, discarding the cache.
    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: TreeStore> TreeStore for CachedStore<S> {
    fn get_node(&self, key: &NodeKey) -> Result<Option<Node>, StoreError> {
        let cached = self.cache.lock().get(key).cloned();
        counter!("jmt.cache.node", "type" => if cached.is_some() { "hit" } else { "miss" })
            .increment(1);
        if let Some(node) = cached {
            return Ok(Some(node));
        }
        let node = self.inner.get_node(key)?;
        if let Some(node) = &node {
            self.cache.lock().put(key.clone(), node.clone());
        }
        Ok(node)
    }

    fn put_nodes(&self, batch: NodeBatch) -> Result<(), StoreError> {
        // Write through only after the inner store accepts the batch, so a
        // rejected version never leaves phantom nodes behind.
        let staged: Vec<(NodeKey, Node)> = batch
            .nodes
            .iter()
            .map(|(key, node)| (key.clone(), node.clone()))
            .collect();
        self.inner.put_nodes(batch)?;
        let mut guard = self.cache.lock();
        for (key, node) in staged {
            guard.put(key, node);
        }
        Ok(())
    }

    fn get_root(&self, version: Version) -> Result<Option<NodeKey>, StoreError> {
        self.inner.get_root(version)
    }

    fn latest_root(&self) -> Result<Option<(Version, NodeKey)>, StoreError> {
        self.inner.latest_root()
    }

    fn prune_up_to(&self, version: Version) -> Result<usize, StoreError> {
        let removed = self.inner.prune_up_to(version)?;
        if removed > 0 {
            self.cache.lock().clear();
        }
        Ok(removed)
    }
}
