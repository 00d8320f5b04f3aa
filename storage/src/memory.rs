// Copyright (C) 2023, Ava Labs, Inc. All rights reserved.
// See the file LICENSE.md for licensing terms.

//! The in-memory [`TreeStore`], used as the reference backend and as the
//! test double for everything above the store seam.

use std::collections::{BTreeMap, BTreeSet};
use std::mem;

use metrics::counter;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use typed_builder::TypedBuilder;

use crate::logger::trace;
use crate::node::Node;
use crate::node_key::{NodeKey, StaleNodeKey, Version};
use crate::store::{NodeBatch, PrunePolicy, StoreError, TreeStore};

/// Construction options for [`MemoryStore`].
#[derive(Clone, Debug, TypedBuilder)]
pub struct MemoryStoreConfig {
    /// What pruned history leaves behind. See [`PrunePolicy`].
    #[builder(default)]
    pub prune_policy: PrunePolicy,
    /// Reject batches that rewrite an existing record with different
    /// contents. Committed versions are immutable, so a conflicting rewrite
    /// is always a caller bug; disable only to replay recovered batches over
    /// a partially populated store.
    #[builder(default = true)]
    pub enforce_write_once: bool,
}

impl Default for MemoryStoreConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[derive(Debug, Default)]
struct Inner {
    nodes: BTreeMap<NodeKey, Node>,
    roots: BTreeMap<Version, NodeKey>,
    stale: BTreeSet<StaleNodeKey>,
    /// Highest version a prune has released, if any.
    floor: Option<Version>,
}

/// A [`TreeStore`] holding every record in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    config: MemoryStoreConfig,
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// An empty store with the given options.
    pub fn new(config: MemoryStoreConfig) -> Self {
        MemoryStore {
            config,
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Number of node records currently held, including stale ones that have
    /// not been pruned yet.
    pub fn node_count(&self) -> usize {
        self.read().nodes.len()
    }

    /// Number of root registrations currently held.
    pub fn root_count(&self) -> usize {
        self.read().roots.len()
    }

    /// Number of stale markers awaiting a prune.
    pub fn stale_count(&self) -> usize {
        self.read().stale.len()
    }

    /// Rewrites the node under `key` in place, bypassing write-once checks.
    /// Returns false if the key is absent. For corruption tests only.
    #[cfg(any(test, feature = "test_utils"))]
    pub fn tamper_node(&self, key: &NodeKey, tamper: impl FnOnce(&mut Node)) -> bool {
        let mut inner = self.write();
        match inner.nodes.get_mut(key) {
            Some(node) => {
                tamper(node);
                true
            }
            None => false,
        }
    }

    /// Drops the node under `key` without recording a stale marker or moving
    /// the floor. For corruption tests only.
    #[cfg(any(test, feature = "test_utils"))]
    pub fn remove_node(&self, key: &NodeKey) -> bool {
        self.write().nodes.remove(key).is_some()
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read()
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write()
    }

    fn absent(&self, version: Version, floor: Option<Version>) -> Result<Option<Node>, StoreError> {
        match (self.config.prune_policy, floor) {
            (PrunePolicy::Safe, Some(floor)) if version <= floor => {
                Err(StoreError::Pruned(version))
            }
            _ => Ok(None),
        }
    }
}

impl TreeStore for MemoryStore {
    fn get_node(&self, key: &NodeKey) -> Result<Option<Node>, StoreError> {
        let inner = self.read();
        match inner.nodes.get(key) {
            Some(node) => Ok(Some(node.clone())),
            None => self.absent(key.version, inner.floor),
        }
    }

    fn put_nodes(&self, batch: NodeBatch) -> Result<(), StoreError> {
        let mut inner = self.write();
        if self.config.enforce_write_once {
            for (key, node) in &batch.nodes {
                if inner.nodes.get(key).is_some_and(|existing| existing != node) {
                    return Err(StoreError::WriteConflict(key.clone()));
                }
            }
            let root_conflict = inner
                .roots
                .get(&batch.version)
                .is_some_and(|existing| *existing != batch.root);
            if root_conflict {
                return Err(StoreError::WriteConflict(NodeKey::root(batch.version)));
            }
        }

        let written = batch.nodes.len();
        inner.nodes.extend(batch.nodes);
        inner.roots.insert(batch.version, batch.root);
        inner.stale.extend(batch.stale);
        counter!("jmt.store.nodes_written").increment(written as u64);
        trace!("stored {written} nodes for version {}", batch.version);
        Ok(())
    }

    fn get_root(&self, version: Version) -> Result<Option<NodeKey>, StoreError> {
        let inner = self.read();
        match inner.roots.get(&version) {
            Some(key) => Ok(Some(key.clone())),
            None => {
                self.absent(version, inner.floor)?;
                Ok(None)
            }
        }
    }

    fn latest_root(&self) -> Result<Option<(Version, NodeKey)>, StoreError> {
        Ok(self
            .read()
            .roots
            .last_key_value()
            .map(|(version, key)| (*version, key.clone())))
    }

    fn prune_up_to(&self, version: Version) -> Result<usize, StoreError> {
        let mut inner = self.write();
        if inner.floor.is_some_and(|floor| version <= floor) {
            return Ok(0);
        }

        // A node shadowed at version `s` serves reads at versions below `s`
        // only, so with every version up to `version` released it is garbage
        // once `s <= version + 1`. Markers sort by `stale_since`, making the
        // prunable ones a prefix of the set.
        let released = match version.checked_add(2) {
            Some(cutoff) => {
                let kept = inner
                    .stale
                    .split_off(&StaleNodeKey::new(cutoff, NodeKey::root(0)));
                mem::replace(&mut inner.stale, kept)
            }
            None => mem::take(&mut inner.stale),
        };

        let mut removed = 0;
        for entry in &released {
            if inner.nodes.remove(&entry.key).is_some() {
                removed += 1;
            }
        }

        let latest = inner.roots.last_key_value().map(|(v, _)| *v);
        let roots_before = inner.roots.len();
        inner
            .roots
            .retain(|v, _| *v > version || Some(*v) == latest);
        removed += roots_before - inner.roots.len();

        inner.floor = Some(version);
        counter!("jmt.store.records_pruned").increment(removed as u64);
        trace!("pruned {removed} records up to version {version}");
        Ok(removed)
    }
}
