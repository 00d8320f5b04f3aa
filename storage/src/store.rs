// Copyright (C) 2023, Ava Labs, Inc. All rights reserved.
// See the file LICENSE.md for licensing terms.

//! The persistence contract the tree engine writes through.
//!
//! The engine never talks to a database directly. It reads single nodes by
//! [`NodeKey`], commits whole versions as one [`NodeBatch`], and asks for
//! root node keys by version. Anything that can honor [`TreeStore`] can back
//! a tree: the in-memory store here, an embedded KV database, a remote
//! service.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::node::Node;
use crate::node_key::{NodeKey, StaleNodeKey, Version};

/// Errors surfaced by a [`TreeStore`].
///
/// Corrupt payloads are not represented here: a store hands back whatever
/// bytes it has, and the engine checks them against the hashes recorded by
/// parents.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The underlying medium failed.
    #[error("store i/o: {0}")]
    Io(#[from] std::io::Error),
    /// The requested version was pruned away and the store tracks that fact.
    #[error("version {0} is at or below the prune floor")]
    Pruned(Version),
    /// A batch tried to rewrite an existing key with different contents.
    #[error("{0} is already written with different contents")]
    WriteConflict(NodeKey),
}

/// What a store does with history that [`TreeStore::prune_up_to`] releases.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PrunePolicy {
    /// Remember the prune floor and answer reads at or below it with
    /// [`StoreError::Pruned`], so a truncated query cannot masquerade as an
    /// absent key.
    #[default]
    Safe,
    /// Drop pruned history without a trace; reads below the floor simply
    /// find nothing.
    Aggressive,
}

impl fmt::Display for PrunePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Everything one committed version writes, applied atomically.
///
/// All node keys carry `version`, and `root` names the node the batch stages
/// as that version's root. `stale` records nodes that this version shadowed;
/// stores keep them readable until a prune releases them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeBatch {
    /// The version every node in this batch belongs to.
    pub version: Version,
    /// The key of this version's root node.
    pub root: NodeKey,
    /// The nodes created by this version.
    pub nodes: BTreeMap<NodeKey, Node>,
    /// Earlier nodes this version made unreachable, eligible for pruning
    /// once history up to `version` is released.
    pub stale: BTreeSet<StaleNodeKey>,
}

impl NodeBatch {
    /// An empty batch rooted at `root`.
    pub fn new(version: Version, root: NodeKey) -> Self {
        NodeBatch {
            version,
            root,
            nodes: BTreeMap::new(),
            stale: BTreeSet::new(),
        }
    }
}

/// Versioned node storage consumed by the tree engine.
///
/// Methods take `&self`: stores are shared across readers, and implementations
/// carry their own interior locking.
pub trait TreeStore {
    /// Fetch the node written under exactly `key`, or `None` if no such node
    /// was ever written (or it has been pruned under
    /// [`PrunePolicy::Aggressive`]).
    fn get_node(&self, key: &NodeKey) -> Result<Option<Node>, StoreError>;

    /// Apply `batch` atomically: either every node, the root registration,
    /// and every stale marker land, or none do.
    fn put_nodes(&self, batch: NodeBatch) -> Result<(), StoreError>;

    /// The root node key committed at exactly `version`, if that version was
    /// ever committed and is still retained.
    fn get_root(&self, version: Version) -> Result<Option<NodeKey>, StoreError>;

    /// The highest committed version and its root node key.
    fn latest_root(&self) -> Result<Option<(Version, NodeKey)>, StoreError>;

    /// Release history up to and including `version`: records needed only by
    /// reads at versions up to `version` may go, and every record reachable
    /// from a root above `version` must stay. Returns how many records went
    /// away. The latest root registration always survives. Pruning at or
    /// below an earlier floor is a no-op returning 0.
    fn prune_up_to(&self, version: Version) -> Result<usize, StoreError>;
}

impl<T: TreeStore + ?Sized> TreeStore for &T {
    fn get_node(&self, key: &NodeKey) -> Result<Option<Node>, StoreError> {
        (**self).get_node(key)
    }

    fn put_nodes(&self, batch: NodeBatch) -> Result<(), StoreError> {
        (**self).put_nodes(batch)
    }

    fn get_root(&self, version: Version) -> Result<Option<NodeKey>, StoreError> {
        (**self).get_root(version)
    }

    fn latest_root(&self) -> Result<Option<(Version, NodeKey)>, StoreError> {
        (**self).latest_root()
    }

    fn prune_up_to(&self, version: Version) -> Result<usize, StoreError> {
        (**self).prune_up_to(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prune_policy_defaults_to_safe() {
        assert_eq!(PrunePolicy::default(), PrunePolicy::Safe);
        assert_eq!(PrunePolicy::Aggressive.to_string(), "Aggressive");
    }

    #[test]
    fn empty_batch_has_no_nodes() {
        let batch = NodeBatch::new(7, NodeKey::root(7));
        assert_eq!(batch.version, 7);
        assert!(batch.nodes.is_empty());
        assert!(batch.stale.is_empty());
    }
}
