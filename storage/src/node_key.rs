// Copyright (C) 2023, Ava Labs, Inc. All rights reserved.
// See the file LICENSE.md for licensing terms.

use std::fmt::{self, Debug, Display};

use serde::{Deserialize, Serialize};

use crate::NibblePath;

/// A caller-supplied commit identifier, strictly increasing per commit.
pub type Version = u64;

/// The identity of a stored node: where it sits and which version wrote it.
///
/// Unchanged subtrees keep their `NodeKey` across later versions; that
/// reference reuse is the structural-sharing mechanism. Keys order by
/// `(version, path)`, so one version's nodes form a contiguous range.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeKey {
    /// The version whose commit created this node.
    pub version: Version,
    /// Nibble prefix from the root to the node.
    pub path: NibblePath,
}

impl NodeKey {
    /// A key at `path` written by `version`.
    pub fn new(version: Version, path: NibblePath) -> Self {
        NodeKey { version, path }
    }

    /// The root node key for `version`.
    pub fn root(version: Version) -> Self {
        NodeKey {
            version,
            path: NibblePath::new(),
        }
    }
}

impl Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}:{:?}", self.version, self.path)
    }
}

impl Debug for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

/// A stale-index entry: `key` was superseded by the commit at `stale_since`.
///
/// A node staled at version `s` was last referenced by the root of `s - 1`,
/// so it is dead weight once every version up to `s - 1` is released.
/// Entries order by `stale_since` first, which makes pruning a prefix
/// drain.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StaleNodeKey {
    /// First version whose tree no longer references [`Self::key`].
    pub stale_since: Version,
    /// The superseded node.
    pub key: NodeKey,
}

impl StaleNodeKey {
    /// Record that `key` stopped being referenced at `stale_since`.
    pub fn new(stale_since: Version, key: NodeKey) -> Self {
        StaleNodeKey { stale_since, key }
    }
}

impl Debug for StaleNodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stale@v{}({})", self.stale_since, self.key)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn orders_by_version_then_path() {
        let a = NodeKey::new(1, NibblePath::from_nibbles([0xf]));
        let b = NodeKey::root(2);
        let c = NodeKey::new(2, NibblePath::from_nibbles([0x0]));
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn stale_orders_by_staleness_first() {
        let newer = StaleNodeKey::new(9, NodeKey::root(1));
        let older = StaleNodeKey::new(2, NodeKey::root(8));
        assert!(older < newer);
    }

    #[test]
    fn display_forms() {
        let key = NodeKey::new(7, NibblePath::from_nibbles([0xa, 0x3]));
        assert_eq!(key.to_string(), "v7:a3");
        assert_eq!(NodeKey::root(0).to_string(), "v0:(root)");
    }
}
