// Copyright (C) 2023, Ava Labs, Inc. All rights reserved.
// See the file LICENSE.md for licensing terms.

//! The tree engine: versioned writes, authenticated reads, and proofs.

use metrics::counter;
use storage::logger::debug;
use storage::{
    node_hash, Child, CommitmentScheme, DefaultScheme, InternalNode, KeyHash, LeafNode,
    NibblePath, Node, NodeBatch, NodeKey, StoreError, TreeStore, TrieHash, Version,
};

use crate::cache::TreeCache;
use crate::proof::{BranchStep, Proof, ProofLeaf, ProofTerminal};

/// Errors surfaced by tree operations.
///
/// Plain absence is never an error: lookups return `None` for missing keys
/// and versions. Errors mean the caller broke the write protocol or the
/// store returned something the hashes disown.
#[derive(Debug, thiserror::Error)]
pub enum JmtError {
    /// The store failed underneath the tree.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// A write targeted a version not strictly after the latest commit.
    #[error("version {version} is not after the latest committed version {latest}")]
    VersionNotAfterLatest {
        /// The rejected version.
        version: Version,
        /// The store's latest committed version.
        latest: Version,
    },
    /// An empty batch has no prior root to carry forward.
    #[error("cannot commit an empty batch to an empty tree")]
    EmptyBatch,
    /// A fetched node does not hash to what its parent recorded.
    #[error("{key} hashes to {computed}, expected {stored}")]
    HashMismatch {
        /// The node that failed the check.
        key: NodeKey,
        /// The hash the parent recorded for it.
        stored: TrieHash,
        /// The hash its bytes actually produce.
        computed: TrieHash,
    },
    /// The store's contents contradict the tree's structure.
    #[error("{key} is corrupt: {reason}")]
    Corrupt {
        /// The node at fault.
        key: NodeKey,
        /// What was wrong with it.
        reason: &'static str,
    },
}

/// What one committed version looked like, returned by [`JellyfishMerkleTree::put`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommitResult {
    /// The committed version.
    pub version: Version,
    /// The root hash authenticating the whole tree at this version.
    pub root_hash: TrieHash,
    /// Node records this commit created.
    pub nodes_created: usize,
    /// Earlier node records this commit shadowed.
    pub nodes_stale: usize,
}

/// A parent retained while descending, rewritten on the way back up.
struct Ancestor {
    key: NodeKey,
    node: InternalNode,
    index: u8,
}

/// A versioned, authenticated key-value index over a [`TreeStore`].
///
/// Keys are 256-bit hashes; values are opaque bytes. Every [`put`] commits a
/// new version whose nodes share unchanged subtrees with earlier versions,
/// so old roots stay readable until explicitly pruned. The commitment
/// scheme is injected and defaults to Blake2b-256 over the classic layout.
///
/// The engine holds no mutable state of its own, but writes are
/// single-writer by contract: [`put`] calls against one tree must be
/// serialized externally. Reads of already-committed versions take `&self`
/// and may run concurrently, with each other and with the one writer.
///
/// [`put`]: JellyfishMerkleTree::put
#[derive(Debug)]
pub struct JellyfishMerkleTree<S, C = DefaultScheme> {
    store: S,
    scheme: C,
}

impl<S: TreeStore> JellyfishMerkleTree<S> {
    /// A tree over `store` with the default commitment scheme.
    pub fn new(store: S) -> Self {
        Self::with_scheme(store, DefaultScheme::default())
    }
}

impl<S: TreeStore, C: CommitmentScheme> JellyfishMerkleTree<S, C> {
    /// A tree over `store` committing nodes with `scheme`.
    ///
    /// Every read of data committed under another scheme will fail its hash
    /// checks, so a store must stay married to one scheme for life.
    pub fn with_scheme(store: S, scheme: C) -> Self {
        JellyfishMerkleTree { store, scheme }
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The injected commitment scheme, for verifying proofs elsewhere.
    pub fn scheme(&self) -> &C {
        &self.scheme
    }

    /// The root hash of a tree with no entries.
    pub fn empty_root_hash(&self) -> TrieHash {
        self.scheme.null_hash()
    }

    /// The highest committed version, if any.
    pub fn latest_version(&self) -> Result<Option<Version>, JmtError> {
        Ok(self.store.latest_root()?.map(|(version, _)| version))
    }

    /// Commits `entries` as `version`, which must be strictly greater than
    /// every version committed before it. Gaps are fine.
    ///
    /// Duplicate keys collapse to the last occurrence. An empty batch
    /// re-registers the previous root under the new version, and is
    /// rejected if there is no previous root. There is no delete: absence
    /// of a key from a batch leaves its prior value bound, and callers that
    /// need removal write a tombstone value they interpret themselves.
    ///
    /// Callers must serialize `put`s on one tree: two racing writers can
    /// both validate against the same latest version and commit versions
    /// that do not see each other's entries.
    pub fn put<V: Into<Box<[u8]>>>(
        &self,
        entries: impl IntoIterator<Item = (KeyHash, V)>,
        version: Version,
    ) -> Result<CommitResult, JmtError> {
        let entries: std::collections::BTreeMap<KeyHash, V> = entries.into_iter().collect();
        let latest = self.store.latest_root()?;
        if let Some((latest_version, _)) = &latest {
            if version <= *latest_version {
                return Err(JmtError::VersionNotAfterLatest {
                    version,
                    latest: *latest_version,
                });
            }
        }

        if entries.is_empty() {
            let Some((_, prior_root)) = latest else {
                return Err(JmtError::EmptyBatch);
            };
            let root_hash = {
                let node = self.fetch(&prior_root, None)?;
                node_hash(&self.scheme, &prior_root, &node)
            };
            self.store.put_nodes(NodeBatch::new(version, prior_root))?;
            return Ok(CommitResult {
                version,
                root_hash,
                nodes_created: 0,
                nodes_stale: 0,
            });
        }

        counter!("jmt.put.keys").increment(entries.len() as u64);
        let mut cache = TreeCache::new(&self.store, version);
        let mut root_key = latest.map(|(_, key)| key);
        for (key_hash, value) in entries {
            self.insert_one(&mut cache, version, root_key.as_ref(), key_hash, value.into())?;
            root_key = Some(NodeKey::root(version));
        }

        let root_key = NodeKey::root(version);
        let root_hash = {
            let (node, _) = cache.get_node(&root_key)?.ok_or(JmtError::Corrupt {
                key: NodeKey::root(version),
                reason: "commit staged no root",
            })?;
            node_hash(&self.scheme, &root_key, &node)
        };
        let batch = cache.freeze(root_key);
        let nodes_created = batch.nodes.len();
        let nodes_stale = batch.stale.len();
        self.store.put_nodes(batch)?;
        debug!("committed version {version}: root {root_hash}, {nodes_created} nodes created, {nodes_stale} stale");
        Ok(CommitResult {
            version,
            root_hash,
            nodes_created,
            nodes_stale,
        })
    }

    /// The value bound to `key` at `version`, or `None` if the key was
    /// never written as of that version (or the version itself was never
    /// committed).
    pub fn get(&self, key: &KeyHash, version: Version) -> Result<Option<Box<[u8]>>, JmtError> {
        counter!("jmt.get").increment(1);
        let Some(mut cursor) = self.store.get_root(version)? else {
            return Ok(None);
        };
        let mut expected = None;
        loop {
            let node = self.fetch(&cursor, expected)?;
            match node {
                Node::Internal(internal) => {
                    let index = key.nibble(self.internal_depth(&cursor)?);
                    match internal.child(index) {
                        Some(child) => {
                            expected = Some(child.hash);
                            cursor = NodeKey::new(child.version, cursor.path.child(index));
                        }
                        None => return Ok(None),
                    }
                }
                Node::Leaf(leaf) => {
                    return Ok((leaf.key_hash == *key).then_some(leaf.value));
                }
            }
        }
    }

    /// A proof of the value bound to `key` at `version`, or of its absence,
    /// verifiable against that version's root hash with no store at hand.
    ///
    /// `None` means `version` itself was never committed: with no root hash
    /// to check against, there is nothing to prove.
    pub fn get_proof(&self, key: &KeyHash, version: Version) -> Result<Option<Proof>, JmtError> {
        counter!("jmt.proof").increment(1);
        let Some(mut cursor) = self.store.get_root(version)? else {
            return Ok(None);
        };
        let mut steps = Vec::new();
        let mut expected = None;
        let terminal = loop {
            let node = self.fetch(&cursor, expected)?;
            match node {
                Node::Internal(internal) => {
                    let index = key.nibble(self.internal_depth(&cursor)?);
                    let mut siblings = internal.child_hashes();
                    if let Some(slot) = siblings.get_mut(usize::from(index)) {
                        *slot = None;
                    }
                    steps.push(BranchStep::new(index, siblings));
                    match internal.child(index) {
                        Some(child) => {
                            expected = Some(child.hash);
                            cursor = NodeKey::new(child.version, cursor.path.child(index));
                        }
                        None => break ProofTerminal::Empty,
                    }
                }
                Node::Leaf(leaf) => {
                    break ProofTerminal::Leaf(ProofLeaf {
                        key_hash: leaf.key_hash,
                        value_hash: self.scheme.value_hash(&leaf.value),
                    });
                }
            }
        };
        // Proofs carry their steps deepest first.
        steps.reverse();
        Ok(Some(Proof::new(steps, terminal)))
    }

    /// The root hash at `version`, or `None` if that version was never
    /// committed. An empty tree has no committed versions; its conceptual
    /// root hash is [`empty_root_hash`].
    ///
    /// [`empty_root_hash`]: JellyfishMerkleTree::empty_root_hash
    pub fn root_hash(&self, version: Version) -> Result<Option<TrieHash>, JmtError> {
        match self.store.get_root(version)? {
            Some(key) => {
                let node = self.fetch(&key, None)?;
                Ok(Some(node_hash(&self.scheme, &key, &node)))
            }
            None => Ok(None),
        }
    }

    /// Releases history up to and including `version` from the store.
    /// Returns the number of records removed; pruning at or below an
    /// earlier prune is a no-op returning 0.
    pub fn prune_up_to(&self, version: Version) -> Result<usize, JmtError> {
        let removed = self.store.prune_up_to(version)?;
        counter!("jmt.pruned").increment(removed as u64);
        debug!("pruned up to version {version}: {removed} records released");
        Ok(removed)
    }

    /// Inserts one entry on top of `root_key`, staging every rewritten
    /// node. After this returns the staged root is `NodeKey::root(version)`.
    fn insert_one(
        &self,
        cache: &mut TreeCache<'_, S>,
        version: Version,
        root_key: Option<&NodeKey>,
        key_hash: KeyHash,
        value: Box<[u8]>,
    ) -> Result<(), JmtError> {
        let Some(root_key) = root_key else {
            // First entry of an empty tree: the root is a lone leaf.
            cache.stage(NodeKey::root(version), LeafNode::new(key_hash, value).into());
            return Ok(());
        };

        let mut ancestors: Vec<Ancestor> = Vec::new();
        let mut cursor = root_key.clone();
        let mut expected: Option<TrieHash> = None;
        let mut bottom = loop {
            let (node, staged) = cache.get_node(&cursor)?.ok_or_else(|| JmtError::Corrupt {
                key: cursor.clone(),
                reason: "node missing from store",
            })?;
            if !staged {
                self.check_hash(&cursor, &node, expected)?;
            }
            match node {
                Node::Internal(internal) => {
                    let index = key_hash.nibble(self.internal_depth(&cursor)?);
                    match internal.child(index).copied() {
                        Some(child) => {
                            let next = NodeKey::new(child.version, cursor.path.child(index));
                            expected = Some(child.hash);
                            ancestors.push(Ancestor {
                                key: cursor,
                                node: internal,
                                index,
                            });
                            cursor = next;
                        }
                        None => {
                            // First write under this slot.
                            let leaf_key = NodeKey::new(version, cursor.path.child(index));
                            let leaf = Node::from(LeafNode::new(key_hash, value));
                            let hash = node_hash(&self.scheme, &leaf_key, &leaf);
                            cache.stage(leaf_key, leaf);
                            ancestors.push(Ancestor {
                                key: cursor,
                                node: internal,
                                index,
                            });
                            break Child { version, hash };
                        }
                    }
                }
                Node::Leaf(existing) => {
                    break self.displace_leaf(cache, version, cursor, existing, key_hash, value);
                }
            }
        };

        // Rewrite each ancestor with its new child slot, bottom-up.
        for Ancestor {
            key,
            mut node,
            index,
        } in ancestors.into_iter().rev()
        {
            node.set_child(index, bottom);
            let new_key = NodeKey::new(version, key.path.clone());
            cache.mark_stale(key);
            let node = Node::from(node);
            let hash = node_hash(&self.scheme, &new_key, &node);
            cache.stage(new_key, node);
            bottom = Child { version, hash };
        }
        Ok(())
    }

    /// Replaces or splits the leaf at `cursor`, returning the child slot
    /// entry for whatever now occupies that path.
    fn displace_leaf(
        &self,
        cache: &mut TreeCache<'_, S>,
        version: Version,
        cursor: NodeKey,
        existing: LeafNode,
        key_hash: KeyHash,
        value: Box<[u8]>,
    ) -> Child {
        let depth = cursor.path.len();
        if existing.key_hash == key_hash {
            // Same key: a plain value update in place.
            let new_key = NodeKey::new(version, cursor.path.clone());
            cache.mark_stale(cursor);
            let leaf = Node::from(LeafNode::new(key_hash, value));
            let hash = node_hash(&self.scheme, &new_key, &leaf);
            cache.stage(new_key, leaf);
            return Child { version, hash };
        }

        // Two keys on one path: fork where their nibbles first differ and
        // push both leaves below the fork.
        let fork = existing.key_hash.common_prefix_nibbles(&key_hash);
        debug_assert!(fork >= depth, "leaf reached without matching its prefix");
        debug_assert!(fork < KeyHash::NIBBLES, "distinct keys cannot share all nibbles");
        cache.mark_stale(cursor);

        let fork_path = NibblePath::key_prefix(&key_hash, fork);
        let existing_nibble = existing.key_hash.nibble(fork);
        let new_nibble = key_hash.nibble(fork);

        // The displaced leaf re-hashes at its deeper position even though
        // its contents are unchanged.
        let existing_key = NodeKey::new(version, fork_path.child(existing_nibble));
        let moved = Node::from(existing);
        let existing_hash = node_hash(&self.scheme, &existing_key, &moved);
        cache.stage(existing_key, moved);

        let new_key = NodeKey::new(version, fork_path.child(new_nibble));
        let leaf = Node::from(LeafNode::new(key_hash, value));
        let new_hash = node_hash(&self.scheme, &new_key, &leaf);
        cache.stage(new_key, leaf);

        // The fork internal, then single-child internals back up to the
        // depth the original leaf sat at.
        let mut node = InternalNode::pair(
            (
                existing_nibble,
                Child {
                    version,
                    hash: existing_hash,
                },
            ),
            (
                new_nibble,
                Child {
                    version,
                    hash: new_hash,
                },
            ),
        );
        let mut level = fork;
        loop {
            let node_key = NodeKey::new(version, NibblePath::key_prefix(&key_hash, level));
            let wrapped = Node::from(node);
            let hash = node_hash(&self.scheme, &node_key, &wrapped);
            cache.stage(node_key, wrapped);
            if level == depth {
                return Child { version, hash };
            }
            level -= 1;
            node = InternalNode::single(key_hash.nibble(level), Child { version, hash });
        }
    }

    /// Fetches `key` from the store, failing fast on absence, and checks it
    /// against the hash its parent recorded when one is known.
    fn fetch(&self, key: &NodeKey, expected: Option<TrieHash>) -> Result<Node, JmtError> {
        let node = self.store.get_node(key)?.ok_or_else(|| JmtError::Corrupt {
            key: key.clone(),
            reason: "node missing from store",
        })?;
        self.check_hash(key, &node, expected)?;
        Ok(node)
    }

    fn check_hash(
        &self,
        key: &NodeKey,
        node: &Node,
        expected: Option<TrieHash>,
    ) -> Result<(), JmtError> {
        if let Some(expected) = expected {
            let computed = node_hash(&self.scheme, key, node);
            if computed != expected {
                return Err(JmtError::HashMismatch {
                    key: key.clone(),
                    stored: expected,
                    computed,
                });
            }
        }
        Ok(())
    }

    /// The depth an internal node branches at, erroring on nodes deeper
    /// than the key space allows.
    fn internal_depth(&self, key: &NodeKey) -> Result<usize, JmtError> {
        let depth = key.path.len();
        if depth >= KeyHash::NIBBLES {
            return Err(JmtError::Corrupt {
                key: key.clone(),
                reason: "internal node below the key space",
            });
        }
        Ok(depth)
    }
}
