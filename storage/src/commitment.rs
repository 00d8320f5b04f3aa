// Copyright (C) 2023, Ava Labs, Inc. All rights reserved.
// See the file LICENSE.md for licensing terms.

//! Node commitments.
//!
//! A [`CommitmentScheme`] turns nodes into the 32-byte hashes that authenticate
//! the tree. The scheme is injected into the engine, so alternate constructions
//! (different digests, different preimage layouts) can be swapped in without
//! touching traversal code. [`ClassicScheme`] is the stock construction:
//!
//! * leaf: `H(0x00 || suffix_len || packed suffix nibbles || value_hash)`,
//!   where the suffix is the tail of the key hash below the leaf's position.
//!   Two nibbles pack into one byte, high nibble first; an odd trailing
//!   nibble is padded with a zero low nibble.
//! * internal: `H(0x01 || occupancy bitmap as u16 BE || h_0 || .. || h_15)`,
//!   with every empty slot contributing the all-zero hash.
//! * empty tree: the all-zero hash, with no preimage at all.
//!
//! Folding the suffix into leaf commitments makes them position-dependent: a
//! leaf pushed one level deeper by a split re-hashes even though its key and
//! value did not change.

use smallvec::SmallVec;

use crate::hashers::Blake2b256;
use crate::node::{InternalNode, Node};
use crate::node_key::NodeKey;
use crate::path::NibblePath;
use crate::trie_hash::{TrieHash, HASH_LEN};

/// Leaf preimages start with this byte.
const LEAF_TAG: u8 = 0x00;
/// Internal preimages start with this byte.
const INTERNAL_TAG: u8 = 0x01;

/// A 256-bit digest over byte strings.
///
/// Implementations must be pure functions of their input. [`hash`] has a
/// provided body so that single-buffer call sites stay terse.
///
/// [`hash`]: HashFunction::hash
pub trait HashFunction: Send + Sync {
    /// Digest the concatenation of `parts`.
    fn hash_parts(&self, parts: &[&[u8]]) -> TrieHash;

    /// Digest a single buffer.
    fn hash(&self, data: &[u8]) -> TrieHash {
        self.hash_parts(&[data])
    }
}

/// Maps nodes to the hashes their parents store for them.
pub trait CommitmentScheme: Send + Sync {
    /// The digest of a stored value, folded into leaf commitments.
    fn value_hash(&self, value: &[u8]) -> TrieHash;

    /// Commitment to a leaf holding `value_hash`, reachable through the
    /// remaining key nibbles in `suffix`.
    fn commit_leaf(&self, suffix: &NibblePath, value_hash: &TrieHash) -> TrieHash;

    /// Commitment to an internal node with the given child hashes, one slot
    /// per nibble value.
    fn commit_internal(
        &self,
        children: &[Option<TrieHash>; InternalNode::MAX_CHILDREN],
    ) -> TrieHash;

    /// The root hash of a tree with no entries at all.
    fn null_hash(&self) -> TrieHash;
}

/// The stock commitment scheme, parameterized over the digest.
#[derive(Clone, Copy, Debug, Default)]
pub struct ClassicScheme<H> {
    hasher: H,
}

/// [`ClassicScheme`] over Blake2b-256, the configuration used everywhere a
/// caller does not ask for something else.
pub type DefaultScheme = ClassicScheme<Blake2b256>;

impl<H: HashFunction> ClassicScheme<H> {
    /// Wraps `hasher` in the classic preimage layout.
    pub const fn new(hasher: H) -> Self {
        ClassicScheme { hasher }
    }
}

/// Length-prefixed, two-nibbles-per-byte encoding of a suffix.
fn packed_suffix(suffix: &NibblePath) -> SmallVec<[u8; 33]> {
    let mut out = SmallVec::new();
    out.push(suffix.len() as u8);
    let mut nibbles = suffix.iter();
    while let Some(high) = nibbles.next() {
        let low = nibbles.next().unwrap_or(0);
        out.push((high << 4) | low);
    }
    out
}

impl<H: HashFunction> CommitmentScheme for ClassicScheme<H> {
    fn value_hash(&self, value: &[u8]) -> TrieHash {
        self.hasher.hash(value)
    }

    fn commit_leaf(&self, suffix: &NibblePath, value_hash: &TrieHash) -> TrieHash {
        let tag = [LEAF_TAG];
        let packed = packed_suffix(suffix);
        self.hasher.hash_parts(&[
            tag.as_slice(),
            packed.as_slice(),
            value_hash.as_bytes().as_slice(),
        ])
    }

    fn commit_internal(
        &self,
        children: &[Option<TrieHash>; InternalNode::MAX_CHILDREN],
    ) -> TrieHash {
        const EMPTY_SLOT: [u8; HASH_LEN] = [0; HASH_LEN];

        let mut bitmap: u16 = 0;
        for (index, child) in children.iter().enumerate() {
            if child.is_some() {
                bitmap |= 1 << index;
            }
        }
        let bitmap = bitmap.to_be_bytes();

        let tag = [INTERNAL_TAG];
        let mut parts: SmallVec<[&[u8]; 18]> = SmallVec::new();
        parts.push(tag.as_slice());
        parts.push(bitmap.as_slice());
        for child in children {
            parts.push(match child {
                Some(hash) => hash.as_bytes().as_slice(),
                None => EMPTY_SLOT.as_slice(),
            });
        }
        self.hasher.hash_parts(&parts)
    }

    fn null_hash(&self) -> TrieHash {
        TrieHash::ZERO
    }
}

/// Returns the commitment to `node`, which is stored under `key`.
///
/// The key's path supplies the node's depth, which leaf commitments fold in
/// as the key suffix. Internal commitments ignore the position.
pub fn node_hash<C: CommitmentScheme + ?Sized>(scheme: &C, key: &NodeKey, node: &Node) -> TrieHash {
    match node {
        Node::Internal(node) => scheme.commit_internal(&node.child_hashes()),
        Node::Leaf(node) => {
            let suffix = NibblePath::key_suffix(&node.key_hash, key.path.len());
            scheme.commit_leaf(&suffix, &scheme.value_hash(&node.value))
        }
    }
}
