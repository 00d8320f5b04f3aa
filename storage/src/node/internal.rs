// Copyright (C) 2023, Ava Labs, Inc. All rights reserved.
// See the file LICENSE.md for licensing terms.

use std::fmt::{Debug, Error as FmtError, Formatter};

use serde::{Deserialize, Serialize};

use crate::{TrieHash, Version};

/// A reference to one child of an [`InternalNode`].
///
/// The child's full [`NodeKey`](crate::NodeKey) is `(version,
/// parent_path.child(nibble))`, so a slot only needs to record the version
/// that last wrote the child plus its hash. Carrying the hash here is what
/// lets a parent's commitment be computed without fetching the children, and
/// lets every fetched child be checked against what its parent recorded.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Child {
    /// The version that created the referenced node.
    pub version: Version,
    /// The referenced node's commitment.
    pub hash: TrieHash,
}

impl Debug for Child {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        write!(f, "(v{} {:?})", self.version, self.hash)
    }
}

/// A branch node: a sparse array of up to 16 children indexed by nibble.
///
/// An internal node always has at least one occupied slot; an empty subtree
/// is represented by absence, never by an empty branch.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InternalNode {
    children: [Option<Child>; Self::MAX_CHILDREN],
}

impl InternalNode {
    /// Number of child slots, one per nibble value.
    pub const MAX_CHILDREN: usize = 16;

    /// Build a node from a full slot array.
    pub fn new(children: [Option<Child>; Self::MAX_CHILDREN]) -> Self {
        debug_assert!(
            children.iter().any(Option::is_some),
            "internal node must have a child"
        );
        InternalNode { children }
    }

    /// A node with a single child, as created along a leaf-split chain.
    pub fn single(nibble: u8, child: Child) -> Self {
        let mut node = InternalNode {
            children: [None; Self::MAX_CHILDREN],
        };
        node.set_child(nibble, child);
        node
    }

    /// A node with two children, the fork point where two keys diverge.
    pub fn pair(a: (u8, Child), b: (u8, Child)) -> Self {
        debug_assert!(a.0 & 0x0f != b.0 & 0x0f, "fork children share a slot");
        let mut node = Self::single(a.0, a.1);
        node.set_child(b.0, b.1);
        node
    }

    /// The child in slot `nibble`, if occupied. Only the low 4 bits of
    /// `nibble` are considered.
    pub fn child(&self, nibble: u8) -> Option<&Child> {
        self.children.get(usize::from(nibble & 0x0f))?.as_ref()
    }

    /// Occupy slot `nibble` (low 4 bits), replacing any previous reference.
    pub fn set_child(&mut self, nibble: u8, child: Child) {
        if let Some(slot) = self.children.get_mut(usize::from(nibble & 0x0f)) {
            *slot = Some(child);
        }
    }

    /// Iterate over the occupied slots in ascending nibble order.
    pub fn children(&self) -> impl Iterator<Item = (u8, &Child)> {
        self.children
            .iter()
            .enumerate()
            .filter_map(|(i, child)| child.as_ref().map(|c| (i as u8, c)))
    }

    /// The hash of each slot, occupied or not, in nibble order. This is the
    /// dense form consumed by the commitment scheme and by proof siblings.
    pub fn child_hashes(&self) -> [Option<TrieHash>; Self::MAX_CHILDREN] {
        let mut hashes = [None; Self::MAX_CHILDREN];
        for (slot, child) in hashes.iter_mut().zip(&self.children) {
            *slot = child.as_ref().map(|c| c.hash);
        }
        hashes
    }

    /// Occupancy bitmap, bit `i` set when slot `i` is occupied.
    pub fn bitmap(&self) -> u16 {
        self.children
            .iter()
            .enumerate()
            .fold(0, |bits, (i, child)| match child {
                Some(_) => bits | (1 << i),
                None => bits,
            })
    }

    /// Number of occupied slots.
    pub fn occupied(&self) -> usize {
        self.children.iter().filter(|c| c.is_some()).count()
    }
}

impl Debug for InternalNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        write!(f, "[Internal")?;
        for (nibble, child) in self.children() {
            write!(f, " {nibble:x}:{child:?}")?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
#[allow(clippy::indexing_slicing, clippy::unwrap_used)]
mod tests {
    use super::*;

    fn child(version: Version, byte: u8) -> Child {
        Child {
            version,
            hash: TrieHash::new([byte; 32]),
        }
    }

    #[test]
    fn bitmap_tracks_slots() {
        let mut node = InternalNode::single(0x0, child(1, 0xaa));
        assert_eq!(node.bitmap(), 0b1);
        node.set_child(0xf, child(2, 0xbb));
        assert_eq!(node.bitmap(), 0b1000_0000_0000_0001);
        assert_eq!(node.occupied(), 2);
    }

    #[test]
    fn children_iterate_ascending() {
        let node = InternalNode::pair((0x7, child(3, 0x01)), (0x2, child(9, 0x02)));
        let slots: Vec<u8> = node.children().map(|(nibble, _)| nibble).collect();
        assert_eq!(slots, vec![0x2, 0x7]);
        assert_eq!(node.child(0x7).unwrap().version, 3);
        assert!(node.child(0x0).is_none());
    }

    #[test]
    fn set_child_replaces() {
        let mut node = InternalNode::single(0x4, child(1, 0x11));
        node.set_child(0x4, child(5, 0x22));
        assert_eq!(node.occupied(), 1);
        assert_eq!(node.child(0x4).unwrap().version, 5);
        assert_eq!(node.child_hashes()[0x4], Some(TrieHash::new([0x22; 32])));
    }
}
