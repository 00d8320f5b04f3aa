// Copyright (C) 2023, Ava Labs, Inc. All rights reserved.
// See the file LICENSE.md for licensing terms.

//! The immutable storage units of the tree.
//!
//! A [`Node`] is written once under its [`NodeKey`](crate::NodeKey) and never
//! mutated afterwards; updates at later versions write new nodes along the
//! changed path and keep referencing the untouched remainder. Internal nodes
//! branch on one nibble per level; leaves carry the full key hash and the
//! value, so a lookup can stop as soon as the remaining subtree holds a
//! single key.

use enum_as_inner::EnumAsInner;
use serde::{Deserialize, Serialize};

pub mod internal;
pub mod leaf;

pub use internal::{Child, InternalNode};
pub use leaf::LeafNode;

/// A node in the tree, either branching or terminal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, EnumAsInner)]
pub enum Node {
    /// A branch with up to 16 children, one per nibble value.
    Internal(InternalNode),
    /// A terminal node holding one key hash and its value.
    Leaf(LeafNode),
}

impl From<InternalNode> for Node {
    fn from(node: InternalNode) -> Self {
        Node::Internal(node)
    }
}

impl From<LeafNode> for Node {
    fn from(node: LeafNode) -> Self {
        Node::Leaf(node)
    }
}
