// Copyright (C) 2023, Ava Labs, Inc. All rights reserved.
// See the file LICENSE.md for licensing terms.

use std::fmt::{Debug, Error as FmtError, Formatter};

use serde::{Deserialize, Serialize};

use crate::KeyHash;

/// A terminal node: the full key hash and the value stored under it.
///
/// A leaf sits as high in the tree as its key's divergence from other live
/// keys allows, so its path is a prefix of `key_hash`, not necessarily the
/// whole thing. The value is opaque to the tree; logical deletion is a
/// caller-defined tombstone value, since the tree has no remove operation.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeafNode {
    /// Hash of the application key this leaf holds.
    pub key_hash: KeyHash,
    /// The stored payload.
    pub value: Box<[u8]>,
}

impl LeafNode {
    /// Build a leaf for `key_hash` holding `value`.
    pub fn new(key_hash: KeyHash, value: impl Into<Box<[u8]>>) -> Self {
        LeafNode {
            key_hash,
            value: value.into(),
        }
    }
}

impl Debug for LeafNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        write!(
            f,
            "[Leaf {:?} v={}]",
            self.key_hash,
            hex::encode(&self.value)
        )
    }
}
