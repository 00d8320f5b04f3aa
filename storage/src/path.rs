// Copyright (C) 2023, Ava Labs, Inc. All rights reserved.
// See the file LICENSE.md for licensing terms.

use std::fmt::{self, Debug, Display};

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::KeyHash;

/// A nibble prefix locating a node: the branch indices taken from the root,
/// most significant nibble of the key hash first.
///
/// Paths order lexicographically with a prefix sorting before its extensions,
/// which is what keeps [`NodeKey`](crate::NodeKey) ranges contiguous per
/// subtree. Every element is a nibble (`0..=15`); the maximum length is
/// [`NibblePath::MAX_NIBBLES`], one level per nibble of the key hash.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
pub struct NibblePath(SmallVec<[u8; 64]>);

impl NibblePath {
    /// Maximum path length, matching the tree's maximum depth.
    pub const MAX_NIBBLES: usize = KeyHash::NIBBLES;

    /// The empty path, locating the root.
    pub fn new() -> Self {
        NibblePath(SmallVec::new())
    }

    /// Collect a path from nibbles. Values are masked to their low 4 bits.
    ///
    /// # Panics
    ///
    /// Panics if the iterator yields more than [`Self::MAX_NIBBLES`] nibbles.
    pub fn from_nibbles<I: IntoIterator<Item = u8>>(nibbles: I) -> Self {
        let mut path = NibblePath::new();
        for nibble in nibbles {
            path.push(nibble);
        }
        path
    }

    /// The first `len` nibbles of `key` as a path.
    ///
    /// # Panics
    ///
    /// Panics if `len > Self::MAX_NIBBLES`.
    pub fn key_prefix(key: &KeyHash, len: usize) -> Self {
        assert!(len <= Self::MAX_NIBBLES, "prefix longer than a key hash");
        NibblePath(key.nibbles().take(len).collect())
    }

    /// The nibbles of `key` from `start` to the end: the part of the key a
    /// leaf stored at depth `start` still has to spell out.
    ///
    /// # Panics
    ///
    /// Panics if `start > Self::MAX_NIBBLES`.
    pub fn key_suffix(key: &KeyHash, start: usize) -> Self {
        assert!(start <= Self::MAX_NIBBLES, "suffix starts past the key hash");
        NibblePath(key.nibbles().skip(start).collect())
    }

    /// Number of nibbles in this path.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True for the root path.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The nibble at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.len()`.
    #[allow(clippy::indexing_slicing)]
    pub fn nibble(&self, index: usize) -> u8 {
        self.0[index]
    }

    /// Append one nibble (masked to its low 4 bits).
    ///
    /// # Panics
    ///
    /// Panics if the path is already [`Self::MAX_NIBBLES`] long.
    pub fn push(&mut self, nibble: u8) {
        assert!(
            self.0.len() < Self::MAX_NIBBLES,
            "path deeper than a key hash"
        );
        self.0.push(nibble & 0x0f);
    }

    /// This path extended by one nibble: the location of the child in that
    /// branch slot.
    pub fn child(&self, nibble: u8) -> Self {
        let mut path = self.clone();
        path.push(nibble);
        path
    }

    /// Iterate over the nibbles in root-to-leaf order.
    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        self.0.iter().copied()
    }

    /// True if `key`'s nibbles start with this path. Every leaf must satisfy
    /// this for the path it is stored under.
    pub fn is_prefix_of_key(&self, key: &KeyHash) -> bool {
        self.0.len() <= Self::MAX_NIBBLES
            && self.iter().zip(key.nibbles()).all(|(a, b)| a == b)
    }
}

impl Display for NibblePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for nibble in self.iter() {
            write!(f, "{nibble:x}")?;
        }
        Ok(())
    }
}

impl Debug for NibblePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            f.write_str("(root)")
        } else {
            Display::fmt(self, f)
        }
    }
}

impl FromIterator<u8> for NibblePath {
    fn from_iter<I: IntoIterator<Item = u8>>(iter: I) -> Self {
        Self::from_nibbles(iter)
    }
}

impl<'de> Deserialize<'de> for NibblePath {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let nibbles: SmallVec<[u8; 64]> = Deserialize::deserialize(deserializer)?;
        if nibbles.len() > Self::MAX_NIBBLES {
            return Err(serde::de::Error::custom("path deeper than a key hash"));
        }
        if nibbles.iter().any(|&n| n > 0x0f) {
            return Err(serde::de::Error::custom("path element is not a nibble"));
        }
        Ok(NibblePath(nibbles))
    }
}

#[cfg(test)]
#[allow(clippy::indexing_slicing, clippy::unwrap_used)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn prefix_sorts_before_extension() {
        let a = NibblePath::from_nibbles([0xa]);
        let ab = NibblePath::from_nibbles([0xa, 0xb]);
        let b = NibblePath::from_nibbles([0xb]);
        assert!(a < ab);
        assert!(ab < b);
        assert!(NibblePath::new() < a);
    }

    #[test]
    fn child_extends() {
        let root = NibblePath::new();
        let child = root.child(0x3);
        assert_eq!(child.len(), 1);
        assert_eq!(child.nibble(0), 0x3);
        assert_eq!(child.to_string(), "3");
        assert!(root.is_empty());
    }

    #[test]
    fn key_prefix_matches_key() {
        let key = KeyHash::new(hex!(
            "deadbeef00000000000000000000000000000000000000000000000000000000"
        ));
        let path = NibblePath::key_prefix(&key, 5);
        assert_eq!(path.to_string(), "deadb");
        assert!(path.is_prefix_of_key(&key));

        let other = KeyHash::new([0; 32]);
        assert!(!path.is_prefix_of_key(&other));
        assert!(NibblePath::new().is_prefix_of_key(&other));
    }

    #[test]
    fn prefix_and_suffix_cover_the_key() {
        let key = KeyHash::new(hex!(
            "deadbeef00000000000000000000000000000000000000000000000000000000"
        ));
        for split in [0, 1, 7, KeyHash::NIBBLES] {
            let mut whole = NibblePath::key_prefix(&key, split);
            for nibble in NibblePath::key_suffix(&key, split).iter() {
                whole.push(nibble);
            }
            assert_eq!(whole, NibblePath::key_prefix(&key, KeyHash::NIBBLES));
        }
        assert!(NibblePath::key_suffix(&key, KeyHash::NIBBLES).is_empty());
    }

    #[test]
    fn push_masks_to_nibble() {
        let path = NibblePath::from_nibbles([0xff, 0x10]);
        assert_eq!(path.nibble(0), 0xf);
        assert_eq!(path.nibble(1), 0x0);
    }

    #[test]
    fn serde_rejects_non_nibbles() {
        let path = NibblePath::from_nibbles([1, 2, 3]);
        let bytes = bincode::serialize(&path).unwrap();
        let back: NibblePath = bincode::deserialize(&bytes).unwrap();
        assert_eq!(path, back);

        let raw: SmallVec<[u8; 64]> = SmallVec::from_slice(&[0x10]);
        let bytes = bincode::serialize(&raw).unwrap();
        assert!(bincode::deserialize::<NibblePath>(&bytes).is_err());
    }

    #[test]
    #[should_panic(expected = "deeper than a key hash")]
    fn push_past_max_panics() {
        let mut path = NibblePath::from_nibbles((0..64).map(|i| i as u8));
        path.push(0);
    }
}
