// Copyright (C) 2023, Ava Labs, Inc. All rights reserved.
// See the file LICENSE.md for licensing terms.

use std::fmt::{self, Debug, Display};

use serde::{
    de::{SeqAccess, Visitor},
    Deserialize, Serialize,
};
use thiserror::Error;

use crate::commitment::HashFunction;

/// Length in bytes of every digest handled by the tree.
pub const HASH_LEN: usize = 32;

/// Returned when a slice of the wrong length is offered as a hash or key hash.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[error("expected {HASH_LEN} bytes, got {0}")]
pub struct InvalidHashLength(pub usize);

/// A node hash inside the tree: either a commitment produced by the
/// [`CommitmentScheme`](crate::CommitmentScheme) or the scheme's null hash.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TrieHash([u8; HASH_LEN]);

impl TrieHash {
    /// The all-zeroes digest, used by the classic scheme as the empty-tree root.
    pub const ZERO: TrieHash = TrieHash([0; HASH_LEN]);

    /// Wrap raw digest bytes.
    pub const fn new(bytes: [u8; HASH_LEN]) -> Self {
        TrieHash(bytes)
    }

    /// The digest bytes.
    pub const fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    /// Consume the hash, returning the raw bytes.
    pub const fn into_inner(self) -> [u8; HASH_LEN] {
        self.0
    }

    /// True for the all-zeroes digest.
    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

impl Debug for TrieHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl Display for TrieHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl AsRef<[u8]> for TrieHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; HASH_LEN]> for TrieHash {
    fn from(value: [u8; HASH_LEN]) -> Self {
        TrieHash(value)
    }
}

impl TryFrom<&[u8]> for TrieHash {
    type Error = InvalidHashLength;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let bytes: [u8; HASH_LEN] = value
            .try_into()
            .map_err(|_| InvalidHashLength(value.len()))?;
        Ok(TrieHash(bytes))
    }
}

impl Serialize for TrieHash {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for TrieHash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer
            .deserialize_bytes(BytesVisitor)
            .map(TrieHash::new)
    }
}

/// The hash of an application key, fixed at [`HASH_LEN`] bytes.
///
/// The tree operates on key hashes only; callers hash or otherwise encode
/// their domain keys upstream. The nibbles of the key hash spell out the
/// root-to-leaf path, most significant nibble first.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KeyHash([u8; HASH_LEN]);

impl KeyHash {
    /// Number of nibbles in a key hash, which is also the maximum tree depth.
    pub const NIBBLES: usize = HASH_LEN * 2;

    /// Wrap an already-hashed key.
    pub const fn new(bytes: [u8; HASH_LEN]) -> Self {
        KeyHash(bytes)
    }

    /// Wrap a slice, rejecting any length other than [`HASH_LEN`].
    pub fn from_slice(bytes: &[u8]) -> Result<Self, InvalidHashLength> {
        let bytes: [u8; HASH_LEN] = bytes
            .try_into()
            .map_err(|_| InvalidHashLength(bytes.len()))?;
        Ok(KeyHash(bytes))
    }

    /// Hash a raw application key with `H`. Convenience for callers that do
    /// not keep pre-hashed keys around; the tree itself never calls this.
    pub fn digest<H: HashFunction>(hasher: &H, key: &[u8]) -> Self {
        KeyHash(hasher.hash(key).into_inner())
    }

    /// The key-hash bytes.
    pub const fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    /// The nibble at `index`, high nibble of each byte first.
    ///
    /// # Panics
    ///
    /// Panics if `index >= Self::NIBBLES`.
    #[allow(clippy::indexing_slicing)]
    pub fn nibble(&self, index: usize) -> u8 {
        let byte = self.0[index / 2];
        if index % 2 == 0 {
            byte >> 4
        } else {
            byte & 0x0f
        }
    }

    /// Iterate over all [`Self::NIBBLES`] nibbles in path order.
    pub fn nibbles(&self) -> impl Iterator<Item = u8> + '_ {
        (0..Self::NIBBLES).map(|i| self.nibble(i))
    }

    /// Length of the shared nibble prefix of two key hashes.
    pub fn common_prefix_nibbles(&self, other: &KeyHash) -> usize {
        self.nibbles()
            .zip(other.nibbles())
            .take_while(|(a, b)| a == b)
            .count()
    }
}

impl Debug for KeyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl AsRef<[u8]> for KeyHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; HASH_LEN]> for KeyHash {
    fn from(value: [u8; HASH_LEN]) -> Self {
        KeyHash(value)
    }
}

impl Serialize for KeyHash {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for KeyHash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer
            .deserialize_bytes(BytesVisitor)
            .map(KeyHash::new)
    }
}

struct BytesVisitor;

impl<'de> Visitor<'de> for BytesVisitor {
    type Value = [u8; HASH_LEN];

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{HASH_LEN} hash bytes")
    }

    fn visit_bytes<E>(self, v: &[u8]) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        v.try_into()
            .map_err(|_| serde::de::Error::invalid_length(v.len(), &self))
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut bytes = [0; HASH_LEN];
        for (idx, dest) in bytes.iter_mut().enumerate() {
            match seq.next_element()? {
                Some(byte) => *dest = byte,
                None => return Err(serde::de::Error::invalid_length(idx, &self)),
            }
        }
        Ok(bytes)
    }
}

#[cfg(test)]
#[allow(clippy::indexing_slicing, clippy::unwrap_used)]
mod tests {
    use super::*;
    use hex_literal::hex;
    use test_case::test_case;

    #[test]
    fn nibble_order_is_high_first() {
        let key = KeyHash::new(hex!(
            "a1b2000000000000000000000000000000000000000000000000000000000000"
        ));
        assert_eq!(key.nibble(0), 0xa);
        assert_eq!(key.nibble(1), 0x1);
        assert_eq!(key.nibble(2), 0xb);
        assert_eq!(key.nibble(3), 0x2);
    }

    #[test_case(&[0u8; 31]; "short")]
    #[test_case(&[0u8; 33]; "long")]
    #[test_case(&[]; "empty")]
    fn bad_lengths_rejected(bytes: &[u8]) {
        assert_eq!(
            KeyHash::from_slice(bytes).unwrap_err(),
            InvalidHashLength(bytes.len())
        );
        assert!(TrieHash::try_from(bytes).is_err());
    }

    #[test]
    fn common_prefix() {
        let a = KeyHash::new(hex!(
            "1234500000000000000000000000000000000000000000000000000000000000"
        ));
        let b = KeyHash::new(hex!(
            "1234f00000000000000000000000000000000000000000000000000000000000"
        ));
        assert_eq!(a.common_prefix_nibbles(&b), 4);
        assert_eq!(a.common_prefix_nibbles(&a), KeyHash::NIBBLES);
    }

    #[test]
    fn hash_serde_roundtrip() {
        let hash = TrieHash::new([7; HASH_LEN]);
        let bytes = bincode::serialize(&hash).unwrap();
        let back: TrieHash = bincode::deserialize(&bytes).unwrap();
        assert_eq!(hash, back);
    }

    #[test]
    fn zero_is_zero() {
        assert!(TrieHash::ZERO.is_zero());
        assert!(!TrieHash::new([1; HASH_LEN]).is_zero());
        assert_eq!(format!("{:?}", TrieHash::ZERO), "0".repeat(64));
    }
}
