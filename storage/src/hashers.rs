// Copyright (C) 2023, Ava Labs, Inc. All rights reserved.
// See the file LICENSE.md for licensing terms.

//! Digest implementations behind [`HashFunction`].

use blake2::digest::consts::U32;
use blake2::digest::Digest;
use sha2::Sha256 as Sha256Digest;

use crate::commitment::HashFunction;
use crate::trie_hash::TrieHash;

type Blake2bDigest = blake2::Blake2b<U32>;

/// Blake2b with a 256-bit output, the default digest.
#[derive(Clone, Copy, Debug, Default)]
pub struct Blake2b256;

impl HashFunction for Blake2b256 {
    fn hash_parts(&self, parts: &[&[u8]]) -> TrieHash {
        let mut hasher = Blake2bDigest::new();
        for part in parts {
            hasher.update(part);
        }
        TrieHash::new(hasher.finalize().into())
    }
}

/// SHA-256, for deployments that standardize on the SHA-2 family.
#[derive(Clone, Copy, Debug, Default)]
pub struct Sha256;

impl HashFunction for Sha256 {
    fn hash_parts(&self, parts: &[&[u8]]) -> TrieHash {
        let mut hasher = Sha256Digest::new();
        for part in parts {
            hasher.update(part);
        }
        TrieHash::new(hasher.finalize().into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(&Blake2b256; "blake2b")]
    #[test_case(&Sha256; "sha256")]
    fn parts_concatenate(hasher: &dyn HashFunction) {
        let joined = hasher.hash(b"hello world");
        let split = hasher.hash_parts(&[b"hello", b" ", b"world"]);
        assert_eq!(joined, split);
        assert_eq!(joined, hasher.hash_parts(&[b"hello world", b""]));
    }

    #[test]
    fn digests_disagree_across_algorithms() {
        assert_ne!(Blake2b256.hash(b"x"), Sha256.hash(b"x"));
        assert_ne!(Blake2b256.hash(b""), TrieHash::ZERO);
    }
}
