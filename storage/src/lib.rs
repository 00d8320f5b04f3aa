// Copyright (C) 2023, Ava Labs, Inc. All rights reserved.
// See the file LICENSE.md for licensing terms.

#![warn(missing_debug_implementations, rust_2018_idioms, missing_docs)]
#![deny(unsafe_code)]

//! # storage implements the node model and store contract for a versioned Merkle tree
//!
//! Nodes are addressed by [`NodeKey`], the commit version plus the nibble
//! path from the root. A [`TreeStore`] persists one atomic [`NodeBatch`] per
//! committed version and never rewrites history; shadowed nodes are marked
//! stale and released by pruning.
//!
//! A [`CommitmentScheme`] maps nodes to the hashes their parents record for
//! them, with [`DefaultScheme`] (Blake2b-256 over the classic preimage
//! layout) as the stock configuration.

mod cached;
mod commitment;
mod hashers;
mod memory;
mod node;
mod node_key;
mod path;
mod store;
mod trie_hash;

/// Logger module for handling logging functionality
pub mod logger;

// re-export these so callers don't need to know where they are
pub use cached::CachedStore;
pub use commitment::{node_hash, ClassicScheme, CommitmentScheme, DefaultScheme, HashFunction};
pub use hashers::{Blake2b256, Sha256};
pub use memory::{MemoryStore, MemoryStoreConfig};
pub use node::{Child, InternalNode, LeafNode, Node};
pub use node_key::{NodeKey, StaleNodeKey, Version};
pub use path::NibblePath;
pub use store::{NodeBatch, PrunePolicy, StoreError, TreeStore};
pub use trie_hash::{InvalidHashLength, KeyHash, TrieHash, HASH_LEN};

#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils {
    //! Helpers shared by unit and integration tests.

    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    /// A reproducible RNG for randomized tests. Honors `JMT_TEST_SEED` so a
    /// failing run can be replayed.
    #[allow(clippy::expect_used)]
    pub fn seeded_rng() -> StdRng {
        let seed = std::env::var("JMT_TEST_SEED").ok().map_or_else(
            || rand::thread_rng().gen(),
            |seed| {
                str::parse(&seed).expect("couldn't parse JMT_TEST_SEED; must be a u64")
            },
        );
        eprintln!("seed {seed}: to rerun with this data, export JMT_TEST_SEED={seed}");
        StdRng::seed_from_u64(seed)
    }
}
