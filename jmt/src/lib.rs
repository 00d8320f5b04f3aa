// Copyright (C) 2023, Ava Labs, Inc. All rights reserved.
// See the file LICENSE.md for licensing terms.

#![warn(missing_debug_implementations, rust_2018_idioms, missing_docs)]
#![deny(unsafe_code)]

//! # jmt is a versioned Jellyfish Merkle Tree
//!
//! A radix-16 authenticated index from pre-hashed 256-bit keys to byte
//! values. Every batch of writes commits a new version; unchanged subtrees
//! are shared with earlier versions, so any historical root remains
//! readable and provable until its history is pruned. Persistence goes
//! through the [`storage::TreeStore`] contract, and hashing through an
//! injected [`storage::CommitmentScheme`].
//!
//! ```
//! use jmt::JellyfishMerkleTree;
//! use jmt::storage::{KeyHash, MemoryStore};
//!
//! # fn main() -> Result<(), jmt::JmtError> {
//! let tree = JellyfishMerkleTree::new(MemoryStore::default());
//! let key = KeyHash::new([0xab; 32]);
//! let commit = tree.put([(key, b"value".to_vec())], 1)?;
//!
//! assert_eq!(tree.get(&key, 1)?.as_deref(), Some(b"value".as_slice()));
//!
//! let proof = tree.get_proof(&key, 1)?.expect("version 1 is committed");
//! assert!(proof.verify(tree.scheme(), &key, Some(b"value"), &commit.root_hash));
//! # Ok(())
//! # }
//! ```

mod cache;
mod proof;
mod tree;

pub use proof::{BranchStep, Proof, ProofError, ProofKind, ProofLeaf};
pub use tree::{CommitResult, JellyfishMerkleTree, JmtError};

// The node model, store contract, and commitment schemes live one crate
// down; re-export it whole so callers need a single dependency.
pub use storage;
