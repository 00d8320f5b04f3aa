// Copyright (C) 2023, Ava Labs, Inc. All rights reserved.
// See the file LICENSE.md for licensing terms.

//! Authenticated lookup proofs and their wire encoding.
//!
//! A [`Proof`] carries the sibling hashes along one descent path plus what
//! the descent ended at: the proven leaf, a different leaf squatting on the
//! key's path, or nothing. Verification replays the commitments bottom-up
//! against a caller-supplied root hash and never touches a store, so proofs
//! can be checked by parties that hold nothing but the root.
//!
//! The wire format is independent of any store's node encoding and fixed by
//! the leading version byte:
//!
//! ```text
//! version(1) terminal steps
//! terminal = 0x00 | 0x01 key_hash(32) value_hash(32)
//! steps    = count(1) step*
//! step     = index(1) bitmap(2, big-endian) sibling_hash(32)*
//! ```
//!
//! Steps run deepest first. A step's bitmap marks which sibling slots are
//! occupied, low bit for slot 0, and the hashes follow in slot order; the
//! path's own slot is never listed.

use storage::{CommitmentScheme, InternalNode, KeyHash, NibblePath, TrieHash};
use thiserror::Error;

/// Proof payloads begin with this wire format version byte.
const WIRE_VERSION: u8 = 1;

const TERMINAL_EMPTY: u8 = 0;
const TERMINAL_LEAF: u8 = 1;

/// Ways a proof payload can fail to decode.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProofError {
    /// The payload ended before the structure it announced.
    #[error("proof bytes end early")]
    Truncated,
    /// Bytes were left over after the announced structure.
    #[error("{0} bytes left over after the proof")]
    TrailingBytes(usize),
    /// The leading version byte is not one this build understands.
    #[error("unsupported proof wire version {0}")]
    UnsupportedVersion(u8),
    /// The terminal tag byte is unknown.
    #[error("unknown proof terminal tag {0}")]
    BadTerminalTag(u8),
    /// A branch step's child index is not a nibble.
    #[error("branch step index {0} is not a nibble")]
    BadStepIndex(u8),
    /// A branch step claims a sibling in the slot the path itself takes.
    #[error("branch step lists a sibling in its own slot {0}")]
    OccupiedPathSlot(u8),
    /// More branch steps than nibbles in a key hash.
    #[error("{0} branch steps exceed the key depth")]
    TooManySteps(usize),
}

/// One internal node along a proof path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BranchStep {
    index: u8,
    siblings: [Option<TrieHash>; InternalNode::MAX_CHILDREN],
}

impl BranchStep {
    pub(crate) fn new(index: u8, siblings: [Option<TrieHash>; InternalNode::MAX_CHILDREN]) -> Self {
        debug_assert!(usize::from(index) < InternalNode::MAX_CHILDREN);
        debug_assert!(
            siblings.get(usize::from(index)).is_some_and(Option::is_none),
            "the path's own slot must stay empty"
        );
        BranchStep { index, siblings }
    }

    /// The child slot the path takes at this node.
    pub fn index(&self) -> u8 {
        self.index
    }

    /// Hashes of the node's other children. The slot at [`Self::index`] is
    /// always `None`; verification fills it with the hash computed below.
    pub fn siblings(&self) -> &[Option<TrieHash>; InternalNode::MAX_CHILDREN] {
        &self.siblings
    }
}

/// The leaf a proof path ended at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProofLeaf {
    /// The full key hash stored in the leaf.
    pub key_hash: KeyHash,
    /// The digest of the leaf's value under the tree's commitment scheme.
    pub value_hash: TrieHash,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum ProofTerminal {
    Leaf(ProofLeaf),
    Empty,
}

/// What a proof demonstrates about the key it was requested for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProofKind {
    /// The key maps to the claimed value.
    Inclusion,
    /// The descent ended in an empty child slot, so no leaf exists under
    /// the key.
    AbsentEmptySlot,
    /// The descent ended at a leaf for a different key that occupies the
    /// key's path.
    AbsentOtherLeaf,
}

/// A self-contained proof of membership or absence for one key at one
/// version.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Proof {
    /// Branch steps from the node nearest the terminal up to the root.
    steps: Vec<BranchStep>,
    terminal: ProofTerminal,
}

impl Proof {
    pub(crate) fn new(steps: Vec<BranchStep>, terminal: ProofTerminal) -> Self {
        Proof { steps, terminal }
    }

    /// The branch steps, deepest first.
    pub fn steps(&self) -> &[BranchStep] {
        &self.steps
    }

    /// The leaf the path ended at, if it ended at one.
    pub fn leaf(&self) -> Option<&ProofLeaf> {
        match &self.terminal {
            ProofTerminal::Leaf(leaf) => Some(leaf),
            ProofTerminal::Empty => None,
        }
    }

    /// Classifies what this proof says about `key`.
    pub fn kind(&self, key: &KeyHash) -> ProofKind {
        match &self.terminal {
            ProofTerminal::Leaf(leaf) if leaf.key_hash == *key => ProofKind::Inclusion,
            ProofTerminal::Leaf(_) => ProofKind::AbsentOtherLeaf,
            ProofTerminal::Empty => ProofKind::AbsentEmptySlot,
        }
    }

    /// Checks this proof against a trusted `root_hash`.
    ///
    /// Returns true only if the proof is well formed and demonstrates the
    /// exact claim made by `expected_value`: `Some(v)` claims the key maps
    /// to `v`, `None` claims the key is absent. Any mismatch, including a
    /// malformed proof, is false rather than an error.
    pub fn verify<C: CommitmentScheme>(
        &self,
        scheme: &C,
        key: &KeyHash,
        expected_value: Option<&[u8]>,
        root_hash: &TrieHash,
    ) -> bool {
        let depth = self.steps.len();
        if depth > KeyHash::NIBBLES {
            return false;
        }

        // The terminal fixes the claim; start the fold with its commitment.
        let mut current = match (&self.terminal, expected_value) {
            (ProofTerminal::Leaf(leaf), Some(value)) if leaf.key_hash == *key => {
                if scheme.value_hash(value) != leaf.value_hash {
                    return false;
                }
                let suffix = NibblePath::key_suffix(key, depth);
                Some(scheme.commit_leaf(&suffix, &leaf.value_hash))
            }
            (ProofTerminal::Leaf(leaf), None) if leaf.key_hash != *key => {
                // A neighbor leaf proves absence only if it actually lives
                // on the queried key's path.
                if key.common_prefix_nibbles(&leaf.key_hash) < depth {
                    return false;
                }
                let suffix = NibblePath::key_suffix(&leaf.key_hash, depth);
                Some(scheme.commit_leaf(&suffix, &leaf.value_hash))
            }
            (ProofTerminal::Empty, None) => None,
            _ => return false,
        };

        for (position, step) in self.steps.iter().enumerate() {
            let step_depth = depth - 1 - position;
            if step.index != key.nibble(step_depth) {
                return false;
            }
            let index = usize::from(step.index);
            match step.siblings.get(index) {
                Some(None) => {}
                _ => return false,
            }
            let mut slots = step.siblings;
            if let (Some(hash), Some(slot)) = (current, slots.get_mut(index)) {
                *slot = Some(hash);
            }
            current = Some(scheme.commit_internal(&slots));
        }

        match current {
            Some(hash) => hash == *root_hash,
            None => *root_hash == scheme.null_hash(),
        }
    }

    /// Serializes the proof into its wire format.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        out.push(WIRE_VERSION);
        match &self.terminal {
            ProofTerminal::Empty => out.push(TERMINAL_EMPTY),
            ProofTerminal::Leaf(leaf) => {
                out.push(TERMINAL_LEAF);
                out.extend_from_slice(leaf.key_hash.as_bytes());
                out.extend_from_slice(leaf.value_hash.as_bytes());
            }
        }
        out.push(self.steps.len() as u8);
        for step in &self.steps {
            out.push(step.index);
            let mut bitmap: u16 = 0;
            for (slot, sibling) in step.siblings.iter().enumerate() {
                if sibling.is_some() {
                    bitmap |= 1 << slot;
                }
            }
            out.extend_from_slice(&bitmap.to_be_bytes());
            for sibling in step.siblings.iter().flatten() {
                out.extend_from_slice(sibling.as_bytes());
            }
        }
        out
    }

    /// Parses a proof from its wire format.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProofError> {
        let mut reader = Reader { bytes };
        let version = reader.byte()?;
        if version != WIRE_VERSION {
            return Err(ProofError::UnsupportedVersion(version));
        }
        let terminal = match reader.byte()? {
            TERMINAL_EMPTY => ProofTerminal::Empty,
            TERMINAL_LEAF => ProofTerminal::Leaf(ProofLeaf {
                key_hash: KeyHash::new(reader.array()?),
                value_hash: TrieHash::new(reader.array()?),
            }),
            tag => return Err(ProofError::BadTerminalTag(tag)),
        };
        let count = usize::from(reader.byte()?);
        if count > KeyHash::NIBBLES {
            return Err(ProofError::TooManySteps(count));
        }
        let mut steps = Vec::with_capacity(count);
        for _ in 0..count {
            let index = reader.byte()?;
            if usize::from(index) >= InternalNode::MAX_CHILDREN {
                return Err(ProofError::BadStepIndex(index));
            }
            let bitmap = u16::from_be_bytes(reader.array()?);
            if bitmap & (1 << index) != 0 {
                return Err(ProofError::OccupiedPathSlot(index));
            }
            let mut siblings = [None; InternalNode::MAX_CHILDREN];
            for (slot, sibling) in siblings.iter_mut().enumerate() {
                if bitmap & (1 << slot) != 0 {
                    *sibling = Some(TrieHash::new(reader.array()?));
                }
            }
            steps.push(BranchStep { index, siblings });
        }
        if !reader.bytes.is_empty() {
            return Err(ProofError::TrailingBytes(reader.bytes.len()));
        }
        Ok(Proof { steps, terminal })
    }

    fn encoded_len(&self) -> usize {
        let terminal = match &self.terminal {
            ProofTerminal::Empty => 1,
            ProofTerminal::Leaf(_) => 1 + 2 * storage::HASH_LEN,
        };
        let siblings: usize = self
            .steps
            .iter()
            .map(|step| step.siblings.iter().flatten().count() * storage::HASH_LEN)
            .sum();
        2 + terminal + self.steps.len() * 3 + siblings
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
}

impl<'a> Reader<'a> {
    fn byte(&mut self) -> Result<u8, ProofError> {
        let (first, rest) = self.bytes.split_first().ok_or(ProofError::Truncated)?;
        self.bytes = rest;
        Ok(*first)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], ProofError> {
        if self.bytes.len() < N {
            return Err(ProofError::Truncated);
        }
        let (head, tail) = self.bytes.split_at(N);
        self.bytes = tail;
        head.try_into().map_err(|_| ProofError::Truncated)
    }
}

#[cfg(test)]
#[allow(clippy::indexing_slicing, clippy::unwrap_used)]
mod tests {
    use super::*;
    use storage::{Blake2b256, ClassicScheme, DefaultScheme, HashFunction};
    use test_case::test_case;

    fn scheme() -> DefaultScheme {
        ClassicScheme::new(Blake2b256)
    }

    fn key(lead: u8) -> KeyHash {
        let mut bytes = [0x11; 32];
        bytes[0] = lead;
        KeyHash::new(bytes)
    }

    /// A hand-built single-level tree: two leaves under one root internal.
    /// Returns the root hash and the keys placed at nibbles 0xa and 0xb.
    fn two_leaf_tree() -> (TrieHash, KeyHash, KeyHash, TrieHash, TrieHash) {
        let scheme = scheme();
        let key_a = key(0xa0);
        let key_b = key(0xb0);
        let leaf_a = scheme.commit_leaf(
            &NibblePath::key_suffix(&key_a, 1),
            &scheme.value_hash(b"a"),
        );
        let leaf_b = scheme.commit_leaf(
            &NibblePath::key_suffix(&key_b, 1),
            &scheme.value_hash(b"b"),
        );
        let mut slots = [None; InternalNode::MAX_CHILDREN];
        slots[0xa] = Some(leaf_a);
        slots[0xb] = Some(leaf_b);
        (scheme.commit_internal(&slots), key_a, key_b, leaf_a, leaf_b)
    }

    fn siblings_with(slot: usize, hash: TrieHash) -> [Option<TrieHash>; 16] {
        let mut siblings = [None; InternalNode::MAX_CHILDREN];
        siblings[slot] = Some(hash);
        siblings
    }

    #[test]
    fn empty_tree_proof_verifies_against_null_root() {
        let proof = Proof::new(Vec::new(), ProofTerminal::Empty);
        let null = scheme().null_hash();
        assert_eq!(proof.kind(&key(0)), ProofKind::AbsentEmptySlot);
        assert!(proof.verify(&scheme(), &key(0), None, &null));
        assert!(!proof.verify(&scheme(), &key(0), Some(b"v"), &null));
        assert!(!proof.verify(&scheme(), &key(0), None, &Blake2b256.hash(b"not null")));
    }

    #[test]
    fn single_leaf_inclusion_and_absence() {
        let scheme = scheme();
        let key_a = key(0xa0);
        let root = scheme.commit_leaf(
            &NibblePath::key_suffix(&key_a, 0),
            &scheme.value_hash(b"value"),
        );
        let proof = Proof::new(
            Vec::new(),
            ProofTerminal::Leaf(ProofLeaf {
                key_hash: key_a,
                value_hash: scheme.value_hash(b"value"),
            }),
        );

        assert!(proof.verify(&scheme, &key_a, Some(b"value"), &root));
        assert!(!proof.verify(&scheme, &key_a, Some(b"other"), &root));
        assert!(!proof.verify(&scheme, &key_a, None, &root));

        // The same leaf is the absence witness for every other key.
        let absent = key(0xb0);
        assert_eq!(proof.kind(&absent), ProofKind::AbsentOtherLeaf);
        assert!(proof.verify(&scheme, &absent, None, &root));
        assert!(!proof.verify(&scheme, &absent, Some(b"value"), &root));
    }

    #[test]
    fn branch_inclusion_checks_the_path_nibble() {
        let (root, key_a, _, _, leaf_b) = two_leaf_tree();
        let scheme = scheme();
        let proof = Proof::new(
            vec![BranchStep::new(0xa, siblings_with(0xb, leaf_b))],
            ProofTerminal::Leaf(ProofLeaf {
                key_hash: key_a,
                value_hash: scheme.value_hash(b"a"),
            }),
        );

        assert!(proof.verify(&scheme, &key_a, Some(b"a"), &root));
        // A proof for `key_a` says nothing about a key whose first nibble
        // differs.
        assert!(!proof.verify(&scheme, &key(0xc0), None, &root));
        assert!(!proof.verify(&scheme, &key_a, Some(b"b"), &root));
    }

    #[test]
    fn empty_slot_absence_reuses_the_branch() {
        let (root, _, _, leaf_a, leaf_b) = two_leaf_tree();
        let scheme = scheme();
        let absent = key(0xc0);
        let mut siblings = [None; InternalNode::MAX_CHILDREN];
        siblings[0xa] = Some(leaf_a);
        siblings[0xb] = Some(leaf_b);
        let proof = Proof::new(
            vec![BranchStep::new(0xc, siblings)],
            ProofTerminal::Empty,
        );

        assert_eq!(proof.kind(&absent), ProofKind::AbsentEmptySlot);
        assert!(proof.verify(&scheme, &absent, None, &root));
        assert!(!proof.verify(&scheme, &absent, Some(b"v"), &root));
        // Dropping a sibling breaks the recomputed root.
        let shorn = Proof::new(
            vec![BranchStep::new(0xc, siblings_with(0xa, leaf_a))],
            ProofTerminal::Empty,
        );
        assert!(!shorn.verify(&scheme, &absent, None, &root));
    }

    #[test]
    fn neighbor_leaf_must_share_the_path() {
        let (root, key_a, _, _, leaf_b) = two_leaf_tree();
        let scheme = scheme();
        // key_x diverges from key_a at the very first nibble, so a leaf for
        // key_a cannot witness its absence below a branch step.
        let key_x = key(0xd0);
        let proof = Proof::new(
            vec![BranchStep::new(0xa, siblings_with(0xb, leaf_b))],
            ProofTerminal::Leaf(ProofLeaf {
                key_hash: key_a,
                value_hash: scheme.value_hash(b"a"),
            }),
        );
        assert!(!proof.verify(&scheme, &key_x, None, &root));
    }

    #[test]
    fn roundtrips_through_the_wire_format() {
        let (_, key_a, _, _, leaf_b) = two_leaf_tree();
        let scheme = scheme();
        let proofs = [
            Proof::new(Vec::new(), ProofTerminal::Empty),
            Proof::new(
                vec![
                    BranchStep::new(0xa, siblings_with(0xb, leaf_b)),
                    BranchStep::new(0x1, siblings_with(0xf, leaf_b)),
                ],
                ProofTerminal::Leaf(ProofLeaf {
                    key_hash: key_a,
                    value_hash: scheme.value_hash(b"a"),
                }),
            ),
        ];
        for proof in proofs {
            let bytes = proof.to_bytes();
            assert_eq!(bytes.len(), proof.encoded_len());
            assert_eq!(Proof::from_bytes(&bytes).unwrap(), proof);
        }
    }

    #[test_case(&[] => ProofError::Truncated; "empty payload")]
    #[test_case(&[9, 0, 0] => ProofError::UnsupportedVersion(9); "future version")]
    #[test_case(&[1, 7] => ProofError::BadTerminalTag(7); "unknown terminal")]
    #[test_case(&[1, 0] => ProofError::Truncated; "missing step count")]
    #[test_case(&[1, 0, 0, 0] => ProofError::TrailingBytes(1); "spare byte")]
    #[test_case(&[1, 0, 65] => ProofError::TooManySteps(65); "step overflow")]
    #[test_case(&[1, 0, 1, 16, 0, 0] => ProofError::BadStepIndex(16); "index out of range")]
    #[test_case(&[1, 0, 1, 2, 0, 4] => ProofError::OccupiedPathSlot(2); "self sibling")]
    fn rejects_malformed_payloads(bytes: &[u8]) -> ProofError {
        Proof::from_bytes(bytes).unwrap_err()
    }

    #[test]
    fn tampered_bytes_fail_cleanly() {
        let (_, key_a, _, _, leaf_b) = two_leaf_tree();
        let proof = Proof::new(
            vec![BranchStep::new(0xa, siblings_with(0xb, leaf_b))],
            ProofTerminal::Leaf(ProofLeaf {
                key_hash: key_a,
                value_hash: scheme().value_hash(b"a"),
            }),
        );
        let bytes = proof.to_bytes();
        // Chopping anywhere inside the payload must never panic.
        for len in 0..bytes.len() {
            assert_eq!(Proof::from_bytes(&bytes[..len]), Err(ProofError::Truncated));
        }
    }
}
