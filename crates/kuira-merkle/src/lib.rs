//! Append-only Merkle accumulator over 32-byte digests.
//!
//! - Default depth: 32 (matching the on-chain commitment tree)
//! - Node hash: SHA-256 with an internal-node domain prefix
//! - Zero hashes: pre-computed for levels 0..=depth
//! - Optimized: empty subtrees short-circuit to pre-computed zero hashes

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const TREE_DEPTH_DEFAULT: usize = 32;

/// Domain prefix for internal nodes, so a node can never be replayed as a
/// leaf.
const NODE_PREFIX: u8 = 0x01;

pub type Hash32 = [u8; 32];

fn hash_nodes(left: &Hash32, right: &Hash32) -> Hash32 {
    let mut hasher = Sha256::new();
    hasher.update([NODE_PREFIX]);
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

/// Pre-computed zero hashes for levels 0..=depth.
///
/// zero_hash[0] = 0 (empty leaf)
/// zero_hash[i] = H(zero_hash[i-1], zero_hash[i-1])
fn zero_hashes(depth: usize) -> Vec<Hash32> {
    let mut hashes = Vec::with_capacity(depth + 1);
    hashes.push([0u8; 32]);
    for _ in 0..depth {
        let prev = *hashes.last().expect("seeded with the empty leaf");
        hashes.push(hash_nodes(&prev, &prev));
    }
    hashes
}

/// A Merkle proof for a single leaf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    pub leaf_index: usize,
    /// Path: [leaf_value, sibling_at_level_0, ..., sibling_at_level_(depth-1)]
    pub path: Vec<Hash32>,
}

/// In-memory append-only Merkle tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerkleTree {
    depth: usize,
    leaves: Vec<Hash32>,
    #[serde(skip)]
    zero_cache: Vec<Hash32>,
}

impl MerkleTree {
    pub fn new(depth: Option<usize>) -> Self {
        let depth = depth.unwrap_or(TREE_DEPTH_DEFAULT).max(1);
        Self {
            depth,
            leaves: Vec::new(),
            zero_cache: zero_hashes(depth),
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    pub fn leaf(&self, index: usize) -> Option<&Hash32> {
        self.leaves.get(index)
    }

    fn zero_hash(&self, level: usize) -> Hash32 {
        // The cache is skipped by serde; rebuild lazily after deserialize.
        if self.zero_cache.len() == self.depth + 1 {
            self.zero_cache[level]
        } else {
            zero_hashes(self.depth)[level]
        }
    }

    /// Rebuild the zero-hash cache after deserialization.
    pub fn rehydrate(&mut self) {
        if self.zero_cache.len() != self.depth + 1 {
            self.zero_cache = zero_hashes(self.depth);
        }
    }

    pub fn root(&self) -> Hash32 {
        self.node(self.depth, 0)
    }

    /// Append one leaf at the next free index; returns its index.
    pub fn push(&mut self, leaf: Hash32) -> usize {
        self.leaves.push(leaf);
        self.leaves.len() - 1
    }

    /// Append leaves at explicit indices. Indices must be contiguous,
    /// starting at the current leaf count.
    pub fn append_at(&mut self, input: &[(usize, Hash32)]) -> Result<(), String> {
        if input.is_empty() {
            return Ok(());
        }
        let mut sorted: Vec<_> = input.to_vec();
        sorted.sort_by_key(|(idx, _)| *idx);

        let mut expected = self.leaves.len();
        for (idx, leaf) in sorted {
            if idx != expected {
                return Err(format!(
                    "non-contiguous merkle leaves: expected index {expected}, got {idx}"
                ));
            }
            self.leaves.push(leaf);
            expected += 1;
        }
        Ok(())
    }

    /// Build a proof for one leaf index.
    pub fn prove(&self, index: usize) -> Option<MerkleProof> {
        if index >= self.leaves.len() {
            return None;
        }
        let mut path = Vec::with_capacity(self.depth + 1);
        let mut pos = index;

        // First element: the leaf itself.
        path.push(self.node(0, pos));

        for level in 0..self.depth {
            let sibling_pos = pos ^ 1;
            path.push(self.node(level, sibling_pos));
            pos /= 2;
        }

        Some(MerkleProof { leaf_index: index, path })
    }

    /// Compute or retrieve a node hash at (level, position).
    ///
    /// If the subtree at this position is entirely empty, returns the
    /// pre-computed zero hash for this level.
    fn node(&self, level: usize, position: usize) -> Hash32 {
        if level == 0 {
            return if position < self.leaves.len() {
                self.leaves[position]
            } else {
                self.zero_hash(0)
            };
        }

        let first_leaf_in_subtree = position << level;
        if first_leaf_in_subtree >= self.leaves.len() {
            return self.zero_hash(level);
        }

        let left = self.node(level - 1, position * 2);
        let right = self.node(level - 1, position * 2 + 1);
        hash_nodes(&left, &right)
    }

    /// Verify a proof against the current root.
    pub fn verify(&self, proof: &MerkleProof) -> bool {
        if proof.path.len() != self.depth + 1 {
            return false;
        }

        let mut current = proof.path[0];
        let mut pos = proof.leaf_index;

        for level in 0..self.depth {
            let sibling = proof.path[level + 1];
            current = if pos % 2 == 0 {
                hash_nodes(&current, &sibling)
            } else {
                hash_nodes(&sibling, &current)
            };
            pos /= 2;
        }

        current == self.root()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(n: u8) -> Hash32 {
        let mut out = [0u8; 32];
        out[0] = n;
        out
    }

    #[test]
    fn empty_tree_root_is_zero_hash() {
        let tree = MerkleTree::new(Some(8));
        assert_eq!(tree.root(), zero_hashes(8)[8]);
    }

    #[test]
    fn root_changes_on_append() {
        let mut tree = MerkleTree::new(Some(8));
        let empty_root = tree.root();
        tree.push(leaf(1));
        assert_ne!(tree.root(), empty_root);
    }

    #[test]
    fn proofs_verify_and_reject_tampering() {
        let mut tree = MerkleTree::new(Some(8));
        for i in 0..5 {
            tree.push(leaf(i));
        }
        for i in 0..5 {
            let proof = tree.prove(i as usize).unwrap();
            assert!(tree.verify(&proof), "proof for leaf {i} should verify");
        }

        let mut bad = tree.prove(2).unwrap();
        bad.path[0] = leaf(9);
        assert!(!tree.verify(&bad));
    }

    #[test]
    fn proof_for_missing_leaf_is_none() {
        let tree = MerkleTree::new(Some(8));
        assert!(tree.prove(0).is_none());
    }

    #[test]
    fn append_at_requires_contiguity() {
        let mut tree = MerkleTree::new(Some(8));
        tree.append_at(&[(0, leaf(1)), (1, leaf(2))]).unwrap();
        assert_eq!(tree.leaf_count(), 2);
        assert!(tree.append_at(&[(5, leaf(3))]).is_err());
    }

    #[test]
    fn depth_32_single_leaf_is_tractable() {
        let mut tree = MerkleTree::new(Some(32));
        tree.push(leaf(42));
        let proof = tree.prove(0).unwrap();
        assert!(tree.verify(&proof));
    }

    #[test]
    fn serde_round_trip_preserves_root() {
        let mut tree = MerkleTree::new(Some(8));
        for i in 0..3 {
            tree.push(leaf(i));
        }
        let bytes = serde_json::to_vec(&tree).unwrap();
        let mut back: MerkleTree = serde_json::from_slice(&bytes).unwrap();
        back.rehydrate();
        assert_eq!(back.root(), tree.root());
    }
}
