//! Binary Merkle tree over transaction hashes
//!
//! Each leaf node holds `sha256(leaf)`, and each parent holds
//! `sha256(left ∥ right)`. Every level with an odd number of nodes is padded
//! by duplicating its last node, so a single leaf is paired with itself. Block hashes do not depend on
//! this tree; it is an independent integrity check over a set of hashes.

use crate::hashing::sha256;
use crate::Hash;

/// Position of a sibling relative to the node being proven
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

/// One step of an inclusion proof
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofStep {
    pub sibling: Hash,
    pub side: Side,
}

#[derive(Debug, Clone)]
pub struct MerkleTree {
    /// Padded levels from the leaves up; the last level holds only the root
    levels: Vec<Vec<Hash>>,
    leaf_count: usize,
}

fn hash_pair(left: &Hash, right: &Hash) -> Hash {
    let mut data = [0u8; 64];
    data[..32].copy_from_slice(left.as_bytes());
    data[32..].copy_from_slice(right.as_bytes());
    sha256(&data)
}

impl MerkleTree {
    /// Build the tree bottom-up; `None` when there are no leaves
    pub fn build(leaves: &[Hash]) -> Option<Self> {
        if leaves.is_empty() {
            return None;
        }

        let mut levels = Vec::new();
        let mut level: Vec<Hash> = leaves.iter().map(|leaf| sha256(leaf.as_bytes())).collect();
        loop {
            if level.len() % 2 == 1 {
                level.push(level[level.len() - 1]);
            }
            let parents: Vec<Hash> = level
                .chunks_exact(2)
                .map(|pair| hash_pair(&pair[0], &pair[1]))
                .collect();
            levels.push(level);
            if parents.len() == 1 {
                levels.push(parents);
                break;
            }
            level = parents;
        }

        Some(Self {
            levels,
            leaf_count: leaves.len(),
        })
    }

    pub fn root_hash(&self) -> Hash {
        // build() always pushes a final single-node level
        self.levels[self.levels.len() - 1][0]
    }

    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    /// Sibling path from leaf `index` to the root
    pub fn proof(&self, index: usize) -> Option<Vec<ProofStep>> {
        if index >= self.leaf_count {
            return None;
        }
        let mut steps = Vec::with_capacity(self.levels.len() - 1);
        let mut position = index;
        for level in &self.levels[..self.levels.len() - 1] {
            let step = if position % 2 == 0 {
                ProofStep {
                    sibling: level[position + 1],
                    side: Side::Right,
                }
            } else {
                ProofStep {
                    sibling: level[position - 1],
                    side: Side::Left,
                }
            };
            steps.push(step);
            position /= 2;
        }
        Some(steps)
    }
}

/// Check that `leaf` hashes up to `root` along `proof`
pub fn verify_proof(leaf: &Hash, proof: &[ProofStep], root: &Hash) -> bool {
    let computed = proof.iter().fold(sha256(leaf.as_bytes()), |acc, step| match step.side {
        Side::Left => hash_pair(&step.sibling, &acc),
        Side::Right => hash_pair(&acc, &step.sibling),
    });
    computed == *root
}
