//! Block data structures and operations

use crate::hashing::sha256;
use crate::merkle::MerkleTree;
use crate::{codec, BlockHeight, CoreError, CoreResult, Hash, Timestamp, Transaction};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Height of the first block in every chain
pub const GENESIS_HEIGHT: BlockHeight = 1;

/// Block contents before the proof-of-work is solved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockTemplate {
    pub height: BlockHeight,
    pub timestamp: Timestamp,
    pub prev_hash: Hash,
    pub transactions: Vec<Transaction>,
}

impl BlockTemplate {
    /// Template stamped with the current time
    pub fn new(height: BlockHeight, prev_hash: Hash, transactions: Vec<Transaction>) -> Self {
        Self {
            height,
            timestamp: chrono::Utc::now().timestamp(),
            prev_hash,
            transactions,
        }
    }

    /// Genesis template holding a single coinbase
    pub fn genesis(coinbase: Transaction) -> CoreResult<Self> {
        if !coinbase.is_coinbase() {
            return Err(CoreError::InvalidTransaction(
                "genesis block must hold a coinbase transaction".into(),
            ));
        }
        Ok(Self::new(GENESIS_HEIGHT, Hash::zero(), vec![coinbase]))
    }

    /// Template extending `parent`
    pub fn child_of(parent: &Block, transactions: Vec<Transaction>) -> Self {
        Self::new(parent.height + 1, parent.hash, transactions)
    }

    pub fn transactions_digest(&self) -> Hash {
        transactions_digest(&self.transactions)
    }

    /// Bytes hashed by the proof-of-work for a given nonce
    pub fn pow_preimage(&self, difficulty: u32, nonce: u64) -> Vec<u8> {
        pow_preimage(
            self.height,
            self.timestamp,
            &self.prev_hash,
            &self.transactions_digest(),
            difficulty,
            nonce,
        )
    }

    /// Attach a solved hash and nonce
    pub fn seal(self, hash: Hash, nonce: u64) -> Block {
        Block {
            height: self.height,
            timestamp: self.timestamp,
            prev_hash: self.prev_hash,
            hash,
            nonce,
            transactions: self.transactions,
        }
    }
}

/// A sealed block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Block {
    pub height: BlockHeight,
    pub timestamp: Timestamp,
    /// All zero for the genesis block
    pub prev_hash: Hash,
    pub hash: Hash,
    pub nonce: u64,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn is_genesis(&self) -> bool {
        self.prev_hash.is_zero()
    }

    pub fn transactions_digest(&self) -> Hash {
        transactions_digest(&self.transactions)
    }

    /// Proof-of-work pre-image for this block's own nonce
    pub fn pow_preimage(&self, difficulty: u32) -> Vec<u8> {
        pow_preimage(
            self.height,
            self.timestamp,
            &self.prev_hash,
            &self.transactions_digest(),
            difficulty,
            self.nonce,
        )
    }

    /// Merkle root over the transaction hashes, `None` for an empty block
    pub fn merkle_root(&self) -> Option<Hash> {
        let leaves: Vec<Hash> = self.transactions.iter().map(|tx| tx.hash).collect();
        MerkleTree::build(&leaves).map(|tree| tree.root_hash())
    }

    pub fn find_transaction(&self, hash: &Hash) -> Option<&Transaction> {
        self.transactions.iter().find(|tx| tx.hash == *hash)
    }

    pub fn serialize(&self) -> CoreResult<Vec<u8>> {
        codec::encode(self)
    }

    pub fn deserialize(bytes: &[u8]) -> CoreResult<Self> {
        codec::decode(bytes)
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "============ Block {} ============", self.hash)?;
        writeln!(f, "Height: {}", self.height)?;
        writeln!(f, "Prev. block: {}", self.prev_hash)?;
        writeln!(f, "Timestamp: {}", self.timestamp)?;
        writeln!(f, "Nonce: {}", self.nonce)?;
        for tx in &self.transactions {
            write!(f, "{tx}")?;
        }
        Ok(())
    }
}

/// SHA-256 over the concatenated transaction hashes
pub fn transactions_digest(transactions: &[Transaction]) -> Hash {
    let mut data = Vec::with_capacity(transactions.len() * 32);
    for tx in transactions {
        data.extend_from_slice(tx.hash.as_bytes());
    }
    sha256(&data)
}

/// `be(height) ∥ be(timestamp) ∥ prev_hash ∥ digest ∥ be(difficulty) ∥ be(nonce)`
pub fn pow_preimage(
    height: BlockHeight,
    timestamp: Timestamp,
    prev_hash: &Hash,
    transactions_digest: &Hash,
    difficulty: u32,
    nonce: u64,
) -> Vec<u8> {
    let mut data = Vec::with_capacity(8 + 8 + 32 + 32 + 8 + 8);
    data.extend_from_slice(&height.to_be_bytes());
    data.extend_from_slice(&timestamp.to_be_bytes());
    data.extend_from_slice(prev_hash.as_bytes());
    data.extend_from_slice(transactions_digest.as_bytes());
    data.extend_from_slice(&(difficulty as u64).to_be_bytes());
    data.extend_from_slice(&nonce.to_be_bytes());
    data
}
