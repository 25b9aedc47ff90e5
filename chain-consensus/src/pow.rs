//! Proof-of-work: a bounded hash search over the block pre-image
//!
//! A solution is the first nonce, counting up from zero, whose SHA-256 of
//! [`BlockTemplate::pow_preimage`] is below `1 << (256 - difficulty)` when
//! read as a big-endian 256-bit integer.

use crate::cancel::CancelToken;
use crate::traits::Engine;
use crate::{ConsensusError, ConsensusResult};
use chain_core::hashing::sha256;
use chain_core::{Block, BlockTemplate, Hash};
use primitive_types::U256;
use tracing::debug;

/// Leading zero bits required of a block hash
pub const DIFFICULTY: u32 = 16;

/// Nonces tried between two looks at the cancel token
pub const CANCEL_CHECK_INTERVAL: u64 = 1024;

/// Hash-below-target puzzle with a fixed difficulty
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofOfWork {
    difficulty: u32,
    target: U256,
}

impl ProofOfWork {
    /// Create an engine for `difficulty` leading zero bits (1..=255)
    pub fn new(difficulty: u32) -> ConsensusResult<Self> {
        if !(1..=255).contains(&difficulty) {
            return Err(ConsensusError::Config(format!(
                "Difficulty must be between 1 and 255, got {difficulty}"
            )));
        }
        Ok(Self {
            difficulty,
            target: U256::one() << (256 - difficulty as usize),
        })
    }

    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }

    pub fn target(&self) -> U256 {
        self.target
    }

    /// Whether `hash`, as an unsigned integer, is below the target
    pub fn meets_target(&self, hash: &Hash) -> bool {
        U256::from_big_endian(hash.as_bytes()) < self.target
    }

    /// Blocking search with no way to abort
    pub fn solve(&self, template: BlockTemplate) -> ConsensusResult<Block> {
        self.solve_cancellable(template, &CancelToken::new())
    }

    /// Blocking search that gives up once `cancel` is triggered
    pub fn solve_cancellable(
        &self,
        template: BlockTemplate,
        cancel: &CancelToken,
    ) -> ConsensusResult<Block> {
        let digest = template.transactions_digest();
        let mut nonce: u64 = 0;
        loop {
            if nonce % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
                debug!(height = template.height, nonce, "Proof-of-work search cancelled");
                return Err(ConsensusError::Cancelled);
            }

            let preimage = chain_core::pow_preimage(
                template.height,
                template.timestamp,
                &template.prev_hash,
                &digest,
                self.difficulty,
                nonce,
            );
            let hash = sha256(&preimage);
            if self.meets_target(&hash) {
                debug!(height = template.height, nonce, %hash, "Proof-of-work solved");
                return Ok(template.seal(hash, nonce));
            }

            nonce = nonce.checked_add(1).ok_or(ConsensusError::Exhausted)?;
        }
    }

    /// Recompute the pre-image from the block's fields and check the result
    pub fn verify(&self, block: &Block) -> ConsensusResult<()> {
        let computed = sha256(&block.pow_preimage(self.difficulty));
        if computed != block.hash {
            return Err(ConsensusError::InvalidProof(format!(
                "block {} hashes to {}",
                block.hash, computed
            )));
        }
        if !self.meets_target(&computed) {
            return Err(ConsensusError::InvalidProof(format!(
                "block {} is above the difficulty {} target",
                block.hash, self.difficulty
            )));
        }
        Ok(())
    }
}

impl Default for ProofOfWork {
    fn default() -> Self {
        Self {
            difficulty: DIFFICULTY,
            target: U256::one() << (256 - DIFFICULTY as usize),
        }
    }
}

impl Engine for ProofOfWork {
    fn difficulty(&self) -> u32 {
        self.difficulty
    }

    fn seal(&self, template: BlockTemplate, cancel: &CancelToken) -> ConsensusResult<Block> {
        self.solve_cancellable(template, cancel)
    }

    fn verify_seal(&self, block: &Block) -> ConsensusResult<()> {
        self.verify(block)
    }
}
