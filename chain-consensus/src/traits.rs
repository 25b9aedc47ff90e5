//! Consensus engine traits

use crate::{CancelToken, ConsensusResult};
use chain_core::{Block, BlockTemplate};

/// Seals block templates and checks seals on received blocks
pub trait Engine: Send + Sync {
    /// Difficulty baked into every pre-image
    fn difficulty(&self) -> u32;

    /// Turn a template into a sealed block, aborting if `cancel` fires
    fn seal(&self, template: BlockTemplate, cancel: &CancelToken) -> ConsensusResult<Block>;

    /// Verify the seal of a block
    fn verify_seal(&self, block: &Block) -> ConsensusResult<()>;
}
