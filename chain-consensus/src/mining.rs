//! Mining task running the proof-of-work on a blocking worker

use crate::{CancelToken, ConsensusResult, Engine};
use chain_core::{Block, BlockTemplate};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Handle to an in-flight search.
///
/// Cancelling makes the worker stop within [`crate::CANCEL_CHECK_INTERVAL`]
/// nonces and resolve to [`crate::ConsensusError::Cancelled`].
pub struct MiningTask {
    cancel: CancelToken,
    handle: JoinHandle<ConsensusResult<Block>>,
}

impl MiningTask {
    /// Start sealing `template` on the tokio blocking pool
    pub fn spawn(engine: Arc<dyn Engine>, template: BlockTemplate) -> Self {
        let cancel = CancelToken::new();
        let worker_cancel = cancel.clone();
        debug!(height = template.height, "Spawning mining task");
        let handle = tokio::task::spawn_blocking(move || engine.seal(template, &worker_cancel));
        Self { cancel, handle }
    }

    /// Ask the worker to stop
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that cancels this task when triggered
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the worker to finish
    pub async fn join(self) -> ConsensusResult<Block> {
        self.handle.await?
    }
}
