//! Consensus error types

use thiserror::Error;

/// Consensus error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsensusError {
    /// A presented solution does not satisfy the target
    #[error("Invalid proof of work: {0}")]
    InvalidProof(String),

    /// The search was aborted through its cancel token
    #[error("Proof-of-work search cancelled")]
    Cancelled,

    #[error("Nonce space exhausted without a solution")]
    Exhausted,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The blocking mining worker failed
    #[error("Mining worker failed: {0}")]
    Worker(String),
}

impl From<tokio::task::JoinError> for ConsensusError {
    fn from(err: tokio::task::JoinError) -> Self {
        ConsensusError::Worker(err.to_string())
    }
}

/// Result type for consensus operations
pub type ConsensusResult<T> = Result<T, ConsensusError>;
