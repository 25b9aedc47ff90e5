//! Database error types

use chain_consensus::ConsensusError;
use chain_core::{CoreError, Hash};
use thiserror::Error;

/// Database error type
#[derive(Error, Debug)]
pub enum DbError {
    /// Sled error
    #[error("Sled error: {0}")]
    Sled(#[from] sled::Error),

    /// Malformed record in the store
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Consensus(#[from] ConsensusError),

    #[error("Blockchain already exists at {0}")]
    ChainExists(String),

    #[error("No blockchain found at {0}; create one first")]
    ChainNotFound(String),

    #[error("Block not found: {0}")]
    BlockNotFound(Hash),

    /// The parent of an appended block is not stored
    #[error("Orphan block {hash}: parent {parent} is unknown")]
    OrphanBlock { hash: Hash, parent: Hash },

    #[error("Invalid block {hash}: {reason}")]
    InvalidBlock { hash: Hash, reason: String },

    /// The UTXO index disagrees with the ledger; `utxo rebuild` repairs it
    #[error("UTXO index inconsistent: {0}")]
    IndexInconsistent(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DbError {
    /// Recoverable failures caused by the request rather than the store
    pub fn is_validation(&self) -> bool {
        match self {
            DbError::Core(err) => err.is_validation(),
            DbError::Consensus(ConsensusError::InvalidProof(_)) => true,
            DbError::ChainExists(_)
            | DbError::ChainNotFound(_)
            | DbError::BlockNotFound(_)
            | DbError::OrphanBlock { .. }
            | DbError::InvalidBlock { .. } => true,
            _ => false,
        }
    }
}

impl From<sled::transaction::TransactionError<DbError>> for DbError {
    fn from(err: sled::transaction::TransactionError<DbError>) -> Self {
        match err {
            sled::transaction::TransactionError::Abort(inner) => inner,
            sled::transaction::TransactionError::Storage(inner) => DbError::Sled(inner),
        }
    }
}

/// Result type for database operations
pub type DbResult<T> = Result<T, DbError>;
