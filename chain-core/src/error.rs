//! Error types for the core crate

use crate::Hash;
use thiserror::Error;

/// Core blockchain errors
#[derive(Error, Debug)]
pub enum CoreError {
    /// Base58 or checksum failure while decoding an address
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Malformed serialized bytes
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// An input points at a transaction (or output) that cannot be found
    #[error("Unknown reference: transaction {0} not found")]
    UnknownReference(Hash),

    #[error("Unknown reference: output {index} of transaction {tx_hash} does not exist")]
    MissingOutput { tx_hash: Hash, index: i32 },

    #[error("Bad signature on input {input} of transaction {tx_hash}")]
    BadSignature { tx_hash: Hash, input: usize },

    #[error("Insufficient funds for {address}: available {available}, required {required}")]
    InsufficientFunds {
        address: String,
        available: u64,
        required: u64,
    },

    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("No wallet found for address {0}")]
    WalletNotFound(String),

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// Expected, recoverable failures that should be reported to the caller
    /// rather than treated as fatal.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            CoreError::InvalidAddress(_)
                | CoreError::UnknownReference(_)
                | CoreError::MissingOutput { .. }
                | CoreError::BadSignature { .. }
                | CoreError::InsufficientFunds { .. }
                | CoreError::InvalidTransaction(_)
                | CoreError::WalletNotFound(_)
        )
    }
}

impl From<bincode::error::EncodeError> for CoreError {
    fn from(err: bincode::error::EncodeError) -> Self {
        CoreError::Encoding(err.to_string())
    }
}

impl From<bincode::error::DecodeError> for CoreError {
    fn from(err: bincode::error::DecodeError) -> Self {
        CoreError::Encoding(err.to_string())
    }
}

impl From<secp256k1::Error> for CoreError {
    fn from(err: secp256k1::Error) -> Self {
        CoreError::Crypto(err.to_string())
    }
}

/// Result type for core operations
pub type CoreResult<T> = Result<T, CoreError>;
