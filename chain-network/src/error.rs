//! Network error types

use chain_core::CoreError;
use chain_db::DbError;
use thiserror::Error;

pub type NetworkResult<T> = Result<T, NetworkError>;

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Message encoding error: {0}")]
    Encoding(String),

    #[error("Unknown command: {0:?}")]
    UnknownCommand(String),

    #[error("Message of {size} bytes exceeds the limit of {limit}")]
    MessageTooLarge { size: usize, limit: usize },

    #[error("Timed out connecting to {0}")]
    Timeout(String),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<CoreError> for NetworkError {
    fn from(err: CoreError) -> Self {
        NetworkError::Encoding(err.to_string())
    }
}
