//! Ledger consensus engine
//!
//! This crate provides the proof-of-work puzzle that seals blocks, the
//! [`Engine`] abstraction the chain store depends on, and a cancellable
//! mining task that runs the search on a blocking worker.

pub mod cancel;
pub mod error;
pub mod mining;
pub mod pow;
pub mod traits;

pub use cancel::CancelToken;
pub use error::{ConsensusError, ConsensusResult};
pub use mining::MiningTask;
pub use pow::{ProofOfWork, CANCEL_CHECK_INTERVAL, DIFFICULTY};
pub use traits::Engine;
