//! Core ledger data structures and primitives
//!
//! This crate provides the building blocks of the UTXO ledger:
//! - Basic types (Hash, LockHash, Address, BlockHeight, etc.)
//! - Hashing, Base58 and the binary codec
//! - Wallets, transactions and blocks
//! - Lookup traits implemented by the storage layer
//! - An auxiliary Merkle tree

pub mod address;
pub mod base58;
pub mod block;
pub mod codec;
pub mod error;
pub mod hashing;
pub mod lookup;
pub mod merkle;
pub mod transaction;
pub mod types;
pub mod wallet;

// Re-export commonly used types
pub use address::Address;
pub use block::*;
pub use error::*;
pub use lookup::*;
pub use merkle::MerkleTree;
pub use transaction::*;
pub use types::*;
pub use wallet::{verify_signature, Wallet, Wallets};
