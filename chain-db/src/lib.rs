//! Ledger database layer
//!
//! This crate persists the chain of blocks in an embedded sled database,
//! keeps the tip pointer, and maintains the derived UTXO index alongside.

pub mod chain;
pub mod column_families;
pub mod error;
pub mod kv;
pub mod pending;
pub mod utxo;

pub use chain::{AppendOutcome, Blockchain, ChainIterator, Transfer};
pub use column_families::{ColumnFamily, TIP_KEY};
pub use error::{DbError, DbResult};
pub use kv::{Database, DatabaseConfig};
pub use pending::PendingView;
pub use utxo::{UnspentOutputs, UtxoReport, UtxoSet};
