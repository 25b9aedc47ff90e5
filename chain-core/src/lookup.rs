//! Ledger views needed to build and check transactions
//!
//! The transaction model does not know where transactions are stored. The
//! chain store, the UTXO index, or a plain in-memory map can answer these
//! queries; each implementation keeps its own error type.

use crate::{CoreError, Hash, LockHash, Transaction, TxOutput};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An unspent output together with its location
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Utxo {
    pub tx_hash: Hash,
    pub output_index: u32,
    pub output: TxOutput,
}

/// Resolves transactions referenced by inputs
pub trait TransactionLookup {
    type Error: From<CoreError>;

    fn find_transaction(&self, hash: &Hash) -> Result<Option<Transaction>, Self::Error>;
}

/// Lists outputs that an owner may spend, in encounter order
pub trait SpendableLookup {
    type Error: From<CoreError>;

    fn unspent_outputs(&self, owner: &LockHash) -> Result<Vec<Utxo>, Self::Error>;
}

impl TransactionLookup for HashMap<Hash, Transaction> {
    type Error = CoreError;

    fn find_transaction(&self, hash: &Hash) -> Result<Option<Transaction>, CoreError> {
        Ok(self.get(hash).cloned())
    }
}

impl TransactionLookup for [Transaction] {
    type Error = CoreError;

    fn find_transaction(&self, hash: &Hash) -> Result<Option<Transaction>, CoreError> {
        Ok(self.iter().find(|tx| tx.hash == *hash).cloned())
    }
}

impl SpendableLookup for [Utxo] {
    type Error = CoreError;

    fn unspent_outputs(&self, owner: &LockHash) -> Result<Vec<Utxo>, CoreError> {
        Ok(self
            .iter()
            .filter(|utxo| utxo.output.is_locked_with(owner))
            .cloned()
            .collect())
    }
}
