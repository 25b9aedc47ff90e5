//! Ledger view that includes transactions not yet in a block

use crate::chain::Blockchain;
use crate::{DbError, DbResult};
use chain_core::{Hash, LockHash, SpendableLookup, Transaction, TransactionLookup, Utxo};
use std::collections::HashSet;

/// A branch of the chain plus an ordered list of pending transactions.
///
/// Outputs of pending transactions are spendable and outputs they spend are
/// hidden, so several transfers can be chained inside one block.
/// Transactions resolve along the ancestry of `head`; spendable outputs
/// come from the UTXO index and so always describe the canonical chain.
pub struct PendingView<'a> {
    chain: &'a Blockchain,
    head: Hash,
    pending: Vec<Transaction>,
}

impl<'a> PendingView<'a> {
    /// View on top of the current tip
    pub fn new(chain: &'a Blockchain) -> Self {
        Self::on_branch(chain, chain.tip())
    }

    /// View on top of `head`, which may be a side branch; the zero hash
    /// means an empty history
    pub fn on_branch(chain: &'a Blockchain, head: Hash) -> Self {
        Self {
            chain,
            head,
            pending: Vec::new(),
        }
    }

    pub fn push(&mut self, tx: Transaction) {
        self.pending.push(tx);
    }

    pub fn into_pending(self) -> Vec<Transaction> {
        self.pending
    }

    fn spent_by_pending(&self) -> HashSet<(Hash, u32)> {
        self.pending
            .iter()
            .filter(|tx| !tx.is_coinbase())
            .flat_map(|tx| tx.inputs.iter())
            .filter_map(|input| {
                u32::try_from(input.output_index)
                    .ok()
                    .map(|index| (input.prev_tx_hash, index))
            })
            .collect()
    }
}

impl TransactionLookup for PendingView<'_> {
    type Error = DbError;

    fn find_transaction(&self, hash: &Hash) -> DbResult<Option<Transaction>> {
        if let Some(tx) = self.pending.iter().find(|tx| tx.hash == *hash) {
            return Ok(Some(tx.clone()));
        }
        self.chain.find_transaction_from(&self.head, hash)
    }
}

impl SpendableLookup for PendingView<'_> {
    type Error = DbError;

    /// Pending outputs first, then the index, skipping anything already
    /// spent by a pending transaction
    fn unspent_outputs(&self, owner: &LockHash) -> DbResult<Vec<Utxo>> {
        let spent = self.spent_by_pending();
        let pending = self.pending.iter().flat_map(|tx| {
            tx.outputs.iter().enumerate().map(|(index, output)| Utxo {
                tx_hash: tx.hash,
                output_index: index as u32,
                output: output.clone(),
            })
        });
        let indexed = self.chain.utxo_set().find_utxos_by_lock(owner)?;

        Ok(pending
            .chain(indexed)
            .filter(|utxo| utxo.output.is_locked_with(owner))
            .filter(|utxo| !spent.contains(&(utxo.tx_hash, utxo.output_index)))
            .collect())
    }
}
