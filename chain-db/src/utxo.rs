//! Materialized index of unspent transaction outputs
//!
//! The `utxo` tree maps a transaction hash to the outputs of that transaction
//! that no canonical input spends yet. The index is derived data: `rebuild`
//! regenerates it from the chain at any time.

use crate::chain::Blockchain;
use crate::{DbError, DbResult};
use chain_core::{
    codec, Address, Amount, Block, Hash, LockHash, SpendableLookup, TxOutput, Utxo,
};
use serde::Serialize;
use sled::transaction::{ConflictableTransactionError, ConflictableTransactionResult, TransactionalTree};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use tracing::{debug, info};

/// An output together with its position in the transaction
#[derive(Debug, Clone, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct IndexedOutput {
    pub index: u32,
    pub output: TxOutput,
}

/// Value stored per transaction in the `utxo` tree
#[derive(Debug, Clone, Default, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct UnspentOutputs {
    pub outputs: Vec<IndexedOutput>,
}

impl UnspentOutputs {
    /// Every output of a freshly appended transaction
    fn all_of(outputs: &[TxOutput]) -> Self {
        Self {
            outputs: outputs
                .iter()
                .enumerate()
                .map(|(index, output)| IndexedOutput {
                    index: index as u32,
                    output: output.clone(),
                })
                .collect(),
        }
    }

    /// Drop output `index`; false if it was not present
    fn spend(&mut self, index: u32) -> bool {
        let before = self.outputs.len();
        self.outputs.retain(|o| o.index != index);
        self.outputs.len() != before
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    pub fn value(&self) -> Amount {
        self.outputs.iter().map(|o| o.output.value).sum()
    }
}

/// Summary of the index contents
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UtxoReport {
    pub transactions: usize,
    pub outputs: usize,
    pub total_value: Amount,
}

impl fmt::Display for UtxoReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} transactions, {} unspent outputs, total value {}",
            self.transactions, self.outputs, self.total_value
        )
    }
}

/// View over the `utxo` tree of a chain
pub struct UtxoSet<'a> {
    chain: &'a Blockchain,
}

impl<'a> UtxoSet<'a> {
    pub fn new(chain: &'a Blockchain) -> Self {
        Self { chain }
    }

    fn tree(&self) -> &sled::Tree {
        self.chain.database().utxo()
    }

    /// Regenerate the index from the canonical chain, replacing the old
    /// contents in one atomic batch. Returns the number of entries written.
    pub fn rebuild(&self) -> DbResult<usize> {
        let unspent = collect_unspent(self.chain.iter())?;

        let mut batch = sled::Batch::default();
        for key in self.tree().iter().keys() {
            batch.remove(key?);
        }
        for (tx_hash, outputs) in &unspent {
            batch.insert(tx_hash.as_bytes().as_slice(), codec::encode(outputs)?);
        }
        self.tree().apply_batch(batch)?;

        info!(entries = unspent.len(), "Rebuilt UTXO index");
        Ok(unspent.len())
    }

    /// Incrementally apply `block` in its own transaction
    pub fn apply_block(&self, block: &Block) -> DbResult<()> {
        self.tree().transaction(|tree| apply_block_in(tree, block))?;
        Ok(())
    }

    pub fn entry(&self, tx_hash: &Hash) -> DbResult<Option<UnspentOutputs>> {
        match self.tree().get(tx_hash.as_bytes())? {
            Some(bytes) => Ok(Some(codec::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn is_unspent(&self, tx_hash: &Hash, index: u32) -> DbResult<bool> {
        Ok(self
            .entry(tx_hash)?
            .is_some_and(|entry| entry.outputs.iter().any(|o| o.index == index)))
    }

    /// All unspent outputs locked to `lock_hash`, in index order
    pub fn find_utxos_by_lock(&self, lock_hash: &LockHash) -> DbResult<Vec<Utxo>> {
        let mut utxos = Vec::new();
        for item in self.tree().iter() {
            let (key, value) = item?;
            let tx_hash = Hash::from_slice(&key)?;
            let entry: UnspentOutputs = codec::decode(&value)?;
            utxos.extend(
                entry
                    .outputs
                    .into_iter()
                    .filter(|o| o.output.is_locked_with(lock_hash))
                    .map(|o| Utxo {
                        tx_hash,
                        output_index: o.index,
                        output: o.output,
                    }),
            );
        }
        Ok(utxos)
    }

    pub fn find_utxos(&self, address: &Address) -> DbResult<Vec<Utxo>> {
        self.find_utxos_by_lock(address.lock_hash())
    }

    pub fn balance(&self, address: &Address) -> DbResult<Amount> {
        Ok(self.find_utxos(address)?.iter().map(|u| u.output.value).sum())
    }

    /// Greedily collect outputs of `lock_hash` until they cover `amount`.
    ///
    /// Returns the accumulated value, which is below `amount` when the
    /// owner cannot afford it.
    pub fn find_spendable(&self, lock_hash: &LockHash, amount: Amount) -> DbResult<(Amount, Vec<Utxo>)> {
        let mut accumulated = 0;
        let mut selected = Vec::new();
        for utxo in self.find_utxos_by_lock(lock_hash)? {
            if accumulated >= amount {
                break;
            }
            accumulated = accumulated.saturating_add(utxo.output.value);
            selected.push(utxo);
        }
        Ok((accumulated, selected))
    }

    pub fn report(&self) -> DbResult<UtxoReport> {
        let mut report = UtxoReport::default();
        for value in self.tree().iter().values() {
            let entry: UnspentOutputs = codec::decode(&value?)?;
            report.transactions += 1;
            report.outputs += entry.outputs.len();
            report.total_value += entry.value();
        }
        Ok(report)
    }
}

impl SpendableLookup for UtxoSet<'_> {
    type Error = DbError;

    fn unspent_outputs(&self, owner: &LockHash) -> DbResult<Vec<Utxo>> {
        self.find_utxos_by_lock(owner)
    }
}

fn abort(err: impl Into<DbError>) -> ConflictableTransactionError<DbError> {
    ConflictableTransactionError::Abort(err.into())
}

/// Apply `block` to the index inside an open transaction.
///
/// Transactions are processed in block order: the outputs a transaction
/// spends are removed, then all of its outputs are inserted.
pub(crate) fn apply_block_in(
    tree: &TransactionalTree,
    block: &Block,
) -> ConflictableTransactionResult<(), DbError> {
    for tx in &block.transactions {
        if !tx.is_coinbase() {
            for input in &tx.inputs {
                let key = input.prev_tx_hash.as_bytes().as_slice();
                let missing = || {
                    abort(DbError::IndexInconsistent(format!(
                        "output {} of {} spent in block {} is not indexed",
                        input.output_index, input.prev_tx_hash, block.hash
                    )))
                };
                let bytes = tree.get(key)?.ok_or_else(missing)?;
                let mut entry: UnspentOutputs = codec::decode(&bytes).map_err(abort)?;
                let index = u32::try_from(input.output_index).map_err(|_| missing())?;
                if !entry.spend(index) {
                    return Err(missing());
                }
                if entry.is_empty() {
                    tree.remove(key)?;
                } else {
                    tree.insert(key, codec::encode(&entry).map_err(abort)?)?;
                }
            }
        }

        let entry = UnspentOutputs::all_of(&tx.outputs);
        tree.insert(
            tx.hash.as_bytes().as_slice(),
            codec::encode(&entry).map_err(abort)?,
        )?;
    }
    debug!(block = %block.hash, transactions = block.transactions.len(), "Applied block to UTXO index");
    Ok(())
}

/// Unspent outputs of the blocks yielded newest first
pub(crate) fn collect_unspent<I>(blocks: I) -> DbResult<BTreeMap<Hash, UnspentOutputs>>
where
    I: IntoIterator<Item = DbResult<Block>>,
{
    let mut spent: HashSet<(Hash, i32)> = HashSet::new();
    let mut unspent = BTreeMap::new();
    for block in blocks {
        let block = block?;
        // Spenders always come after what they spend
        for tx in block.transactions.iter().rev() {
            let outputs: Vec<IndexedOutput> = tx
                .outputs
                .iter()
                .enumerate()
                .filter(|(index, _)| !spent.contains(&(tx.hash, *index as i32)))
                .map(|(index, output)| IndexedOutput {
                    index: index as u32,
                    output: output.clone(),
                })
                .collect();
            if !outputs.is_empty() {
                unspent.insert(tx.hash, UnspentOutputs { outputs });
            }
            if !tx.is_coinbase() {
                spent.extend(tx.inputs.iter().map(|i| (i.prev_tx_hash, i.output_index)));
            }
        }
    }
    Ok(unspent)
}
