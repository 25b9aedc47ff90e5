//! Persistent, hash-linked chain of blocks
//!
//! Blocks are stored in the `blocks` tree keyed by hash, with the tip hash
//! under [`TIP_KEY`]. Appends are serialized by a writer lock; extending the
//! tip and updating the UTXO index commit together in one sled transaction.

use crate::column_families::TIP_KEY;
use crate::kv::{Database, DatabaseConfig};
use crate::pending::PendingView;
use crate::utxo::{apply_block_in, UtxoSet};
use crate::{DbError, DbResult};
use chain_consensus::{CancelToken, Engine};
use chain_core::{
    Address, Amount, Block, BlockHeight, BlockTemplate, CoreError, Hash, Transaction,
    TransactionLookup, Wallets, COINBASE_REWARD, GENESIS_HEIGHT,
};
use parking_lot::{Mutex, RwLock};
use sled::transaction::ConflictableTransactionError;
use sled::Transactional;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of [`Blockchain::append`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// The block was already stored; nothing changed
    Duplicate,
    /// Stored without moving the tip
    SideBlock,
    /// Stored on top of the tip; the UTXO index was updated with it
    Extended,
    /// Stored as a new tip on another branch; the UTXO index was rebuilt
    Reorganized,
}

impl AppendOutcome {
    pub fn tip_changed(&self) -> bool {
        matches!(self, AppendOutcome::Extended | AppendOutcome::Reorganized)
    }
}

/// One requested value transfer of a mining round
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub from: Address,
    pub to: Address,
    pub amount: Amount,
}

impl Transfer {
    pub fn new(from: Address, to: Address, amount: Amount) -> Self {
        Self { from, to, amount }
    }
}

/// Ledger store of one node
pub struct Blockchain {
    db: Database,
    engine: Arc<dyn Engine>,
    tip: RwLock<Hash>,
    writer: Mutex<()>,
}

impl fmt::Debug for Blockchain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blockchain")
            .field("path", &self.db.path())
            .field("tip", &*self.tip.read())
            .field("difficulty", &self.engine.difficulty())
            .finish()
    }
}

impl Blockchain {
    /// Create a new chain whose genesis block pays `miner`.
    ///
    /// Fails with [`DbError::ChainExists`] if the node already has a store.
    pub fn create(
        config: &DatabaseConfig,
        miner: &Address,
        engine: Arc<dyn Engine>,
    ) -> DbResult<Self> {
        let db = Database::open(config)?;
        if db.blocks().contains_key(TIP_KEY)? {
            return Err(DbError::ChainExists(config.path.display().to_string()));
        }

        let coinbase = Transaction::new_coinbase(miner)?;
        let genesis = engine.seal(BlockTemplate::genesis(coinbase)?, &CancelToken::new())?;
        let bytes = genesis.serialize()?;
        db.blocks().transaction(|tree| {
            tree.insert(genesis.hash.as_bytes().as_slice(), bytes.as_slice())?;
            tree.insert(TIP_KEY, genesis.hash.as_bytes().as_slice())?;
            Ok::<(), ConflictableTransactionError<DbError>>(())
        })?;

        let chain = Self {
            db,
            engine,
            tip: RwLock::new(genesis.hash),
            writer: Mutex::new(()),
        };
        chain.utxo_set().rebuild()?;
        chain.db.flush()?;
        info!(hash = %genesis.hash, miner = %miner, "Created blockchain");
        Ok(chain)
    }

    /// Open an existing chain
    pub fn open(config: &DatabaseConfig, engine: Arc<dyn Engine>) -> DbResult<Self> {
        let not_found = || DbError::ChainNotFound(config.path.display().to_string());
        if !config.exists() {
            return Err(not_found());
        }
        let db = Database::open(config)?;
        let tip = match db.blocks().get(TIP_KEY)? {
            Some(bytes) => Hash::from_slice(&bytes).map_err(|_| {
                DbError::Serialization(format!("tip record has {} bytes", bytes.len()))
            })?,
            None => return Err(not_found()),
        };
        debug!(%tip, "Opened blockchain");
        Ok(Self {
            db,
            engine,
            tip: RwLock::new(tip),
            writer: Mutex::new(()),
        })
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    pub fn utxo_set(&self) -> UtxoSet<'_> {
        UtxoSet::new(self)
    }

    pub fn tip(&self) -> Hash {
        *self.tip.read()
    }

    pub fn tip_block(&self) -> DbResult<Block> {
        self.get_block(&self.tip())
    }

    pub fn height(&self) -> DbResult<BlockHeight> {
        Ok(self.tip_block()?.height)
    }

    pub fn contains_block(&self, hash: &Hash) -> DbResult<bool> {
        Ok(self.db.blocks().contains_key(hash.as_bytes())?)
    }

    /// Serialized block as stored
    pub fn get_block_bytes(&self, hash: &Hash) -> DbResult<Option<Vec<u8>>> {
        Ok(self.db.blocks().get(hash.as_bytes())?.map(|bytes| bytes.to_vec()))
    }

    fn load_block(&self, hash: &Hash) -> DbResult<Option<Block>> {
        match self.db.blocks().get(hash.as_bytes())? {
            Some(bytes) => Ok(Some(Block::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn get_block(&self, hash: &Hash) -> DbResult<Block> {
        self.load_block(hash)?.ok_or(DbError::BlockNotFound(*hash))
    }

    /// Blocks from the tip back to genesis
    pub fn iter(&self) -> ChainIterator<'_> {
        self.iter_from(self.tip())
    }

    /// Blocks from `head` back to genesis; empty for the zero hash
    pub fn iter_from(&self, head: Hash) -> ChainIterator<'_> {
        ChainIterator {
            chain: self,
            next: (!head.is_zero()).then_some(head),
        }
    }

    /// Canonical block hashes, tip first
    pub fn block_hashes(&self) -> DbResult<Vec<Hash>> {
        self.iter().map(|block| block.map(|b| b.hash)).collect()
    }

    /// Search the canonical chain for a transaction
    pub fn find_transaction(&self, hash: &Hash) -> DbResult<Option<Transaction>> {
        self.find_transaction_from(&self.tip(), hash)
    }

    /// Search the ancestry of `head`, which need not be canonical
    pub fn find_transaction_from(&self, head: &Hash, hash: &Hash) -> DbResult<Option<Transaction>> {
        for block in self.iter_from(*head) {
            if let Some(tx) = block?.find_transaction(hash) {
                return Ok(Some(tx.clone()));
            }
        }
        Ok(None)
    }

    /// Store `block`, moving the tip when it is higher than the current one.
    ///
    /// A block whose parent is unknown is rejected with
    /// [`DbError::OrphanBlock`] so that every stored block reaches genesis.
    pub fn append(&self, block: Block) -> DbResult<AppendOutcome> {
        let _writer = self.writer.lock();
        let blocks = self.db.blocks();
        let hash = block.hash;

        if blocks.contains_key(hash.as_bytes())? {
            debug!(%hash, "Block already stored");
            return Ok(AppendOutcome::Duplicate);
        }
        self.check_linkage(&block)?;

        let tip = self.tip_block()?;
        let bytes = block.serialize()?;
        let key = hash.as_bytes().as_slice();

        if block.height <= tip.height {
            blocks.insert(key, bytes)?;
            self.db.flush()?;
            info!(%hash, height = block.height, "Stored side block");
            return Ok(AppendOutcome::SideBlock);
        }

        let outcome = if block.prev_hash == tip.hash {
            (blocks, self.db.utxo()).transaction(|(tb, tu)| {
                tb.insert(key, bytes.as_slice())?;
                tb.insert(TIP_KEY, key)?;
                apply_block_in(tu, &block)?;
                Ok::<(), ConflictableTransactionError<DbError>>(())
            })?;
            AppendOutcome::Extended
        } else {
            blocks.transaction(|tb| {
                tb.insert(key, bytes.as_slice())?;
                tb.insert(TIP_KEY, key)?;
                Ok::<(), ConflictableTransactionError<DbError>>(())
            })?;
            AppendOutcome::Reorganized
        };

        *self.tip.write() = hash;
        if outcome == AppendOutcome::Reorganized {
            warn!(%hash, old_tip = %tip.hash, height = block.height, "Chain reorganized, rebuilding UTXO index");
            self.utxo_set().rebuild()?;
        }
        self.db.flush()?;
        info!(%hash, height = block.height, "Appended block");
        Ok(outcome)
    }

    /// Height and parent checks shared by append and validation
    fn check_linkage(&self, block: &Block) -> DbResult<()> {
        let invalid = |reason: String| DbError::InvalidBlock {
            hash: block.hash,
            reason,
        };
        if block.is_genesis() {
            if block.height != GENESIS_HEIGHT {
                return Err(invalid(format!(
                    "genesis block at height {}",
                    block.height
                )));
            }
            return Ok(());
        }
        let parent = self
            .load_block(&block.prev_hash)?
            .ok_or(DbError::OrphanBlock {
                hash: block.hash,
                parent: block.prev_hash,
            })?;
        if block.height != parent.height + 1 {
            return Err(invalid(format!(
                "height {} does not follow parent height {}",
                block.height, parent.height
            )));
        }
        Ok(())
    }

    /// Check a block received from a peer before it is appended.
    ///
    /// Verifies the seal, every transaction hash, coinbase shape and
    /// signatures. Inputs resolve along the block's own ancestry, so blocks
    /// of a branch that is not canonical yet are checked against that
    /// branch. Spent outputs must be unspent on the branch or created
    /// earlier in the same block.
    pub fn validate_block(&self, block: &Block) -> DbResult<()> {
        let invalid = |reason: String| DbError::InvalidBlock {
            hash: block.hash,
            reason,
        };

        self.engine.verify_seal(block)?;
        self.check_linkage(block)?;
        if block.transactions.is_empty() {
            return Err(invalid("block has no transactions".into()));
        }

        let mut seen = HashSet::new();
        for tx in &block.transactions {
            tx.verify_hash()
                .map_err(|err| invalid(err.to_string()))?;
            if !seen.insert(tx.hash) {
                return Err(invalid(format!("transaction {} appears twice", tx.hash)));
            }
            if tx.is_coinbase() && (tx.outputs.len() != 1 || tx.outputs[0].value != COINBASE_REWARD) {
                return Err(invalid(format!("coinbase {} mints the wrong reward", tx.hash)));
            }
        }

        let mut view = PendingView::on_branch(self, block.prev_hash);
        for tx in &block.transactions {
            tx.verify(&view)?;
            view.push(tx.clone());
        }

        self.check_unspent(block)
    }

    /// Outputs spent by the ancestry of `head`
    fn spent_on_branch(&self, head: &Hash) -> DbResult<HashSet<(Hash, i32)>> {
        let mut spent = HashSet::new();
        for block in self.iter_from(*head) {
            for tx in block?.transactions.iter().filter(|tx| !tx.is_coinbase()) {
                spent.extend(tx.inputs.iter().map(|i| (i.prev_tx_hash, i.output_index)));
            }
        }
        Ok(spent)
    }

    fn check_unspent(&self, block: &Block) -> DbResult<()> {
        let utxo = self.utxo_set();
        // The index only describes the canonical chain
        let branch_spent = if block.prev_hash == self.tip() {
            None
        } else {
            Some(self.spent_on_branch(&block.prev_hash)?)
        };
        let mut created: HashSet<(Hash, i32)> = HashSet::new();
        let mut spent: HashSet<(Hash, i32)> = HashSet::new();
        for tx in &block.transactions {
            if !tx.is_coinbase() {
                for input in &tx.inputs {
                    let outpoint = (input.prev_tx_hash, input.output_index);
                    let available = created.contains(&outpoint)
                        || match &branch_spent {
                            Some(branch_spent) => !branch_spent.contains(&outpoint),
                            None => u32::try_from(input.output_index)
                                .map(|index| utxo.is_unspent(&input.prev_tx_hash, index))
                                .unwrap_or(Ok(false))?,
                        };
                    if !available || !spent.insert(outpoint) {
                        return Err(DbError::InvalidBlock {
                            hash: block.hash,
                            reason: format!(
                                "output {} of {} is already spent",
                                input.output_index, input.prev_tx_hash
                            ),
                        });
                    }
                }
            }
            created.extend((0..tx.outputs.len()).map(|index| (tx.hash, index as i32)));
        }
        Ok(())
    }

    /// Build, verify, seal and append a block carrying `transfers`.
    ///
    /// Every sender also receives a coinbase reward. Transactions created
    /// earlier in the round can be spent by later ones. Any validation
    /// failure aborts before a block is produced.
    pub fn mine_block(
        &self,
        transfers: &[Transfer],
        wallets: &Wallets,
        cancel: &CancelToken,
    ) -> DbResult<Block> {
        if transfers.is_empty() {
            return Err(CoreError::InvalidTransaction("no transfers requested".into()).into());
        }

        let mut view = PendingView::new(self);
        for transfer in transfers {
            let wallet = wallets.get(&transfer.from)?;
            let tx = Transaction::new_transfer(wallet, &transfer.to, transfer.amount, &view)?;
            debug!(tx = %tx.hash, from = %transfer.from, to = %transfer.to, amount = transfer.amount, "Built transfer");
            view.push(tx);
            view.push(Transaction::new_coinbase(&transfer.from)?);
        }

        let transactions = view.into_pending();
        let mut verifier = PendingView::new(self);
        for tx in &transactions {
            tx.verify(&verifier)?;
            verifier.push(tx.clone());
        }

        self.seal_and_append(transactions, cancel)
    }

    /// Mine a block holding only a reward for `miner`
    pub fn mine_empty_block(&self, miner: &Address) -> DbResult<Block> {
        let coinbase = Transaction::new_coinbase(miner)?;
        self.seal_and_append(vec![coinbase], &CancelToken::new())
    }

    fn seal_and_append(
        &self,
        transactions: Vec<Transaction>,
        cancel: &CancelToken,
    ) -> DbResult<Block> {
        let parent = self.tip_block()?;
        let template = BlockTemplate::child_of(&parent, transactions);
        let block = self.engine.seal(template, cancel)?;
        match self.append(block.clone())? {
            AppendOutcome::Extended | AppendOutcome::Reorganized => {}
            outcome => {
                warn!(hash = %block.hash, ?outcome, "Mined block did not become the tip");
            }
        }
        Ok(block)
    }
}

impl TransactionLookup for Blockchain {
    type Error = DbError;

    fn find_transaction(&self, hash: &Hash) -> DbResult<Option<Transaction>> {
        Blockchain::find_transaction(self, hash)
    }
}

/// Lazy walk from a tip back to genesis
pub struct ChainIterator<'a> {
    chain: &'a Blockchain,
    next: Option<Hash>,
}

impl Iterator for ChainIterator<'_> {
    type Item = DbResult<Block>;

    fn next(&mut self) -> Option<Self::Item> {
        let hash = self.next.take()?;
        match self.chain.get_block(&hash) {
            Ok(block) => {
                if !block.is_genesis() {
                    self.next = Some(block.prev_hash);
                }
                Some(Ok(block))
            }
            Err(err) => Some(Err(err)),
        }
    }
}
