use chain_consensus::{CancelToken, Engine, ProofOfWork};
use chain_core::{
    Address, Block, BlockTemplate, CoreError, Hash, Transaction, TxInput, TxOutput, Utxo,
    Wallets, COINBASE_REWARD,
};
use chain_db::{
    AppendOutcome, Blockchain, Database, DatabaseConfig, DbError, Transfer, UtxoReport,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tempfile::TempDir;

struct Fixture {
    _dir: TempDir,
    chain: Blockchain,
    wallets: Wallets,
    miner: Address,
    engine: Arc<dyn Engine>,
}

fn engine() -> Arc<dyn Engine> {
    Arc::new(ProofOfWork::new(8).unwrap())
}

fn setup() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let mut wallets = Wallets::load(dir.path(), "test").unwrap();
    let miner = wallets.create_wallet().unwrap();
    let engine = engine();
    let config = DatabaseConfig::for_node(dir.path(), "test");
    let chain = Blockchain::create(&config, &miner, engine.clone()).unwrap();
    Fixture {
        _dir: dir,
        chain,
        wallets,
        miner,
        engine,
    }
}

fn send(f: &Fixture, from: &Address, to: &Address, amount: u64) -> Result<(), DbError> {
    f.chain
        .mine_block(
            &[Transfer::new(from.clone(), to.clone(), amount)],
            &f.wallets,
            &CancelToken::new(),
        )
        .map(|_| ())
}

fn balance(f: &Fixture, address: &Address) -> u64 {
    f.chain.utxo_set().balance(address).unwrap()
}

/// Unspent outputs per owner, order independent
fn snapshot(f: &Fixture) -> BTreeMap<String, Vec<(Hash, u32, u64)>> {
    let mut map = BTreeMap::new();
    for address in f.wallets.addresses() {
        let address: Address = address.parse().unwrap();
        let mut utxos: Vec<(Hash, u32, u64)> = f
            .chain
            .utxo_set()
            .find_utxos(&address)
            .unwrap()
            .into_iter()
            .map(|u| (u.tx_hash, u.output_index, u.output.value))
            .collect();
        utxos.sort();
        map.insert(address.to_string(), utxos);
    }
    map
}

#[test]
fn genesis_pays_the_miner() {
    let f = setup();
    assert_eq!(balance(&f, &f.miner), COINBASE_REWARD);
    assert_eq!(f.chain.height().unwrap(), 1);
    let genesis = f.chain.tip_block().unwrap();
    assert!(genesis.is_genesis());
    assert!(f.engine.verify_seal(&genesis).is_ok());
}

#[test]
fn transfer_moves_value_and_rewards_sender() {
    let mut f = setup();
    let receiver = f.wallets.create_wallet().unwrap();

    send(&f, &f.miner.clone(), &receiver, 3).unwrap();

    assert_eq!(balance(&f, &receiver), 3);
    assert_eq!(balance(&f, &f.miner), COINBASE_REWARD - 3 + COINBASE_REWARD);
    assert_eq!(f.chain.height().unwrap(), 2);
}

#[test]
fn insufficient_funds_produce_no_block() {
    let mut f = setup();
    let receiver = f.wallets.create_wallet().unwrap();
    let tip = f.chain.tip();

    let err = send(&f, &f.miner.clone(), &receiver, COINBASE_REWARD + 1).unwrap_err();
    assert!(matches!(
        err,
        DbError::Core(CoreError::InsufficientFunds { available, .. }) if available == COINBASE_REWARD
    ));
    assert!(err.is_validation());

    assert_eq!(f.chain.tip(), tip);
    assert_eq!(balance(&f, &f.miner), COINBASE_REWARD);
    assert_eq!(balance(&f, &receiver), 0);
}

#[test]
fn unknown_sender_wallet_is_rejected() {
    let f = setup();
    let stranger = chain_core::Wallet::generate().address();
    let err = send(&f, &stranger, &f.miner, 1).unwrap_err();
    assert!(matches!(err, DbError::Core(CoreError::WalletNotFound(_))));
}

#[test]
fn transfers_in_one_round_can_chain() {
    let mut f = setup();
    let receiver = f.wallets.create_wallet().unwrap();
    let miner = f.miner.clone();

    f.chain
        .mine_block(
            &[
                Transfer::new(miner.clone(), receiver.clone(), 4),
                Transfer::new(miner.clone(), receiver.clone(), 12),
            ],
            &f.wallets,
            &CancelToken::new(),
        )
        .unwrap();

    assert_eq!(balance(&f, &receiver), 16);
    assert_eq!(balance(&f, &miner), 14);
}

#[test]
fn rebuild_matches_incremental_index() {
    let mut f = setup();
    let alice = f.wallets.create_wallet().unwrap();
    let bob = f.wallets.create_wallet().unwrap();
    let miner = f.miner.clone();

    send(&f, &miner, &alice, 7).unwrap();
    send(&f, &alice, &bob, 5).unwrap();
    f.chain
        .mine_block(
            &[
                Transfer::new(bob.clone(), miner.clone(), 2),
                Transfer::new(miner.clone(), alice.clone(), 13),
            ],
            &f.wallets,
            &CancelToken::new(),
        )
        .unwrap();
    f.chain.mine_empty_block(&bob).unwrap();

    let incremental = snapshot(&f);
    let incremental_report = f.chain.utxo_set().report().unwrap();

    f.chain.utxo_set().rebuild().unwrap();
    assert_eq!(snapshot(&f), incremental);
    assert_eq!(f.chain.utxo_set().report().unwrap(), incremental_report);

    // Total value equals the rewards minted
    let minted = COINBASE_REWARD * 6;
    assert_eq!(incremental_report.total_value, minted);
}

#[test]
fn append_is_idempotent() {
    let f = setup();
    f.chain.mine_empty_block(&f.miner).unwrap();
    let tip = f.chain.tip_block().unwrap();
    let report = f.chain.utxo_set().report().unwrap();

    assert_eq!(f.chain.append(tip.clone()).unwrap(), AppendOutcome::Duplicate);
    assert_eq!(f.chain.tip(), tip.hash);
    assert_eq!(f.chain.utxo_set().report().unwrap(), report);
}

#[test]
fn iteration_walks_down_to_genesis() {
    let f = setup();
    for _ in 0..4 {
        f.chain.mine_empty_block(&f.miner).unwrap();
    }
    let tip_height = f.chain.height().unwrap();
    let blocks: Vec<_> = f.chain.iter().map(|b| b.unwrap()).collect();

    assert_eq!(blocks.len() as u64, tip_height);
    for pair in blocks.windows(2) {
        assert_eq!(pair[0].height, pair[1].height + 1);
        assert_eq!(pair[0].prev_hash, pair[1].hash);
    }
    assert!(blocks.last().unwrap().is_genesis());

    let hashes = f.chain.block_hashes().unwrap();
    assert_eq!(hashes[0], f.chain.tip());
    assert_eq!(hashes.len(), blocks.len());

    let from_parent: Vec<Hash> = f
        .chain
        .iter_from(blocks[0].prev_hash)
        .map(|b| b.unwrap().hash)
        .collect();
    assert_eq!(from_parent, hashes[1..]);
    assert!(f.chain.iter_from(Hash::zero()).next().is_none());
}

#[test]
fn reopen_and_existence_checks() {
    let dir = tempfile::tempdir().unwrap();
    let miner = chain_core::Wallet::generate().address();
    let config = DatabaseConfig::for_node(dir.path(), "reopen");

    assert!(matches!(
        Blockchain::open(&config, engine()),
        Err(DbError::ChainNotFound(_))
    ));

    let tip = {
        let chain = Blockchain::create(&config, &miner, engine()).unwrap();
        chain.mine_empty_block(&miner).unwrap();
        chain.tip()
    };

    assert!(matches!(
        Blockchain::create(&config, &miner, engine()),
        Err(DbError::ChainExists(_))
    ));

    let chain = Blockchain::open(&config, engine()).unwrap();
    assert_eq!(chain.tip(), tip);
    assert_eq!(chain.utxo_set().balance(&miner).unwrap(), 2 * COINBASE_REWARD);
}

#[test]
fn orphan_block_is_rejected() {
    let f = setup();
    let coinbase = Transaction::new_coinbase(&f.miner).unwrap();
    let template = BlockTemplate {
        height: 5,
        timestamp: 0,
        prev_hash: chain_core::hashing::sha256(b"unknown parent"),
        transactions: vec![coinbase],
    };
    let block = f.engine.seal(template, &CancelToken::new()).unwrap();

    assert!(matches!(
        f.chain.append(block.clone()),
        Err(DbError::OrphanBlock { .. })
    ));
    assert!(matches!(
        f.chain.validate_block(&block),
        Err(DbError::OrphanBlock { .. })
    ));
    assert!(!f.chain.contains_block(&block.hash).unwrap());
}

#[test]
fn higher_branch_takes_over() {
    let mut f = setup();
    let other = f.wallets.create_wallet().unwrap();
    let genesis = f.chain.tip_block().unwrap();
    let main = f.chain.mine_empty_block(&f.miner).unwrap();

    let side = f
        .engine
        .seal(
            BlockTemplate::child_of(&genesis, vec![Transaction::new_coinbase(&other).unwrap()]),
            &CancelToken::new(),
        )
        .unwrap();
    assert_eq!(f.chain.append(side.clone()).unwrap(), AppendOutcome::SideBlock);
    assert_eq!(f.chain.tip(), main.hash);
    assert_eq!(balance(&f, &other), 0);

    let next = f
        .engine
        .seal(
            BlockTemplate::child_of(&side, vec![Transaction::new_coinbase(&other).unwrap()]),
            &CancelToken::new(),
        )
        .unwrap();
    assert_eq!(f.chain.append(next.clone()).unwrap(), AppendOutcome::Reorganized);
    assert_eq!(f.chain.tip(), next.hash);
    assert_eq!(balance(&f, &other), 2 * COINBASE_REWARD);
    assert_eq!(balance(&f, &f.miner), COINBASE_REWARD);
}

/// Outputs of `block`'s coinbase, usable as a spendable set off the tip
fn coinbase_utxos(block: &Block) -> Vec<Utxo> {
    let coinbase = &block.transactions[0];
    vec![Utxo {
        tx_hash: coinbase.hash,
        output_index: 0,
        output: coinbase.outputs[0].clone(),
    }]
}

#[test]
fn side_branch_with_transfer_takes_over() {
    let mut f = setup();
    let receiver = f.wallets.create_wallet().unwrap();
    let other = f.wallets.create_wallet().unwrap();
    let genesis = f.chain.tip_block().unwrap();
    let main = f.chain.mine_empty_block(&f.miner).unwrap();

    // Spends the genesis reward on a branch that does not contain `main`
    let wallet = f.wallets.get(&f.miner).unwrap();
    let spendable = coinbase_utxos(&genesis);
    let tx = Transaction::new_transfer(wallet, &receiver, 4, spendable.as_slice()).unwrap();
    let side = f
        .engine
        .seal(
            BlockTemplate::child_of(&genesis, vec![tx, Transaction::new_coinbase(&other).unwrap()]),
            &CancelToken::new(),
        )
        .unwrap();
    f.chain.validate_block(&side).unwrap();
    assert_eq!(f.chain.append(side.clone()).unwrap(), AppendOutcome::SideBlock);
    assert_eq!(f.chain.tip(), main.hash);
    assert_eq!(balance(&f, &receiver), 0);

    // The same output cannot be spent again further up the branch
    let again = Transaction::new_transfer(wallet, &other, 5, spendable.as_slice()).unwrap();
    let double_spend = f
        .engine
        .seal(BlockTemplate::child_of(&side, vec![again]), &CancelToken::new())
        .unwrap();
    assert!(matches!(
        f.chain.validate_block(&double_spend),
        Err(DbError::InvalidBlock { .. })
    ));

    let next = f
        .engine
        .seal(
            BlockTemplate::child_of(&side, vec![Transaction::new_coinbase(&other).unwrap()]),
            &CancelToken::new(),
        )
        .unwrap();
    f.chain.validate_block(&next).unwrap();
    assert_eq!(f.chain.append(next.clone()).unwrap(), AppendOutcome::Reorganized);
    assert_eq!(f.chain.tip(), next.hash);

    assert_eq!(balance(&f, &receiver), 4);
    assert_eq!(balance(&f, &f.miner), COINBASE_REWARD - 4);
    assert_eq!(balance(&f, &other), 2 * COINBASE_REWARD);

    let incremental = snapshot(&f);
    f.chain.utxo_set().rebuild().unwrap();
    assert_eq!(snapshot(&f), incremental);

    // Transfers keep working on the adopted branch
    send(&f, &receiver, &f.miner.clone(), 3).unwrap();
    assert_eq!(balance(&f, &receiver), 1 + COINBASE_REWARD);
}

#[test]
fn interrupted_create_can_be_retried() {
    let dir = tempfile::tempdir().unwrap();
    let miner = chain_core::Wallet::generate().address();
    let config = DatabaseConfig::for_node(dir.path(), "partial");

    // A store directory without a tip, as left by a failed create
    Database::open(&config).unwrap().flush().unwrap();
    assert!(config.exists());
    assert!(matches!(
        Blockchain::open(&config, engine()),
        Err(DbError::ChainNotFound(_))
    ));

    let chain = Blockchain::create(&config, &miner, engine()).unwrap();
    assert_eq!(chain.utxo_set().balance(&miner).unwrap(), COINBASE_REWARD);
}

#[test]
fn validate_block_accepts_well_formed_block() {
    let mut f = setup();
    let receiver = f.wallets.create_wallet().unwrap();
    let wallet = f.wallets.get(&f.miner).unwrap();

    let tx = Transaction::new_transfer(wallet, &receiver, 4, &f.chain.utxo_set()).unwrap();
    let coinbase = Transaction::new_coinbase(&f.miner).unwrap();
    let tip = f.chain.tip_block().unwrap();
    let block = f
        .engine
        .seal(BlockTemplate::child_of(&tip, vec![tx, coinbase]), &CancelToken::new())
        .unwrap();

    f.chain.validate_block(&block).unwrap();
    assert_eq!(f.chain.append(block).unwrap(), AppendOutcome::Extended);
    assert_eq!(balance(&f, &receiver), 4);
}

#[test]
fn validate_block_rejects_bad_contents() {
    let mut f = setup();
    let receiver = f.wallets.create_wallet().unwrap();
    let genesis = f.chain.tip_block().unwrap();
    let genesis_coinbase = genesis.transactions[0].clone();
    send(&f, &f.miner.clone(), &receiver, 4).unwrap();
    let tip = f.chain.tip_block().unwrap();
    let wallet = f.wallets.get(&f.miner).unwrap();

    // Spends the genesis reward a second time
    let mut double_spend = Transaction::new(
        vec![TxInput::new(genesis_coinbase.hash, 0)],
        vec![TxOutput::new(COINBASE_REWARD, &receiver)],
    )
    .unwrap();
    double_spend.sign(wallet, &f.chain).unwrap();
    let block = f
        .engine
        .seal(BlockTemplate::child_of(&tip, vec![double_spend]), &CancelToken::new())
        .unwrap();
    assert!(matches!(
        f.chain.validate_block(&block),
        Err(DbError::InvalidBlock { .. })
    ));

    // Altered output behind an unchanged transaction hash
    let mut tampered = f.chain.tip_block().unwrap();
    tampered.transactions[0].outputs[0].value += 1;
    let resealed = f
        .engine
        .seal(
            BlockTemplate::child_of(&tip, tampered.transactions.clone()),
            &CancelToken::new(),
        )
        .unwrap();
    assert!(matches!(
        f.chain.validate_block(&resealed),
        Err(DbError::InvalidBlock { .. })
    ));

    // Coinbase minting more than the reward
    let mut greedy = Transaction::new_coinbase(&f.miner).unwrap();
    greedy.outputs[0].value = COINBASE_REWARD * 2;
    greedy.hash = greedy.compute_hash().unwrap();
    let block = f
        .engine
        .seal(BlockTemplate::child_of(&tip, vec![greedy]), &CancelToken::new())
        .unwrap();
    assert!(matches!(
        f.chain.validate_block(&block),
        Err(DbError::InvalidBlock { .. })
    ));

    // Seal does not match the contents
    let mut forged = f.chain.tip_block().unwrap();
    forged.nonce += 1;
    assert!(matches!(
        f.chain.validate_block(&forged),
        Err(DbError::Consensus(_))
    ));
}

#[test]
fn reapplying_a_block_is_detected() {
    let mut f = setup();
    let receiver = f.wallets.create_wallet().unwrap();
    send(&f, &f.miner.clone(), &receiver, 2).unwrap();
    let tip = f.chain.tip_block().unwrap();

    let err = f.chain.utxo_set().apply_block(&tip).unwrap_err();
    assert!(matches!(err, DbError::IndexInconsistent(_)));

    // The failed update left the index untouched
    assert_eq!(balance(&f, &receiver), 2);
}

#[test]
fn report_counts_index_contents() {
    let mut f = setup();
    let receiver = f.wallets.create_wallet().unwrap();
    send(&f, &f.miner.clone(), &receiver, 3).unwrap();

    // Transfer (two outputs) and its coinbase; the genesis entry is spent
    assert_eq!(
        f.chain.utxo_set().report().unwrap(),
        UtxoReport {
            transactions: 2,
            outputs: 3,
            total_value: 2 * COINBASE_REWARD,
        }
    );
}
