//! Subcommand implementations

use crate::cli::{Command, UtxoAction};
use crate::config::NodeConfig;
use anyhow::{Context, Result};
use chain_consensus::{CancelToken, Engine, ProofOfWork};
use chain_core::{Address, CoreError, Wallets};
use chain_db::{Blockchain, DbError, Transfer};
use chain_network::{Client, NetworkError, Server};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Invalid invocation detected before touching the ledger
#[derive(Error, Debug)]
pub enum UsageError {
    #[error("--from, --to and --amount must list the same number of values ({from}, {to}, {amount})")]
    MismatchedTransfers { from: usize, to: usize, amount: usize },

    #[error("no wallet available to receive the reward; pass --miner or run create-wallet")]
    NoMiner,

    #[error("invalid configuration: {0}")]
    Config(String),
}

/// 1 for bad input, 2 for everything else
pub fn exit_code(err: &anyhow::Error) -> u8 {
    for cause in err.chain() {
        if cause.downcast_ref::<UsageError>().is_some() {
            return 1;
        }
        if let Some(err) = cause.downcast_ref::<CoreError>() {
            return if err.is_validation() { 1 } else { 2 };
        }
        if let Some(err) = cause.downcast_ref::<DbError>() {
            return if err.is_validation() { 1 } else { 2 };
        }
        if let Some(NetworkError::Db(err)) = cause.downcast_ref::<NetworkError>() {
            return if err.is_validation() { 1 } else { 2 };
        }
    }
    2
}

pub async fn run(command: Command, config: &NodeConfig) -> Result<()> {
    match command {
        Command::CreateWallet => create_wallet(config).map(|_| ()),
        Command::ListAddresses => list_addresses(config),
        Command::CreateChain { address } => create_chain(config, &address),
        Command::AddBlock { miner } => add_block(config, miner.as_deref()),
        Command::PrintChain => print_chain(config),
        Command::GetBalance { address } => get_balance(config, &address),
        Command::Send {
            from,
            to,
            amount,
            broadcast,
        } => send(config, &from, &to, &amount, broadcast).await,
        Command::StartNode => start_node(config).await,
        Command::Utxo { action } => utxo(config, action),
    }
}

fn engine(config: &NodeConfig) -> Result<Arc<dyn Engine>> {
    let pow = ProofOfWork::new(config.difficulty)
        .map_err(|err| UsageError::Config(err.to_string()))?;
    Ok(Arc::new(pow))
}

fn open_chain(config: &NodeConfig) -> Result<Blockchain> {
    let chain = Blockchain::open(&config.database(), engine(config)?)?;
    Ok(chain)
}

fn load_wallets(config: &NodeConfig) -> Result<Wallets> {
    let wallets = Wallets::load(&config.data_dir, &config.node_id)?;
    Ok(wallets)
}

fn parse_address(address: &str) -> Result<Address> {
    Ok(Address::parse(address)?)
}

pub fn create_wallet(config: &NodeConfig) -> Result<Address> {
    let mut wallets = load_wallets(config)?;
    let address = wallets.create_wallet()?;
    info!(%address, wallets = wallets.len(), "Created wallet");
    println!("Your new address: {address}");
    Ok(address)
}

fn list_addresses(config: &NodeConfig) -> Result<()> {
    let wallets = load_wallets(config)?;
    println!("Addresses:");
    for address in wallets.addresses() {
        println!("  {address}");
    }
    Ok(())
}

fn create_chain(config: &NodeConfig, address: &str) -> Result<()> {
    let address = parse_address(address)?;
    let chain = Blockchain::create(&config.database(), &address, engine(config)?)?;
    println!("Created chain with genesis block {}", chain.tip());
    println!("UTXO index: {}", chain.utxo_set().report()?);
    Ok(())
}

fn add_block(config: &NodeConfig, miner: Option<&str>) -> Result<()> {
    let miner = match miner {
        Some(address) => parse_address(address)?,
        None => {
            let wallets = load_wallets(config)?;
            let first = wallets.addresses().next().ok_or(UsageError::NoMiner)?;
            parse_address(first)?
        }
    };
    let chain = open_chain(config)?;
    let block = chain.mine_empty_block(&miner)?;
    println!("Mined block {} at height {}", block.hash, block.height);
    Ok(())
}

fn print_chain(config: &NodeConfig) -> Result<()> {
    let chain = open_chain(config)?;
    for block in chain.iter() {
        let block = block?;
        println!("{block}");
        if let Some(root) = block.merkle_root() {
            println!("Merkle root: {root}\n");
        }
    }
    Ok(())
}

fn get_balance(config: &NodeConfig, address: &str) -> Result<()> {
    let address = parse_address(address)?;
    let chain = open_chain(config)?;
    let balance = chain.utxo_set().balance(&address)?;
    println!("Balance of {address}: {balance}");
    Ok(())
}

pub async fn send(
    config: &NodeConfig,
    from: &[String],
    to: &[String],
    amounts: &[u64],
    broadcast: bool,
) -> Result<()> {
    if from.len() != to.len() || from.len() != amounts.len() {
        return Err(UsageError::MismatchedTransfers {
            from: from.len(),
            to: to.len(),
            amount: amounts.len(),
        }
        .into());
    }

    let transfers = from
        .iter()
        .zip(to)
        .zip(amounts)
        .map(|((from, to), amount)| Ok(Transfer::new(parse_address(from)?, parse_address(to)?, *amount)))
        .collect::<Result<Vec<_>>>()?;

    let chain = open_chain(config)?;
    let wallets = load_wallets(config)?;
    let block = chain.mine_block(&transfers, &wallets, &CancelToken::new())?;
    println!(
        "Mined block {} with {} transactions",
        block.hash,
        block.transactions.len()
    );

    if broadcast {
        let network = config.network();
        let delivered = Client::new(network.connect_timeout)
            .broadcast_block(&network.node_address, &network.known_nodes, &block)
            .await?;
        println!("Block offered to {delivered} node(s)");
    }
    Ok(())
}

async fn start_node(config: &NodeConfig) -> Result<()> {
    let chain = Arc::new(open_chain(config)?);
    let network = config.network();
    info!(node = %network.node_address, known = ?network.known_nodes, "Starting node");
    Server::new(network, chain)?
        .run()
        .await
        .context("node server stopped")?;
    Ok(())
}

fn utxo(config: &NodeConfig, action: UtxoAction) -> Result<()> {
    let chain = open_chain(config)?;
    let utxo = chain.utxo_set();
    match action {
        UtxoAction::Rebuild => {
            let entries = utxo.rebuild()?;
            println!("Rebuilt UTXO index with {entries} entries");
            println!("UTXO index: {}", utxo.report()?);
        }
        UtxoAction::Report { json: true } => {
            println!("{}", serde_json::to_string_pretty(&utxo.report()?)?);
        }
        UtxoAction::Report { json: false } => {
            println!("UTXO index: {}", utxo.report()?);
        }
    }
    Ok(())
}
