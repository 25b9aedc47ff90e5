//! Command-line arguments

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "chain", author, version, about = "UTXO ledger node and wallet")]
pub struct Cli {
    /// Node identity; selects the block store and wallet file
    #[arg(long, global = true, env = "NODE_ID")]
    pub node_id: Option<String>,

    /// Configuration file (TOML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory for node data
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Generate a wallet and print its address
    CreateWallet,

    /// List the addresses of this node's wallets
    ListAddresses,

    /// Create the chain; the genesis reward goes to ADDRESS
    CreateChain {
        #[arg(long)]
        address: String,
    },

    /// Mine a block holding only a reward
    AddBlock {
        /// Reward address; defaults to the first wallet
        #[arg(long)]
        miner: Option<String>,
    },

    /// Print every block from the tip down to genesis
    PrintChain,

    /// Print the balance of an address
    GetBalance {
        #[arg(long)]
        address: String,
    },

    /// Transfer funds; the i-th sender pays the i-th amount to the i-th receiver
    Send {
        #[arg(long, required = true, num_args = 1.., value_delimiter = ',')]
        from: Vec<String>,

        #[arg(long, required = true, num_args = 1.., value_delimiter = ',')]
        to: Vec<String>,

        #[arg(long, required = true, num_args = 1.., value_delimiter = ',')]
        amount: Vec<u64>,

        /// Offer the mined block to the known nodes
        #[arg(long)]
        broadcast: bool,
    },

    /// Run the peer protocol server
    StartNode,

    /// Maintain the UTXO index
    Utxo {
        #[command(subcommand)]
        action: UtxoAction,
    },
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum UtxoAction {
    /// Regenerate the index from the chain
    Rebuild,
    /// Summarize the index
    Report {
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
}
