//! Column family definitions for the ledger database
//!
//! Each column family maps to one sled tree.

/// Key under which the `blocks` tree stores the tip hash
pub const TIP_KEY: &[u8] = b"l";

/// Column family names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnFamily {
    /// Block storage (block_hash -> Block), plus the tip pointer
    Blocks,
    /// Unspent outputs (tx_hash -> [(output_index, TxOutput)])
    Utxo,
}

impl ColumnFamily {
    /// Get the string name for this column family
    pub fn name(&self) -> &'static str {
        match self {
            ColumnFamily::Blocks => "blocks",
            ColumnFamily::Utxo => "utxo",
        }
    }
}
