//! Sled-backed key-value store holding one tree per column family

use crate::column_families::ColumnFamily;
use crate::{DbError, DbResult};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Where and how a node's ledger database is opened
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Directory of the sled database
    pub path: PathBuf,

    /// Page cache size in bytes
    pub cache_capacity: u64,

    /// Remove the database when it is dropped
    pub temporary: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./blocks.db"),
            cache_capacity: 64 * 1024 * 1024, // 64MB
            temporary: false,
        }
    }
}

impl DatabaseConfig {
    /// Create a configuration for the database at `path`
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Database of `node_id` inside `data_dir`
    pub fn for_node<P: AsRef<Path>>(data_dir: P, node_id: &str) -> Self {
        Self::new(data_dir.as_ref().join(format!("blocks_{node_id}.db")))
    }

    /// Set the page cache size
    pub fn with_cache_capacity(mut self, bytes: u64) -> Self {
        self.cache_capacity = bytes;
        self
    }

    /// Remove the files when the database is dropped
    pub fn with_temporary(mut self, temporary: bool) -> Self {
        self.temporary = temporary;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> DbResult<()> {
        if self.path.as_os_str().is_empty() {
            return Err(DbError::Config("Database path must not be empty".to_string()));
        }
        if self.cache_capacity == 0 {
            return Err(DbError::Config(
                "Cache capacity must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether a database directory is present on disk
    pub fn exists(&self) -> bool {
        self.path.exists()
    }
}

/// Open database with its column family trees
#[derive(Debug, Clone)]
pub struct Database {
    db: sled::Db,
    blocks: sled::Tree,
    utxo: sled::Tree,
    path: PathBuf,
}

impl Database {
    /// Open (or create) the database described by `config`
    pub fn open(config: &DatabaseConfig) -> DbResult<Self> {
        config.validate()?;
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let db = sled::Config::new()
            .path(&config.path)
            .cache_capacity(config.cache_capacity)
            .temporary(config.temporary)
            .open()?;
        let blocks = db.open_tree(ColumnFamily::Blocks.name())?;
        let utxo = db.open_tree(ColumnFamily::Utxo.name())?;
        debug!(path = %config.path.display(), "Opened ledger database");

        Ok(Self {
            db,
            blocks,
            utxo,
            path: config.path.clone(),
        })
    }

    pub fn blocks(&self) -> &sled::Tree {
        &self.blocks
    }

    pub fn utxo(&self) -> &sled::Tree {
        &self.utxo
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush dirty pages to disk
    pub fn flush(&self) -> DbResult<()> {
        self.db.flush()?;
        Ok(())
    }
}
