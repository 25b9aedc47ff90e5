//! Request logic of the peer protocol
//!
//! [`MessageHandler`] turns one received message into the messages it
//! answers with. It never touches sockets, so the exchange between nodes can
//! be driven directly in tests.

use crate::message::{BlockData, GetBlocks, GetData, Inv, Message, Version};
use crate::peer::PeerBook;
use crate::NetworkResult;
use chain_core::{Block, Hash};
use chain_db::{Blockchain, DbError};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Upper bound on blocks waiting for their parent
pub const MAX_ORPHANS: usize = 256;

/// A reply addressed to a peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    pub to: String,
    pub message: Message,
}

impl Outbound {
    pub fn new(to: impl Into<String>, message: Message) -> Self {
        Self {
            to: to.into(),
            message,
        }
    }
}

pub struct MessageHandler {
    chain: Arc<Blockchain>,
    node_address: String,
    peers: Arc<PeerBook>,
    /// Blocks whose parent is unknown, keyed by that parent
    orphans: Mutex<HashMap<Hash, Vec<Block>>>,
}

impl MessageHandler {
    pub fn new(chain: Arc<Blockchain>, node_address: impl Into<String>, peers: Arc<PeerBook>) -> Self {
        Self {
            chain,
            node_address: node_address.into(),
            peers,
            orphans: Mutex::new(HashMap::new()),
        }
    }

    pub fn chain(&self) -> &Arc<Blockchain> {
        &self.chain
    }

    pub fn peers(&self) -> &Arc<PeerBook> {
        &self.peers
    }

    pub fn node_address(&self) -> &str {
        &self.node_address
    }

    pub fn orphan_count(&self) -> usize {
        self.orphans.lock().values().map(Vec::len).sum()
    }

    /// Our own `version` announcement
    pub fn version(&self) -> NetworkResult<Message> {
        Ok(Message::Version(Version {
            height: self.chain.height()?,
            addr_from: self.node_address.clone(),
        }))
    }

    pub fn handle(&self, message: Message) -> NetworkResult<Vec<Outbound>> {
        debug!(%message, "Handling message");
        match message {
            Message::Version(version) => self.handle_version(version),
            Message::GetBlocks(request) => self.handle_get_blocks(request),
            Message::Inv(inv) => self.handle_inv(inv),
            Message::GetData(request) => self.handle_get_data(request),
            Message::Block(data) => self.handle_block(data),
        }
    }

    fn handle_version(&self, version: Version) -> NetworkResult<Vec<Outbound>> {
        if self.peers.add(&version.addr_from) {
            info!(peer = %version.addr_from, "Discovered peer");
        }

        let height = self.chain.height()?;
        let reply = if height < version.height {
            Some(Message::GetBlocks(GetBlocks {
                addr_from: self.node_address.clone(),
            }))
        } else if height > version.height {
            Some(self.version()?)
        } else {
            None
        };
        Ok(reply
            .map(|message| Outbound::new(version.addr_from, message))
            .into_iter()
            .collect())
    }

    fn handle_get_blocks(&self, request: GetBlocks) -> NetworkResult<Vec<Outbound>> {
        let inv = Inv {
            addr_from: self.node_address.clone(),
            hashes: self.chain.block_hashes()?,
        };
        Ok(vec![Outbound::new(request.addr_from, Message::Inv(inv))])
    }

    /// Request every announced block we lack, oldest first
    fn handle_inv(&self, inv: Inv) -> NetworkResult<Vec<Outbound>> {
        let mut requests = Vec::new();
        for hash in inv.hashes.iter().rev() {
            if self.chain.contains_block(hash)? || self.is_orphan(hash) {
                continue;
            }
            requests.push(Outbound::new(
                inv.addr_from.clone(),
                Message::GetData(GetData {
                    addr_from: self.node_address.clone(),
                    hash: *hash,
                }),
            ));
        }
        debug!(announced = inv.hashes.len(), requested = requests.len(), "Processed inventory");
        Ok(requests)
    }

    fn handle_get_data(&self, request: GetData) -> NetworkResult<Vec<Outbound>> {
        match self.chain.get_block_bytes(&request.hash)? {
            Some(block) => Ok(vec![Outbound::new(
                request.addr_from,
                Message::Block(BlockData {
                    addr_from: self.node_address.clone(),
                    block,
                }),
            )]),
            None => {
                debug!(hash = %request.hash, "Requested block is unknown");
                Ok(Vec::new())
            }
        }
    }

    fn handle_block(&self, data: BlockData) -> NetworkResult<Vec<Outbound>> {
        let block = Block::deserialize(&data.block)?;
        let hash = block.hash;
        if self.chain.contains_block(&hash)? {
            debug!(%hash, "Ignoring known block");
            for child in self.connectable_orphans(&hash)? {
                self.append_with_orphans(child)?;
            }
            return Ok(Vec::new());
        }

        match self.chain.validate_block(&block) {
            Ok(()) => {}
            Err(DbError::OrphanBlock { parent, .. }) => {
                if !self.stash_orphan(block) {
                    return Ok(Vec::new());
                }
                // The parent may have landed while this block was checked
                if self.chain.contains_block(&parent)? {
                    for child in self.connectable_orphans(&parent)? {
                        self.append_with_orphans(child)?;
                    }
                    return Ok(Vec::new());
                }
                if self.is_orphan(&parent) {
                    return Ok(Vec::new());
                }
                // Ask the sender for the gap
                return Ok(vec![Outbound::new(
                    data.addr_from,
                    Message::GetData(GetData {
                        addr_from: self.node_address.clone(),
                        hash: parent,
                    }),
                )]);
            }
            Err(err) if err.is_validation() => {
                warn!(%hash, from = %data.addr_from, error = %err, "Rejected block");
                return Ok(Vec::new());
            }
            Err(err) => return Err(err.into()),
        }

        self.append_with_orphans(block)?;
        Ok(Vec::new())
    }

    /// Append `block`, then every pooled descendant that became connectable
    fn append_with_orphans(&self, block: Block) -> NetworkResult<()> {
        let mut queue = VecDeque::from([block]);
        while let Some(block) = queue.pop_front() {
            let hash = block.hash;
            let height = block.height;
            let outcome = self.chain.append(block)?;
            info!(%hash, height, ?outcome, "Accepted block from peer");
            queue.extend(self.connectable_orphans(&hash)?);
        }
        Ok(())
    }

    /// Take the pooled children of `parent` that now validate
    fn connectable_orphans(&self, parent: &Hash) -> NetworkResult<Vec<Block>> {
        let children = self.orphans.lock().remove(parent).unwrap_or_default();
        let mut valid = Vec::with_capacity(children.len());
        for child in children {
            match self.chain.validate_block(&child) {
                Ok(()) => valid.push(child),
                Err(err) if err.is_validation() => {
                    warn!(hash = %child.hash, error = %err, "Dropped orphan block");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(valid)
    }

    /// Pool a block whose parent is missing; false if it was not pooled
    fn stash_orphan(&self, block: Block) -> bool {
        let mut orphans = self.orphans.lock();
        let pooled: usize = orphans.values().map(Vec::len).sum();
        if pooled >= MAX_ORPHANS {
            warn!(hash = %block.hash, "Orphan pool full, dropping block");
            return false;
        }

        let siblings = orphans.entry(block.prev_hash).or_default();
        if siblings.iter().any(|b| b.hash == block.hash) {
            return false;
        }
        warn!(hash = %block.hash, parent = %block.prev_hash, "Pooled orphan block");
        siblings.push(block);
        true
    }

    fn is_orphan(&self, hash: &Hash) -> bool {
        self.orphans
            .lock()
            .values()
            .flatten()
            .any(|block| block.hash == *hash)
    }
}
