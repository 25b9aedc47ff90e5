//! Addresses of the peers a node knows about

use parking_lot::RwLock;
use std::collections::BTreeSet;

/// Known peer addresses, shared between connection tasks
#[derive(Debug, Default)]
pub struct PeerBook {
    peers: RwLock<BTreeSet<String>>,
}

impl PeerBook {
    pub fn new<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            peers: RwLock::new(addresses.into_iter().map(Into::into).collect()),
        }
    }

    /// Remember `address`; returns true when it was not known before
    pub fn add(&self, address: &str) -> bool {
        if self.peers.read().contains(address) {
            return false;
        }
        self.peers.write().insert(address.to_string())
    }

    pub fn remove(&self, address: &str) -> bool {
        self.peers.write().remove(address)
    }

    pub fn contains(&self, address: &str) -> bool {
        self.peers.read().contains(address)
    }

    pub fn addresses(&self) -> Vec<String> {
        self.peers.read().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.peers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_book() {
        let book = PeerBook::new(["localhost:3000"]);
        assert!(book.contains("localhost:3000"));

        assert!(book.add("localhost:3001"));
        assert!(!book.add("localhost:3001"));
        assert_eq!(book.len(), 2);

        assert!(book.remove("localhost:3000"));
        assert_eq!(book.addresses(), vec!["localhost:3001".to_string()]);
    }
}
