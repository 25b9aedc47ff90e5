//! Outbound side of the peer protocol

use crate::message::{BlockData, Message};
use crate::{NetworkError, NetworkResult};
use chain_core::Block;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Sends one message per connection
#[derive(Debug, Clone)]
pub struct Client {
    connect_timeout: Duration,
}

impl Client {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    /// Connect to `addr`, write `message` and close the connection
    pub async fn send(&self, addr: &str, message: &Message) -> NetworkResult<()> {
        let bytes = message.to_bytes()?;
        let mut stream = timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| NetworkError::Timeout(addr.to_string()))??;

        stream.write_all(&bytes).await?;
        stream.shutdown().await?;
        debug!(to = addr, command = message.command(), bytes = bytes.len(), "Sent message");
        Ok(())
    }

    /// Offer `block` to every address; returns how many deliveries succeeded
    pub async fn broadcast_block(&self, addr_from: &str, peers: &[String], block: &Block) -> NetworkResult<usize> {
        let message = Message::Block(BlockData::from_block(addr_from, block)?);
        let mut delivered = 0;
        for peer in peers.iter().filter(|peer| peer.as_str() != addr_from) {
            match self.send(peer, &message).await {
                Ok(()) => delivered += 1,
                Err(err) => warn!(peer = %peer, error = %err, "Failed to broadcast block"),
            }
        }
        Ok(delivered)
    }
}
