//! TCP listener for the peer protocol

use crate::client::Client;
use crate::handler::MessageHandler;
use crate::message::Message;
use crate::peer::PeerBook;
use crate::{NetworkConfig, NetworkError, NetworkResult};
use chain_db::Blockchain;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

pub struct Server {
    config: NetworkConfig,
    handler: Arc<MessageHandler>,
    client: Client,
}

impl Server {
    pub fn new(config: NetworkConfig, chain: Arc<Blockchain>) -> NetworkResult<Self> {
        config.validate().map_err(NetworkError::Config)?;
        let peers = Arc::new(PeerBook::new(config.known_nodes.iter().cloned()));
        let handler = Arc::new(MessageHandler::new(chain, config.node_address.clone(), peers));
        let client = Client::new(config.connect_timeout);
        Ok(Self {
            config,
            handler,
            client,
        })
    }

    pub fn handler(&self) -> &Arc<MessageHandler> {
        &self.handler
    }

    /// Bind the configured node address and serve until the listener fails
    pub async fn run(self) -> NetworkResult<()> {
        let listener = TcpListener::bind(&self.config.node_address).await?;
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener
    pub async fn serve(self, listener: TcpListener) -> NetworkResult<()> {
        info!(address = %self.config.node_address, height = self.handler.chain().height()?, "Node listening");
        self.announce().await;

        let shared = Arc::new(self);
        loop {
            let (stream, remote) = listener.accept().await?;
            let server = Arc::clone(&shared);
            tokio::spawn(async move {
                if let Err(err) = server.handle_connection(stream, remote).await {
                    warn!(%remote, error = %err, "Failed to handle connection");
                }
            });
        }
    }

    /// Send our version to the bootstrap node
    async fn announce(&self) {
        let Some(bootstrap) = self.config.bootstrap_node() else {
            return;
        };
        let result = match self.handler.version() {
            Ok(version) => self.client.send(bootstrap, &version).await,
            Err(err) => Err(err),
        };
        if let Err(err) = result {
            warn!(peer = bootstrap, error = %err, "Failed to announce version");
        }
    }

    async fn handle_connection(&self, stream: TcpStream, remote: SocketAddr) -> NetworkResult<()> {
        let limit = self.config.max_message_size;
        let mut bytes = Vec::new();
        stream.take(limit as u64 + 1).read_to_end(&mut bytes).await?;
        if bytes.len() > limit {
            return Err(NetworkError::MessageTooLarge {
                size: bytes.len(),
                limit,
            });
        }

        let message = Message::from_bytes(&bytes)?;
        debug!(%remote, command = message.command(), "Received message");

        // Chain access blocks on disk I/O
        let handler = Arc::clone(&self.handler);
        let replies = tokio::task::spawn_blocking(move || handler.handle(message))
            .await
            .map_err(|err| NetworkError::Io(std::io::Error::other(err)))??;

        for reply in replies {
            if let Err(err) = self.client.send(&reply.to, &reply.message).await {
                warn!(peer = %reply.to, command = reply.message.command(), error = %err, "Failed to send reply");
            }
        }
        Ok(())
    }
}
