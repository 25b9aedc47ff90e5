//! Peer protocol for exchanging blocks between nodes
//!
//! Nodes talk over plain TCP, one message per connection. A node announces
//! its height with `version`, a lower peer asks for the block inventory with
//! `getblocks`, and missing blocks are fetched one by one with `getdata`.

pub mod client;
pub mod config;
pub mod error;
pub mod handler;
pub mod message;
pub mod peer;
pub mod server;

pub use client::Client;
pub use config::NetworkConfig;
pub use error::{NetworkError, NetworkResult};
pub use handler::{MessageHandler, Outbound};
pub use message::Message;
pub use peer::PeerBook;
pub use server::Server;
