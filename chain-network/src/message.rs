//! Wire messages exchanged between nodes
//!
//! Every message travels on its own connection as a 12-byte ASCII command
//! tag, padded with NUL bytes, followed by the bincode encoded payload.

use crate::{NetworkError, NetworkResult};
use bytes::{BufMut, BytesMut};
use chain_core::{codec, Block, BlockHeight, Hash};
use std::fmt;

/// Length of the command tag in front of every payload
pub const COMMAND_LEN: usize = 12;

/// Command tags
pub mod commands {
    pub const VERSION: &str = "version";
    pub const GET_BLOCKS: &str = "getblocks";
    pub const INV: &str = "inv";
    pub const GET_DATA: &str = "getdata";
    pub const BLOCK: &str = "block";
}

/// Announces the sender's chain height
#[derive(Debug, Clone, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct Version {
    pub height: BlockHeight,
    pub addr_from: String,
}

/// Asks for the hashes of every block the receiver has
#[derive(Debug, Clone, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct GetBlocks {
    pub addr_from: String,
}

/// Block hashes held by the sender, newest first
#[derive(Debug, Clone, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct Inv {
    pub addr_from: String,
    pub hashes: Vec<Hash>,
}

/// Asks for one block
#[derive(Debug, Clone, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct GetData {
    pub addr_from: String,
    pub hash: Hash,
}

/// A serialized block
#[derive(Debug, Clone, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct BlockData {
    pub addr_from: String,
    pub block: Vec<u8>,
}

impl BlockData {
    pub fn from_block(addr_from: impl Into<String>, block: &Block) -> NetworkResult<Self> {
        Ok(Self {
            addr_from: addr_from.into(),
            block: block.serialize()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Version(Version),
    GetBlocks(GetBlocks),
    Inv(Inv),
    GetData(GetData),
    Block(BlockData),
}

impl Message {
    pub fn command(&self) -> &'static str {
        match self {
            Message::Version(_) => commands::VERSION,
            Message::GetBlocks(_) => commands::GET_BLOCKS,
            Message::Inv(_) => commands::INV,
            Message::GetData(_) => commands::GET_DATA,
            Message::Block(_) => commands::BLOCK,
        }
    }

    /// Address the sender listens on
    pub fn addr_from(&self) -> &str {
        match self {
            Message::Version(m) => &m.addr_from,
            Message::GetBlocks(m) => &m.addr_from,
            Message::Inv(m) => &m.addr_from,
            Message::GetData(m) => &m.addr_from,
            Message::Block(m) => &m.addr_from,
        }
    }

    /// Command tag followed by the payload
    pub fn to_bytes(&self) -> NetworkResult<Vec<u8>> {
        let payload = match self {
            Message::Version(m) => codec::encode(m)?,
            Message::GetBlocks(m) => codec::encode(m)?,
            Message::Inv(m) => codec::encode(m)?,
            Message::GetData(m) => codec::encode(m)?,
            Message::Block(m) => codec::encode(m)?,
        };

        let mut buf = BytesMut::with_capacity(COMMAND_LEN + payload.len());
        buf.put_slice(&command_to_bytes(self.command()));
        buf.put_slice(&payload);
        Ok(buf.to_vec())
    }

    pub fn from_bytes(bytes: &[u8]) -> NetworkResult<Self> {
        if bytes.len() < COMMAND_LEN {
            return Err(NetworkError::Encoding(format!(
                "message of {} bytes is shorter than its command tag",
                bytes.len()
            )));
        }
        let (tag, payload) = bytes.split_at(COMMAND_LEN);

        let message = match bytes_to_command(tag).as_str() {
            commands::VERSION => Message::Version(codec::decode(payload)?),
            commands::GET_BLOCKS => Message::GetBlocks(codec::decode(payload)?),
            commands::INV => Message::Inv(codec::decode(payload)?),
            commands::GET_DATA => Message::GetData(codec::decode(payload)?),
            commands::BLOCK => Message::Block(codec::decode(payload)?),
            other => return Err(NetworkError::UnknownCommand(other.to_string())),
        };
        Ok(message)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::Version(m) => write!(f, "version(height={}) from {}", m.height, m.addr_from),
            Message::Inv(m) => write!(f, "inv({} hashes) from {}", m.hashes.len(), m.addr_from),
            Message::GetData(m) => write!(f, "getdata({}) from {}", m.hash, m.addr_from),
            Message::Block(m) => write!(f, "block({} bytes) from {}", m.block.len(), m.addr_from),
            Message::GetBlocks(m) => write!(f, "getblocks from {}", m.addr_from),
        }
    }
}

/// NUL padded command tag; longer commands are truncated
pub fn command_to_bytes(command: &str) -> [u8; COMMAND_LEN] {
    let mut tag = [0u8; COMMAND_LEN];
    for (slot, byte) in tag.iter_mut().zip(command.bytes()) {
        *slot = byte;
    }
    tag
}

pub fn bytes_to_command(tag: &[u8]) -> String {
    tag.iter()
        .take_while(|b| **b != 0)
        .map(|b| *b as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain_core::hashing::sha256;

    #[test]
    fn test_command_tag_padding() {
        let tag = command_to_bytes(commands::GET_BLOCKS);
        assert_eq!(&tag[..9], b"getblocks");
        assert!(tag[9..].iter().all(|b| *b == 0));
        assert_eq!(bytes_to_command(&tag), "getblocks");
    }

    #[test]
    fn test_message_framing() {
        let message = Message::Inv(Inv {
            addr_from: "localhost:3001".into(),
            hashes: vec![sha256(b"a"), sha256(b"b")],
        });
        let bytes = message.to_bytes().unwrap();
        assert_eq!(bytes_to_command(&bytes[..COMMAND_LEN]), "inv");
        assert_eq!(Message::from_bytes(&bytes).unwrap(), message);
        assert_eq!(message.addr_from(), "localhost:3001");
    }

    #[test]
    fn test_unknown_command() {
        let mut bytes = command_to_bytes("tx").to_vec();
        bytes.extend_from_slice(&[1, 2, 3]);
        assert!(matches!(
            Message::from_bytes(&bytes),
            Err(NetworkError::UnknownCommand(cmd)) if cmd == "tx"
        ));
    }

    #[test]
    fn test_truncated_message() {
        assert!(matches!(
            Message::from_bytes(b"version"),
            Err(NetworkError::Encoding(_))
        ));

        let message = Message::GetData(GetData {
            addr_from: "localhost:3000".into(),
            hash: sha256(b"block"),
        });
        let bytes = message.to_bytes().unwrap();
        assert!(Message::from_bytes(&bytes[..bytes.len() - 1]).is_err());
    }
}
