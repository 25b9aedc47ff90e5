//! Base58Check addresses derived from public keys

use crate::hashing::{checksum, hash160, CHECKSUM_LEN};
use crate::{base58, CoreError, CoreResult, LockHash};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A validated address: `Base58(lock_hash ∥ checksum(lock_hash))`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address {
    encoded: String,
    lock_hash: LockHash,
}

impl Address {
    /// Derive the address that owns outputs locked to `public_key`
    pub fn from_public_key(public_key: &[u8]) -> Self {
        Self::from_lock_hash(hash160(public_key))
    }

    /// Build the address for an existing lock hash
    pub fn from_lock_hash(lock_hash: LockHash) -> Self {
        let mut payload = lock_hash.as_bytes().to_vec();
        payload.extend_from_slice(&checksum(lock_hash.as_bytes()));
        Self {
            encoded: base58::encode(&payload),
            lock_hash,
        }
    }

    /// Parse and validate an address string
    pub fn parse(address: &str) -> CoreResult<Self> {
        let payload = base58::decode(address)?;
        if payload.len() <= CHECKSUM_LEN {
            return Err(CoreError::InvalidAddress(format!(
                "{address}: payload too short"
            )));
        }
        let (body, sum) = payload.split_at(payload.len() - CHECKSUM_LEN);
        if checksum(body) != sum {
            return Err(CoreError::InvalidAddress(format!(
                "{address}: checksum mismatch"
            )));
        }
        let lock_hash = LockHash::from_slice(body)
            .map_err(|_| CoreError::InvalidAddress(format!("{address}: bad lock hash length")))?;
        Ok(Self {
            encoded: address.to_string(),
            lock_hash,
        })
    }

    /// Checksum validation only
    pub fn is_valid(address: &str) -> bool {
        Self::parse(address).is_ok()
    }

    pub fn lock_hash(&self) -> &LockHash {
        &self.lock_hash
    }

    pub fn as_str(&self) -> &str {
        &self.encoded
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encoded)
    }
}

impl FromStr for Address {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Address {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.encoded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_address() -> Address {
        Address::from_public_key(&[0x42u8; 64])
    }

    #[test]
    fn test_parse_roundtrip() {
        let address = sample_address();
        let parsed = Address::parse(address.as_str()).unwrap();
        assert_eq!(parsed, address);
        assert_eq!(parsed.lock_hash(), &hash160(&[0x42u8; 64]));
    }

    #[test]
    fn test_flipped_trailing_byte_fails_validation() {
        let address = sample_address();
        let mut payload = base58::decode(address.as_str()).unwrap();
        let last = payload.len() - 1;
        payload[last] ^= 0x01;
        let tampered = base58::encode(&payload);
        assert!(Address::is_valid(address.as_str()));
        assert!(!Address::is_valid(&tampered));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(!Address::is_valid(""));
        assert!(!Address::is_valid("not-an-address"));
        assert!(!Address::is_valid("1111"));
    }

    #[test]
    fn test_from_str() {
        let address = sample_address();
        let parsed: Address = address.to_string().parse().unwrap();
        assert_eq!(parsed.lock_hash(), address.lock_hash());
    }
}
