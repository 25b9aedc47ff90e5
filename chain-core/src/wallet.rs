//! Keypairs, signatures and the per-node wallet collection

use crate::{codec, Address, CoreError, CoreResult, Hash, LockHash};
use secp256k1::{ecdsa, Message, PublicKey, Secp256k1, SecretKey};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Length of a public key: 32-byte X coordinate followed by 32-byte Y
pub const PUBLIC_KEY_LEN: usize = 64;

/// A secp256k1 keypair
#[derive(Clone, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct Wallet {
    secret_key: [u8; 32],
    public_key: Vec<u8>,
}

impl Wallet {
    /// Generate a fresh random keypair
    pub fn generate() -> Self {
        loop {
            let candidate: [u8; 32] = rand::random();
            // Zero and out-of-range scalars are not valid keys
            if let Ok(wallet) = Self::from_secret_bytes(candidate) {
                return wallet;
            }
        }
    }

    /// Rebuild a keypair from its secret scalar
    pub fn from_secret_bytes(secret: [u8; 32]) -> CoreResult<Self> {
        let secp = Secp256k1::new();
        let secret_key = SecretKey::from_slice(&secret)?;
        let public_key = PublicKey::from_secret_key(&secp, &secret_key);
        Ok(Self {
            secret_key: secret,
            public_key: raw_public_key(&public_key),
        })
    }

    /// Public key as the concatenation of both coordinates
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    pub fn lock_hash(&self) -> LockHash {
        *self.address().lock_hash()
    }

    pub fn address(&self) -> Address {
        Address::from_public_key(&self.public_key)
    }

    /// Sign a 32-byte digest, returning the compact `r ∥ s` signature
    pub fn sign_digest(&self, digest: &Hash) -> CoreResult<Vec<u8>> {
        let secp = Secp256k1::new();
        let secret_key = SecretKey::from_slice(&self.secret_key)?;
        let message = Message::from_digest_slice(digest.as_bytes())?;
        let signature = secp.sign_ecdsa(&message, &secret_key);
        Ok(signature.serialize_compact().to_vec())
    }
}

impl fmt::Debug for Wallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wallet")
            .field("address", &self.address().to_string())
            .finish_non_exhaustive()
    }
}

fn raw_public_key(public_key: &PublicKey) -> Vec<u8> {
    // Drop the 0x04 SEC1 tag
    public_key.serialize_uncompressed()[1..].to_vec()
}

/// Check a compact signature over `digest` against a raw `X ∥ Y` public key.
///
/// Malformed keys or signatures simply fail verification.
pub fn verify_signature(public_key: &[u8], digest: &Hash, signature: &[u8]) -> bool {
    if public_key.len() != PUBLIC_KEY_LEN {
        return false;
    }
    let mut sec1 = [0u8; PUBLIC_KEY_LEN + 1];
    sec1[0] = 0x04;
    sec1[1..].copy_from_slice(public_key);

    let secp = Secp256k1::verification_only();
    let (Ok(key), Ok(sig), Ok(message)) = (
        PublicKey::from_slice(&sec1),
        ecdsa::Signature::from_compact(signature),
        Message::from_digest_slice(digest.as_bytes()),
    ) else {
        return false;
    };
    secp.verify_ecdsa(&message, &sig, &key).is_ok()
}

/// Wallets owned by one node, keyed by address string
#[derive(Debug)]
pub struct Wallets {
    path: PathBuf,
    wallets: BTreeMap<String, Wallet>,
}

#[derive(bincode::Encode, bincode::Decode)]
struct WalletFile {
    wallets: BTreeMap<String, Wallet>,
}

impl Wallets {
    /// File holding the wallets of `node_id` inside `dir`
    pub fn file_path<P: AsRef<Path>>(dir: P, node_id: &str) -> PathBuf {
        dir.as_ref().join(format!("wallets_{node_id}.dat"))
    }

    /// Load the collection, starting empty when no file exists yet
    pub fn load<P: AsRef<Path>>(dir: P, node_id: &str) -> CoreResult<Self> {
        let path = Self::file_path(dir, node_id);
        if !path.exists() {
            return Ok(Self {
                path,
                wallets: BTreeMap::new(),
            });
        }

        let content = fs::read(&path)?;
        let file: WalletFile = codec::decode(&content)?;
        Ok(Self {
            path,
            wallets: file.wallets,
        })
    }

    /// Rewrite the wallet file
    pub fn save(&self) -> CoreResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = WalletFile {
            wallets: self.wallets.clone(),
        };
        fs::write(&self.path, codec::encode(&file)?)?;
        Ok(())
    }

    /// Generate a wallet, persist the collection and return its address
    pub fn create_wallet(&mut self) -> CoreResult<Address> {
        let wallet = Wallet::generate();
        let address = wallet.address();
        self.wallets.insert(address.to_string(), wallet);
        self.save()?;
        Ok(address)
    }

    pub fn get(&self, address: &Address) -> CoreResult<&Wallet> {
        self.wallets
            .get(address.as_str())
            .ok_or_else(|| CoreError::WalletNotFound(address.to_string()))
    }

    pub fn addresses(&self) -> impl Iterator<Item = &str> {
        self.wallets.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.wallets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
