//! Hash primitives shared by blocks, transactions and addresses

use crate::{Hash, LockHash};
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

/// Length of the checksum appended to an address payload
pub const CHECKSUM_LEN: usize = 4;

/// SHA-256 of `data`
pub fn sha256(data: &[u8]) -> Hash {
    let digest: [u8; 32] = Sha256::digest(data).into();
    Hash::new(digest)
}

/// SHA-256 applied twice
pub fn double_sha256(data: &[u8]) -> Hash {
    let first = Sha256::digest(data);
    let second: [u8; 32] = Sha256::digest(first).into();
    Hash::new(second)
}

/// RIPEMD-160 over SHA-256, the lock hash of a public key
pub fn hash160(data: &[u8]) -> LockHash {
    let sha = Sha256::digest(data);
    let digest: [u8; 20] = Ripemd160::digest(sha).into();
    LockHash::new(digest)
}

/// First four bytes of the double SHA-256 of `data`
pub fn checksum(data: &[u8]) -> [u8; CHECKSUM_LEN] {
    let hash = double_sha256(data);
    let mut out = [0u8; CHECKSUM_LEN];
    out.copy_from_slice(&hash.as_bytes()[..CHECKSUM_LEN]);
    out
}

/// 8-byte big-endian encoding used in proof-of-work pre-images
pub fn int_to_be_bytes(value: i64) -> [u8; 8] {
    value.to_be_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_vector() {
        assert_eq!(
            sha256(b"abc").to_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_double_sha256_differs_from_single() {
        let once = sha256(b"hello");
        let twice = double_sha256(b"hello");
        assert_ne!(once, twice);
        assert_eq!(twice, sha256(once.as_bytes()));
    }

    #[test]
    fn test_hash160_known_vector() {
        // RIPEMD160(SHA256("")) as used for empty-script hashes
        assert_eq!(
            hash160(b"").to_hex(),
            "b472a266d0bd89c13706a4132ccfb16f7c3b9fcb"
        );
    }

    #[test]
    fn test_checksum_is_prefix_of_double_hash() {
        let data = b"checksum input";
        let sum = checksum(data);
        assert_eq!(&sum[..], &double_sha256(data).as_bytes()[..4]);
    }

    #[test]
    fn test_int_to_be_bytes() {
        assert_eq!(int_to_be_bytes(1), [0, 0, 0, 0, 0, 0, 0, 1]);
        assert_eq!(int_to_be_bytes(256), [0, 0, 0, 0, 0, 0, 1, 0]);
        assert_eq!(int_to_be_bytes(-1), [0xff; 8]);
    }
}
