//! Binary encoding for persisted and transmitted records
//!
//! Everything stored in the ledger goes through `bincode` with the standard
//! configuration. Decoding is strict: trailing bytes are an error.

use crate::{CoreError, CoreResult};
use bincode::{Decode, Encode};

/// Encode a value into bytes
pub fn encode<T: Encode>(value: &T) -> CoreResult<Vec<u8>> {
    Ok(bincode::encode_to_vec(value, bincode::config::standard())?)
}

/// Decode a value, rejecting trailing garbage
pub fn decode<T: Decode<()>>(bytes: &[u8]) -> CoreResult<T> {
    let (value, read) = bincode::decode_from_slice(bytes, bincode::config::standard())?;
    if read != bytes.len() {
        return Err(CoreError::Encoding(format!(
            "{} trailing bytes after record",
            bytes.len() - read
        )));
    }
    Ok(value)
}
