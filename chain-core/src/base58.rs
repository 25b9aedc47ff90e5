//! Base58 codec with the Bitcoin alphabet
//!
//! Leading zero bytes are encoded as leading `'1'` characters so that the
//! encoding round-trips byte strings of any length.

use crate::{CoreError, CoreResult};

const ALPHABET: &[u8; 58] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

fn digit_value(c: u8) -> Option<u8> {
    ALPHABET.iter().position(|&a| a == c).map(|i| i as u8)
}

/// Encode bytes as a Base58 string
pub fn encode(input: &[u8]) -> String {
    let zeros = input.iter().take_while(|&&b| b == 0).count();

    // Base-58 digits, least significant first
    let mut digits: Vec<u8> = Vec::with_capacity(input.len() * 138 / 100 + 1);
    for &byte in &input[zeros..] {
        let mut carry = byte as u32;
        for digit in digits.iter_mut() {
            carry += (*digit as u32) << 8;
            *digit = (carry % 58) as u8;
            carry /= 58;
        }
        while carry > 0 {
            digits.push((carry % 58) as u8);
            carry /= 58;
        }
    }

    let mut out = String::with_capacity(zeros + digits.len());
    out.extend(std::iter::repeat('1').take(zeros));
    out.extend(digits.iter().rev().map(|&d| ALPHABET[d as usize] as char));
    out
}

/// Decode a Base58 string into bytes
pub fn decode(input: &str) -> CoreResult<Vec<u8>> {
    let raw = input.as_bytes();
    let zeros = raw.iter().take_while(|&&c| c == b'1').count();

    // Base-256 bytes, least significant first
    let mut bytes: Vec<u8> = Vec::with_capacity(raw.len());
    for &c in &raw[zeros..] {
        let value = digit_value(c).ok_or_else(|| {
            CoreError::InvalidAddress(format!("invalid base58 character {:?}", c as char))
        })?;
        let mut carry = value as u32;
        for byte in bytes.iter_mut() {
            carry += (*byte as u32) * 58;
            *byte = (carry & 0xff) as u8;
            carry >>= 8;
        }
        while carry > 0 {
            bytes.push((carry & 0xff) as u8);
            carry >>= 8;
        }
    }

    let mut out = vec![0u8; zeros];
    out.extend(bytes.iter().rev());
    Ok(out)
}
