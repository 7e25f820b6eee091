//! Hashing and text encodings shared by keys, addresses and units
//!
//! Provides SHA-256, RIPEMD-160 and the base64 conventions used for
//! public keys, signatures and 44-character hash identifiers.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

/// Length of a base64-encoded 32-byte hash (unit ids, asset ids)
pub const HASH_LENGTH: usize = 44;

/// Length of a base64-encoded compressed public key
pub const PUBKEY_LENGTH: usize = 44;

/// Computes SHA-256 hash of the input data
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Computes RIPEMD-160 hash of the input data
pub fn ripemd160(data: &[u8]) -> [u8; 20] {
    let mut hasher = Ripemd160::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Computes SHA-256 hash and returns it base64-encoded
pub fn sha256_base64(data: &[u8]) -> String {
    BASE64.encode(sha256(data))
}

/// Standard (padded) base64 encoding
pub fn encode_base64(data: &[u8]) -> String {
    BASE64.encode(data)
}

/// Standard (padded) base64 decoding
pub fn decode_base64(encoded: &str) -> Option<Vec<u8>> {
    BASE64.decode(encoded).ok()
}

/// Checks that `encoded` is canonical base64 of exactly `len` characters.
///
/// Canonical means decoding and re-encoding yields the same string, which
/// rejects non-zero padding bits and stray characters.
pub fn is_valid_base64(encoded: &str, len: usize) -> bool {
    if encoded.len() != len {
        return false;
    }
    match decode_base64(encoded) {
        Some(bytes) => encode_base64(&bytes) == encoded,
        None => false,
    }
}
