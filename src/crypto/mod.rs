//! Cryptographic utilities for the wallet
//!
//! This module provides:
//! - SHA-256 / RIPEMD-160 hashing and base64 helpers
//! - ECDSA key management (secp256k1)
//! - BIP32 hierarchical derivation and BIP39 mnemonic seeds
//! - Checksummed 160-bit content hashes used as addresses

pub mod chash;
pub mod hash;
pub mod hd;
pub mod keys;
pub mod mnemonic;

pub use chash::{chash160, is_chash_valid, CHASH160_LENGTH};
pub use hash::{
    decode_base64, encode_base64, is_valid_base64, ripemd160, sha256, sha256_base64, HASH_LENGTH,
    PUBKEY_LENGTH,
};
pub use hd::{ChildNumber, DerivationPath, ExtendedPrivateKey, ExtendedPublicKey, HdError};
pub use keys::{
    public_key_from_base64, public_key_to_base64, sign_digest, verify_signature, KeyError,
    KeyPair, SIG_LENGTH,
};
pub use mnemonic::{derive_key_pair, MnemonicSeed};
