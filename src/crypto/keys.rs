//! ECDSA key management
//!
//! Provides key pairs, signing and verification on the secp256k1 curve.
//! Public keys travel as base64 of the 33-byte compressed point and
//! signatures as base64 of the 64-byte compact form.

use secp256k1::ecdsa::Signature;
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use thiserror::Error;

use super::hash::{decode_base64, encode_base64};

/// Length of a base64-encoded compact ECDSA signature
pub const SIG_LENGTH: usize = 88;

/// Errors that can occur during key operations
#[derive(Error, Debug)]
pub enum KeyError {
    #[error("Invalid private key")]
    InvalidPrivateKey,
    #[error("Invalid public key")]
    InvalidPublicKey,
    #[error("Invalid signature")]
    InvalidSignature,
    #[error("Secp256k1 error: {0}")]
    Secp256k1Error(#[from] secp256k1::Error),
}

/// A key pair consisting of a private key and its corresponding public key
#[derive(Clone)]
pub struct KeyPair {
    pub secret_key: SecretKey,
    pub public_key: PublicKey,
}

impl KeyPair {
    /// Create a key pair from an existing secret key
    pub fn from_secret_key(secret_key: SecretKey) -> Self {
        let secp = Secp256k1::signing_only();
        let public_key = PublicKey::from_secret_key(&secp, &secret_key);
        Self {
            secret_key,
            public_key,
        }
    }

    /// Create a key pair from raw 32-byte private key material
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        let secret_key = SecretKey::from_slice(bytes).map_err(|_| KeyError::InvalidPrivateKey)?;
        Ok(Self::from_secret_key(secret_key))
    }

    /// Get the public key as base64 (compressed format)
    pub fn public_key_base64(&self) -> String {
        public_key_to_base64(&self.public_key)
    }

    /// Sign a 32-byte digest, returning the base64 compact signature
    pub fn sign(&self, digest: &[u8; 32]) -> Result<String, KeyError> {
        sign_digest(&self.secret_key, digest)
    }

    /// Verify a signature against this key pair's public key
    pub fn verify(&self, digest: &[u8; 32], signature: &str) -> Result<bool, KeyError> {
        verify_signature(&self.public_key, digest, signature)
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key_base64())
            .field("secret_key", &"[redacted]")
            .finish()
    }
}

impl Drop for KeyPair {
    fn drop(&mut self) {
        self.secret_key.non_secure_erase();
    }
}

/// Encode a public key as base64 of its compressed serialization
pub fn public_key_to_base64(public_key: &PublicKey) -> String {
    encode_base64(&public_key.serialize())
}

/// Parse a public key from base64 of a compressed point
pub fn public_key_from_base64(encoded: &str) -> Result<PublicKey, KeyError> {
    let bytes = decode_base64(encoded).ok_or(KeyError::InvalidPublicKey)?;
    if bytes.len() != 33 {
        return Err(KeyError::InvalidPublicKey);
    }
    PublicKey::from_slice(&bytes).map_err(|_| KeyError::InvalidPublicKey)
}

/// Sign a 32-byte digest with a secret key
pub fn sign_digest(secret_key: &SecretKey, digest: &[u8; 32]) -> Result<String, KeyError> {
    let secp = Secp256k1::signing_only();
    let message = Message::from_digest_slice(digest)?;
    let signature = secp.sign_ecdsa(&message, secret_key);
    Ok(encode_base64(&signature.serialize_compact()))
}

/// Verify a base64 compact signature over a 32-byte digest
pub fn verify_signature(
    public_key: &PublicKey,
    digest: &[u8; 32],
    signature: &str,
) -> Result<bool, KeyError> {
    let secp = Secp256k1::verification_only();
    let message = Message::from_digest_slice(digest)?;

    let sig_bytes = decode_base64(signature).ok_or(KeyError::InvalidSignature)?;
    let mut sig = Signature::from_compact(&sig_bytes).map_err(|_| KeyError::InvalidSignature)?;
    sig.normalize_s();

    match secp.verify_ecdsa(&message, &sig, public_key) {
        Ok(()) => Ok(true),
        Err(_) => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::hash::sha256;

    fn test_key() -> KeyPair {
        KeyPair::from_secret_bytes(&sha256(b"test key material")).unwrap()
    }

    #[test]
    fn test_sign_and_verify() {
        let kp = test_key();
        let digest = sha256(b"Hello, DAG!");

        let signature = kp.sign(&digest).unwrap();
        assert_eq!(signature.len(), SIG_LENGTH);
        assert!(kp.verify(&digest, &signature).unwrap());
    }

    #[test]
    fn test_wrong_digest_fails_verification() {
        let kp = test_key();
        let signature = kp.sign(&sha256(b"one")).unwrap();
        assert!(!kp.verify(&sha256(b"two"), &signature).unwrap());
    }

    #[test]
    fn test_public_key_base64_roundtrip() {
        let kp = test_key();
        let encoded = kp.public_key_base64();
        assert_eq!(encoded.len(), 44);
        assert_eq!(public_key_from_base64(&encoded).unwrap(), kp.public_key);
    }

    #[test]
    fn test_malformed_public_key_rejected() {
        assert!(public_key_from_base64("AAAA").is_err());
        assert!(public_key_from_base64("not base64").is_err());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let kp = test_key();
        let printed = format!("{:?}", kp);
        assert!(printed.contains("[redacted]"));
        assert!(!printed.contains(&hex::encode(kp.secret_key.secret_bytes())));
    }
}
