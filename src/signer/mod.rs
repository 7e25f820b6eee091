//! The signing capability used by the composer
//!
//! The composer never sees key material. It asks a [`Signer`] which signing
//! paths an address needs, what its definition is, and for one signature
//! per path over the digest it computed.

pub mod local;

pub use local::LocalSigner;

use std::collections::BTreeMap;
use thiserror::Error;

use crate::crypto::{HdError, KeyError};
use crate::definition::{Address, SpendingDefinition};

/// Signer failures; every one of them fails the enclosing composition
#[derive(Error, Debug)]
pub enum SignerError {
    #[error("Definition not found for address {0}")]
    DefinitionNotFound(String),
    #[error("Address {address} has no signing path {path}")]
    UnknownSigningPath { address: String, path: String },
    #[error("Signer refused: {0}")]
    Refused(String),
    #[error("Key derivation failed: {0}")]
    Derivation(#[from] HdError),
    #[error("Signing failed: {0}")]
    Key(#[from] KeyError),
}

/// Capability to authorize spending from a set of addresses.
///
/// Implementations must be callable concurrently for different addresses.
pub trait Signer: Send + Sync {
    /// Expected signature length for every signing path of `address`
    fn signing_path_lengths(&self, address: &Address) -> Result<BTreeMap<String, usize>, SignerError> {
        Ok(self.definition(address)?.signing_path_lengths())
    }

    /// Spending definition of `address`
    fn definition(&self, address: &Address) -> Result<SpendingDefinition, SignerError>;

    /// Base64 signature over `digest` for one signing path of `address`
    fn sign(&self, digest: &[u8; 32], address: &Address, signing_path: &str) -> Result<String, SignerError>;
}
