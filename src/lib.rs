//! Headless Wallet: the signing core of an unattended wallet
//!
//! This crate provides:
//! - BIP39 mnemonic seeds and BIP32/BIP44 key derivation
//! - Content-hash addresses derived from spending definitions
//! - A [`Signer`] contract with a seed-backed [`LocalSigner`]
//! - A transaction composer producing signed joints or a tagged failure
//! - Race-free address issuance built on keyed locks
//! - A JSON-RPC command surface and CLI
//!
//! # Example
//!
//! ```rust
//! use headless_wallet::definition::is_valid_address;
//! use headless_wallet::wallet::import_wallet;
//!
//! let phrase = "abandon abandon abandon abandon abandon abandon \
//!               abandon abandon abandon abandon abandon about";
//! let created = import_wallet(phrase, "").unwrap();
//! assert!(is_valid_address(created.record.address.as_str()));
//! println!("Wallet {} pays from {}", created.record.wallet, created.record.address);
//! ```

pub mod cli;
pub mod composer;
pub mod config;
pub mod crypto;
pub mod definition;
pub mod error;
pub mod funds;
pub mod locks;
pub mod network;
pub mod rpc;
pub mod signer;
pub mod storage;
pub mod wallet;

// Re-export commonly used types
pub use composer::{
    AssetDefinitionRequest, AssetPaymentRequest, AssetSpec, ComposedJoint, Composer,
    CompositionOutcome, Joint, PaymentRequest, Unit,
};
pub use config::WalletConfig;
pub use crypto::{DerivationPath, ExtendedPublicKey, KeyPair, MnemonicSeed};
pub use definition::{is_valid_address, Address, SpendingDefinition};
pub use error::WalletError;
pub use funds::{BalanceIndex, MemoryBalanceIndex, SpendUnconfirmed};
pub use locks::KeyedLocks;
pub use network::{Network, OutboxNetwork};
pub use rpc::{create_router, RpcState};
pub use signer::{LocalSigner, Signer};
pub use wallet::{create_wallet, import_wallet, IssuanceGuard, WalletRecord, WalletSession};
