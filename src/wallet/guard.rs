//! Address issuance guard
//!
//! Issuing an address is read counter, derive, commit. All three run under
//! the wallet's issuance lock, and the commit is a compare-and-set on the
//! counter, so no two callers can ever get the same index.

use std::sync::Arc;
use thiserror::Error;

use super::record::{IssuedAddress, RecordError};
use super::store::{StoreError, WalletStore};
use crate::crypto::HdError;
use crate::locks::KeyedLocks;

#[derive(Error, Debug)]
pub enum GuardError {
    #[error("Unknown wallet {0}")]
    UnknownWallet(String),
    #[error("Issuance invariant violated: {0}")]
    ConcurrencyViolation(String),
    #[error("Derivation failed: {0}")]
    Derivation(#[from] RecordError),
    #[error("Store error: {0}")]
    Store(StoreError),
}

impl From<HdError> for GuardError {
    fn from(e: HdError) -> Self {
        GuardError::Derivation(RecordError::Derivation(e))
    }
}

impl From<StoreError> for GuardError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::UnknownWallet(wallet) => GuardError::UnknownWallet(wallet),
            StoreError::CounterMismatch { .. } => GuardError::ConcurrencyViolation(e.to_string()),
            other => GuardError::Store(other),
        }
    }
}

/// Lock key of a wallet's issuance scope
pub fn issuance_lock_key(wallet: &str) -> String {
    format!("issue:{}", wallet)
}

/// Serializes address issuance per wallet
#[derive(Clone)]
pub struct IssuanceGuard {
    store: Arc<dyn WalletStore>,
    locks: Arc<KeyedLocks>,
}

impl IssuanceGuard {
    pub fn new(store: Arc<dyn WalletStore>, locks: Arc<KeyedLocks>) -> Self {
        Self { store, locks }
    }

    pub fn store(&self) -> &Arc<dyn WalletStore> {
        &self.store
    }

    /// Issue the next address on the receiving or change chain of `wallet`
    pub async fn issue_next_address(&self, wallet: &str, is_change: bool) -> Result<IssuedAddress, GuardError> {
        let _guard = self.locks.lock(issuance_lock_key(wallet)).await;

        let state = self
            .store
            .load(wallet)?
            .ok_or_else(|| GuardError::UnknownWallet(wallet.to_string()))?;
        let index = state.next_index(is_change);
        let issued = IssuedAddress::derive(&state.xpub()?, is_change, index)?;

        match self.store.commit_issued(wallet, index, issued.clone()) {
            Ok(_) => {
                log::info!(
                    "Issued address {} (wallet {}, change {}, index {})",
                    issued.address,
                    wallet,
                    is_change,
                    index
                );
                Ok(issued)
            }
            Err(e) => {
                let e = GuardError::from(e);
                if matches!(e, GuardError::ConcurrencyViolation(_)) {
                    log::error!("Address issuance for {} raced: {}", wallet, e);
                }
                Err(e)
            }
        }
    }
}
