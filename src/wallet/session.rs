//! Wallet session
//!
//! Replaces a process-wide "current wallet": the session holds the unlocked
//! seeds of this process, the default wallet for commands that do not name
//! one, and the issuance guard. Seeds live in memory only.

use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use zeroize::Zeroizing;

use super::guard::{GuardError, IssuanceGuard};
use super::record::{CreatedWallet, IssuedAddress, WalletState};
use super::store::{StoreError, WalletStore};
use crate::signer::LocalSigner;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("No wallet is open")]
    NoWallet,
    #[error("Wallet {0} is not unlocked in this session")]
    Locked(String),
    #[error("Unknown wallet {0}")]
    UnknownWallet(String),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error(transparent)]
    Guard(#[from] GuardError),
    #[error("Seed task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub struct WalletSession {
    guard: IssuanceGuard,
    /// Stretched seeds, so building a signer never runs PBKDF2 again
    seeds: RwLock<HashMap<String, Zeroizing<[u8; 64]>>>,
    default_wallet: RwLock<Option<String>>,
}

impl WalletSession {
    pub fn new(guard: IssuanceGuard) -> Self {
        Self {
            guard,
            seeds: RwLock::new(HashMap::new()),
            default_wallet: RwLock::new(None),
        }
    }

    fn store(&self) -> &Arc<dyn WalletStore> {
        self.guard.store()
    }

    /// Register a wallet and keep its seed; the first opened wallet becomes the default
    pub async fn open(&self, created: CreatedWallet) -> Result<WalletState, SessionError> {
        let state = self.store().register(created.state)?;
        let mnemonic = created.seed;
        let seed = tokio::task::spawn_blocking(move || mnemonic.to_seed()).await?;
        self.seeds.write().await.insert(state.wallet.clone(), seed);

        let mut default = self.default_wallet.write().await;
        if default.is_none() {
            log::info!("Default wallet is {}", state.wallet);
            *default = Some(state.wallet.clone());
        }
        Ok(state)
    }

    pub async fn default_wallet(&self) -> Result<String, SessionError> {
        self.default_wallet
            .read()
            .await
            .clone()
            .ok_or(SessionError::NoWallet)
    }

    /// Named wallet, or the default one
    pub async fn resolve(&self, wallet: Option<&str>) -> Result<String, SessionError> {
        match wallet {
            Some(wallet) => Ok(wallet.to_string()),
            None => self.default_wallet().await,
        }
    }

    pub async fn state(&self, wallet: &str) -> Result<WalletState, SessionError> {
        self.store()
            .load(wallet)?
            .ok_or_else(|| SessionError::UnknownWallet(wallet.to_string()))
    }

    /// Issue the next address through the guard
    pub async fn issue_address(&self, wallet: &str, is_change: bool) -> Result<IssuedAddress, SessionError> {
        Ok(self.guard.issue_next_address(wallet, is_change).await?)
    }

    /// Signer over every address the wallet has issued so far
    pub async fn signer(&self, wallet: &str) -> Result<LocalSigner, SessionError> {
        let state = self.state(wallet).await?;
        let seed = self
            .seeds
            .read()
            .await
            .get(wallet)
            .cloned()
            .ok_or_else(|| SessionError::Locked(wallet.to_string()))?;
        Ok(LocalSigner::from_stretched(
            seed,
            state.account,
            state.addresses.iter().cloned(),
        ))
    }
}
