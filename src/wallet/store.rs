//! Wallet state stores
//!
//! `commit_issued` is the only mutation after registration. It checks the
//! counter the caller read and writes the new address and counter in one
//! step, so an index is never skipped or handed out twice.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use thiserror::Error;

use super::record::{IssuedAddress, WalletState};
use crate::crypto::decode_base64;
use crate::storage::{load_json, save_json, StorageError};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Unknown wallet {0}")]
    UnknownWallet(String),
    #[error("Counter moved for wallet {wallet}: expected {expected}, found {found}")]
    CounterMismatch {
        wallet: String,
        expected: u32,
        found: u32,
    },
    #[error("Store lock poisoned")]
    Poisoned,
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Persistence of wallet state
pub trait WalletStore: Send + Sync {
    /// Add a wallet; an already known wallet keeps its stored state
    fn register(&self, state: WalletState) -> Result<WalletState, StoreError>;

    fn load(&self, wallet: &str) -> Result<Option<WalletState>, StoreError>;

    /// Record `issued` if its chain's counter still equals `expected_index`
    fn commit_issued(
        &self,
        wallet: &str,
        expected_index: u32,
        issued: IssuedAddress,
    ) -> Result<WalletState, StoreError>;

    fn list(&self) -> Result<Vec<String>, StoreError>;
}

fn apply_issued(
    state: &mut WalletState,
    expected_index: u32,
    issued: IssuedAddress,
) -> Result<(), StoreError> {
    let found = state.next_index(issued.is_change);
    if found != expected_index || issued.address_index != expected_index {
        return Err(StoreError::CounterMismatch {
            wallet: state.wallet.clone(),
            expected: expected_index,
            found,
        });
    }
    state.record_issued(issued);
    Ok(())
}

// =============================================================================
// In-memory store
// =============================================================================

#[derive(Debug, Default)]
pub struct MemoryWalletStore {
    wallets: Mutex<HashMap<String, WalletState>>,
}

impl MemoryWalletStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WalletStore for MemoryWalletStore {
    fn register(&self, state: WalletState) -> Result<WalletState, StoreError> {
        let mut wallets = self.wallets.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(wallets.entry(state.wallet.clone()).or_insert(state).clone())
    }

    fn load(&self, wallet: &str) -> Result<Option<WalletState>, StoreError> {
        let wallets = self.wallets.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(wallets.get(wallet).cloned())
    }

    fn commit_issued(
        &self,
        wallet: &str,
        expected_index: u32,
        issued: IssuedAddress,
    ) -> Result<WalletState, StoreError> {
        let mut wallets = self.wallets.lock().map_err(|_| StoreError::Poisoned)?;
        let state = wallets
            .get_mut(wallet)
            .ok_or_else(|| StoreError::UnknownWallet(wallet.to_string()))?;
        apply_issued(state, expected_index, issued)?;
        Ok(state.clone())
    }

    fn list(&self) -> Result<Vec<String>, StoreError> {
        let wallets = self.wallets.lock().map_err(|_| StoreError::Poisoned)?;
        let mut ids: Vec<String> = wallets.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

// =============================================================================
// File store
// =============================================================================

/// One JSON file per wallet under `<dir>`, replaced atomically on commit
#[derive(Debug)]
pub struct FileWalletStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileWalletStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(StorageError::from)?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    /// Wallet ids are base64 and may contain '/', so files are named by hex
    fn path_for(&self, wallet: &str) -> Result<PathBuf, StoreError> {
        let bytes = decode_base64(wallet).ok_or_else(|| {
            StoreError::Storage(StorageError::InvalidData(format!("bad wallet id {}", wallet)))
        })?;
        Ok(self.dir.join(format!("{}.json", hex::encode(bytes))))
    }
}

impl WalletStore for FileWalletStore {
    fn register(&self, state: WalletState) -> Result<WalletState, StoreError> {
        let _write = self.write_lock.lock().map_err(|_| StoreError::Poisoned)?;
        let path = self.path_for(&state.wallet)?;
        if let Some(existing) = load_json::<WalletState>(&path)? {
            return Ok(existing);
        }
        save_json(&path, &state)?;
        log::info!("Registered wallet {} at {}", state.wallet, path.display());
        Ok(state)
    }

    fn load(&self, wallet: &str) -> Result<Option<WalletState>, StoreError> {
        Ok(load_json(&self.path_for(wallet)?)?)
    }

    fn commit_issued(
        &self,
        wallet: &str,
        expected_index: u32,
        issued: IssuedAddress,
    ) -> Result<WalletState, StoreError> {
        let _write = self.write_lock.lock().map_err(|_| StoreError::Poisoned)?;
        let path = self.path_for(wallet)?;
        let mut state: WalletState =
            load_json(&path)?.ok_or_else(|| StoreError::UnknownWallet(wallet.to_string()))?;
        apply_issued(&mut state, expected_index, issued)?;
        save_json(&path, &state)?;
        Ok(state)
    }

    fn list(&self) -> Result<Vec<String>, StoreError> {
        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&self.dir).map_err(StorageError::from)? {
            let path = entry.map_err(StorageError::from)?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(state) = load_json::<WalletState>(&path)? {
                ids.push(state.wallet);
            }
        }
        ids.sort();
        Ok(ids)
    }
}
