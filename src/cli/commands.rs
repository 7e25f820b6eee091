//! CLI commands for the wallet
//!
//! Implements all command handlers for the CLI interface.

use std::path::Path;
use std::sync::Arc;

use crate::composer::{Composer, SizeFeePolicy};
use crate::config::WalletConfig;
use crate::crypto::{DerivationPath, MnemonicSeed};
use crate::definition::{is_valid_address, SpendingDefinition};
use crate::funds::MemoryBalanceIndex;
use crate::locks::KeyedLocks;
use crate::network::OutboxNetwork;
use crate::rpc::{create_router, RpcState};
use crate::storage::{load_json, save_json, StorageError};
use crate::wallet::{
    create_wallet, FileWalletStore, IssuanceGuard, WalletSecrets, WalletSession, WalletStore,
};

/// Result type for CLI operations
pub type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Read a wallet file. A saved `createwallet` record is a valid wallet file.
pub fn load_wallet_file(path: &Path) -> CliResult<WalletSecrets> {
    load_json(path)?.ok_or_else(|| {
        StorageError::InvalidData(format!("wallet file {} not found", path.display())).into()
    })
}

/// Run the JSON-RPC server until Ctrl+C
pub async fn cmd_serve(config: WalletConfig) -> CliResult<()> {
    let locks = Arc::new(KeyedLocks::new());
    let store: Arc<dyn WalletStore> = Arc::new(FileWalletStore::new(config.wallets_dir())?);
    let session = Arc::new(WalletSession::new(IssuanceGuard::new(store, locks.clone())));

    match &config.wallet_file {
        Some(path) => {
            let state = session.open(load_wallet_file(path)?.unlock()?).await?;
            println!("🔓 Wallet {} unlocked", state.wallet);
            if let Some(main) = state.main_address() {
                println!("   🏠 Main address: {}", main.address);
            }
        }
        None => {
            log::warn!("No wallet file configured; call createwallet before spending");
        }
    }

    let balances = Arc::new(MemoryBalanceIndex::open(config.outputs_path())?);
    let composer = Arc::new(Composer::new(
        balances,
        Arc::new(SizeFeePolicy::new(config.fee_rate())),
        locks,
        config.spend_unconfirmed,
    ));
    let network = Arc::new(OutboxNetwork::new(
        config.outbox_path(),
        config.private_payment_endpoint.clone(),
    ));

    let addr = config.rpc_address();
    let state = RpcState {
        session,
        composer,
        network,
        config: Arc::new(config),
    };
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    println!("🚀 JSON-RPC server listening on http://{}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            println!("\n📴 Shutting down RPC server...");
        })
        .await?;
    Ok(())
}

/// Generate a wallet, print its record and optionally save it as a wallet file
pub fn cmd_create_wallet(passphrase: &str, output: Option<&Path>) -> CliResult<()> {
    let created = create_wallet(passphrase)?;
    println!("{}", serde_json::to_string_pretty(&created.record)?);

    if let Some(path) = output {
        save_json(path, &created.record)?;
        eprintln!("💾 Wallet saved to {}", path.display());
    }
    eprintln!("⚠️  The mnemonic phrase is the only backup of this wallet");
    Ok(())
}

pub fn cmd_validate_address(address: &str) -> CliResult<()> {
    if is_valid_address(address) {
        println!("✅ {} is a valid address", address);
        Ok(())
    } else {
        Err(format!("{} is not a valid address", address).into())
    }
}

/// Public key and single-sig address at an arbitrary derivation path
pub fn cmd_derive(wallet: &WalletSecrets, path: &str) -> CliResult<()> {
    let path: DerivationPath = path.parse()?;
    let seed = MnemonicSeed::import(&wallet.mnemonic_phrase, &wallet.passphrase)?;
    let key = seed.derive_key_pair(&path)?;
    let definition = SpendingDefinition::single_sig(&key.public_key);

    println!("🔑 Path:       {}", path);
    println!("   Public key: {}", key.public_key_base64());
    println!("   Address:    {}", definition.address()?);
    println!("   Definition: {}", definition.to_json());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::import_wallet;
    use tempfile::tempdir;

    const ABANDON_PHRASE: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    #[test]
    fn test_wallet_file_accepts_created_record() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wallet.json");
        let created = import_wallet(ABANDON_PHRASE, "").unwrap();
        save_json(&path, &created.record).unwrap();

        let unlocked = load_wallet_file(&path).unwrap().unlock().unwrap();
        assert_eq!(unlocked.state.wallet, created.state.wallet);
        assert_eq!(unlocked.record.address.as_str(), "QZAB2MYRLRVUNITTOOCF5ZE3AG4TCJDD");
    }

    #[test]
    fn test_missing_wallet_file() {
        let dir = tempdir().unwrap();
        assert!(load_wallet_file(&dir.path().join("absent.json")).is_err());
    }

    #[test]
    fn test_validate_address_command() {
        assert!(cmd_validate_address("QZAB2MYRLRVUNITTOOCF5ZE3AG4TCJDD").is_ok());
        assert!(cmd_validate_address("QZAB2MYRLRVUNITTOOCF5ZE3AG4TCJDE").is_err());
    }

    #[test]
    fn test_derive_rejects_bad_path() {
        let wallet = WalletSecrets {
            mnemonic_phrase: ABANDON_PHRASE.to_string(),
            passphrase: String::new(),
        };
        assert!(cmd_derive(&wallet, "m/44'/0'/0'/0/0").is_ok());
        assert!(cmd_derive(&wallet, "m/x").is_err());
    }
}
