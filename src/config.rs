//! Wallet configuration
//!
//! Read from `<data_dir>/conf.json` when present. Command-line flags are
//! applied on top by the binary.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::composer::{FeeRate, MIN_FEE_RATE};
use crate::funds::SpendUnconfirmed;
use crate::storage::{load_json, StorageError};

pub const CONFIG_FILE: &str = "conf.json";
pub const DEFAULT_DATA_DIR: &str = ".headless_wallet";
pub const DEFAULT_RPC_PORT: u16 = 6332;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read config: {0}")]
    Load(#[from] StorageError),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    pub rpc_interface: String,
    pub rpc_port: u16,
    /// Idle bound of one RPC request, in seconds
    pub rpc_timeout_secs: u64,
    pub data_dir: PathBuf,
    pub spend_unconfirmed: SpendUnconfirmed,
    pub fee_rate: u64,
    pub private_payment_endpoint: Option<String>,
    /// JSON file with `mnemonic_phrase` and `passphrase` unlocked at startup
    pub wallet_file: Option<PathBuf>,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            rpc_interface: "0.0.0.0".to_string(),
            rpc_port: DEFAULT_RPC_PORT,
            rpc_timeout_secs: 900,
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            spend_unconfirmed: SpendUnconfirmed::default(),
            fee_rate: MIN_FEE_RATE,
            private_payment_endpoint: None,
            wallet_file: None,
        }
    }
}

impl WalletConfig {
    /// Load `<data_dir>/conf.json`, falling back to defaults
    pub fn load(data_dir: &Path) -> Result<Self, ConfigError> {
        let path = data_dir.join(CONFIG_FILE);
        let mut config = match load_json::<WalletConfig>(&path)? {
            Some(config) => {
                log::info!("Loaded config from {}", path.display());
                config
            }
            None => WalletConfig::default(),
        };
        config.data_dir = data_dir.to_path_buf();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rpc_port == 0 {
            return Err(ConfigError::Invalid("rpc_port must be non-zero".into()));
        }
        if self.rpc_timeout_secs == 0 {
            return Err(ConfigError::Invalid("rpc_timeout_secs must be non-zero".into()));
        }
        if self.fee_rate < MIN_FEE_RATE {
            return Err(ConfigError::Invalid(format!(
                "fee_rate must be at least {}",
                MIN_FEE_RATE
            )));
        }
        if let Some(endpoint) = &self.private_payment_endpoint {
            if !endpoint.starts_with("ws://") && !endpoint.starts_with("wss://") {
                return Err(ConfigError::Invalid(format!(
                    "private_payment_endpoint must be a ws:// or wss:// URL, got {}",
                    endpoint
                )));
            }
        }
        Ok(())
    }

    pub fn rpc_address(&self) -> String {
        format!("{}:{}", self.rpc_interface, self.rpc_port)
    }

    pub fn fee_rate(&self) -> FeeRate {
        FeeRate::per_byte(self.fee_rate)
    }

    pub fn wallets_dir(&self) -> PathBuf {
        self.data_dir.join("wallets")
    }

    pub fn outputs_path(&self) -> PathBuf {
        self.data_dir.join("outputs.json")
    }

    pub fn outbox_path(&self) -> PathBuf {
        self.data_dir.join("outbox.jsonl")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::save_json;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_without_file() {
        let dir = tempdir().unwrap();
        let config = WalletConfig::load(dir.path()).unwrap();
        assert_eq!(config.rpc_port, 6332);
        assert_eq!(config.rpc_interface, "0.0.0.0");
        assert_eq!(config.rpc_timeout_secs, 900);
        assert_eq!(config.spend_unconfirmed, SpendUnconfirmed::Own);
        assert_eq!(config.data_dir, dir.path());
        assert_eq!(config.rpc_address(), "0.0.0.0:6332");
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempdir().unwrap();
        let raw = serde_json::json!({"rpc_port": 7000, "spend_unconfirmed": "all"});
        save_json(&dir.path().join(CONFIG_FILE), &raw).unwrap();

        let config = WalletConfig::load(dir.path()).unwrap();
        assert_eq!(config.rpc_port, 7000);
        assert_eq!(config.spend_unconfirmed, SpendUnconfirmed::All);
        assert_eq!(config.fee_rate, MIN_FEE_RATE);
    }

    #[test]
    fn test_rejects_bad_endpoint() {
        let config = WalletConfig {
            private_payment_endpoint: Some("http://relay".into()),
            ..WalletConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
