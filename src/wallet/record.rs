//! Wallet records
//!
//! [`WalletRecord`] is what `createwallet` hands back to the caller and holds
//! secrets. [`WalletState`] is the public half the store persists: the
//! account xpub, the two address counters and every address issued so far.

use secp256k1::SecretKey;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::{
    encode_base64, public_key_to_base64, sha256_base64, DerivationPath, ExtendedPublicKey,
    HdError, MnemonicSeed,
};
use crate::definition::{device_address, Address, DefinitionError, SpendingDefinition};

/// Account every wallet created here lives under
pub const DEFAULT_ACCOUNT: u32 = 0;

#[derive(Error, Debug)]
pub enum RecordError {
    #[error("Key derivation failed: {0}")]
    Derivation(#[from] HdError),
    #[error("Definition error: {0}")]
    Definition(#[from] DefinitionError),
}

/// An address handed out by the issuance guard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedAddress {
    pub address: Address,
    pub is_change: bool,
    pub address_index: u32,
    pub definition: SpendingDefinition,
}

impl IssuedAddress {
    /// Derive the single-sig address at `<is_change>/<index>` below an account xpub
    pub fn derive(
        xpub: &ExtendedPublicKey,
        is_change: bool,
        address_index: u32,
    ) -> Result<Self, RecordError> {
        let path = DerivationPath::account_relative(is_change, address_index)?;
        let child = xpub.derive_path(&path)?;
        let definition = SpendingDefinition::single_sig(child.public_key());
        Ok(Self {
            address: definition.address()?,
            is_change,
            address_index,
            definition,
        })
    }
}

/// Next unissued index on each chain
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressCounters {
    pub receive: u32,
    pub change: u32,
}

/// Persisted, secret-free wallet state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletState {
    /// Wallet id: base64 SHA-256 of the xpub string
    pub wallet: String,
    pub xpubkey: String,
    pub account: u32,
    pub next_index: AddressCounters,
    pub addresses: Vec<IssuedAddress>,
}

impl WalletState {
    /// Fresh state with no issued addresses
    pub fn new(xpub: &ExtendedPublicKey, account: u32) -> Self {
        let xpubkey = xpub.to_string();
        Self {
            wallet: wallet_id(&xpubkey),
            xpubkey,
            account,
            next_index: AddressCounters::default(),
            addresses: Vec::new(),
        }
    }

    pub fn next_index(&self, is_change: bool) -> u32 {
        if is_change {
            self.next_index.change
        } else {
            self.next_index.receive
        }
    }

    pub fn xpub(&self) -> Result<ExtendedPublicKey, HdError> {
        self.xpubkey.parse()
    }

    /// Append an issued address and advance its chain's counter
    pub fn record_issued(&mut self, issued: IssuedAddress) {
        let counter = if issued.is_change {
            &mut self.next_index.change
        } else {
            &mut self.next_index.receive
        };
        *counter = issued.address_index.saturating_add(1);
        self.addresses.push(issued);
    }

    /// Receiving address #0
    pub fn main_address(&self) -> Option<&IssuedAddress> {
        self.addresses
            .iter()
            .find(|a| !a.is_change && a.address_index == 0)
    }

    pub fn find(&self, address: &Address) -> Option<&IssuedAddress> {
        self.addresses.iter().find(|a| &a.address == address)
    }

    pub fn address_list(&self) -> Vec<Address> {
        self.addresses.iter().map(|a| a.address.clone()).collect()
    }
}

/// Everything `createwallet` reports. Field names are part of the RPC contract.
#[derive(Clone, Serialize)]
pub struct WalletRecord {
    pub passphrase: String,
    pub mnemonic_phrase: String,
    pub temp_priv_key: String,
    pub prev_temp_priv_key: String,
    pub device_address: String,
    pub address: Address,
    pub wallet: String,
    pub is_change: u8,
    pub address_index: u32,
    pub definition: SpendingDefinition,
    pub xpubkey: String,
}

impl std::fmt::Debug for WalletRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletRecord")
            .field("wallet", &self.wallet)
            .field("address", &self.address)
            .field("device_address", &self.device_address)
            .field("mnemonic_phrase", &"[redacted]")
            .finish_non_exhaustive()
    }
}

/// Secrets that unlock a wallet. Every `createwallet` record carries them.
#[derive(Clone, Serialize, Deserialize)]
pub struct WalletSecrets {
    pub mnemonic_phrase: String,
    #[serde(default)]
    pub passphrase: String,
}

impl WalletSecrets {
    /// Rebuild the wallet; stretches the seed, so keep it off async workers
    pub fn unlock(&self) -> Result<CreatedWallet, RecordError> {
        import_wallet(&self.mnemonic_phrase, &self.passphrase)
    }
}

impl std::fmt::Debug for WalletSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("WalletSecrets([redacted])")
    }
}

/// A newly created or imported wallet
#[derive(Debug)]
pub struct CreatedWallet {
    pub record: WalletRecord,
    pub state: WalletState,
    pub seed: MnemonicSeed,
}

/// Wallet id of an xpub string
pub fn wallet_id(xpubkey: &str) -> String {
    sha256_base64(xpubkey.as_bytes())
}

/// Generate a new mnemonic and build the wallet around it
pub fn create_wallet(passphrase: &str) -> Result<CreatedWallet, RecordError> {
    build_wallet(MnemonicSeed::generate(passphrase))
}

/// Rebuild a wallet from an existing phrase
pub fn import_wallet(phrase: &str, passphrase: &str) -> Result<CreatedWallet, RecordError> {
    build_wallet(MnemonicSeed::import(phrase, passphrase)?)
}

fn random_key_base64() -> String {
    let key = SecretKey::new(&mut rand::thread_rng());
    encode_base64(&key.secret_bytes())
}

fn build_wallet(seed: MnemonicSeed) -> Result<CreatedWallet, RecordError> {
    let master = seed.master_key()?;
    let account = master
        .derive_path(&DerivationPath::bip44_account(DEFAULT_ACCOUNT)?)?
        .to_extended_public_key()?;

    let mut state = WalletState::new(&account, DEFAULT_ACCOUNT);
    let first = IssuedAddress::derive(&account, false, 0)?;
    state.record_issued(first.clone());

    let device_path: DerivationPath = "m/1'".parse()?;
    let device_key = master.derive_path(&device_path)?;
    let device_pubkey = public_key_to_base64(&device_key.public_key()?);

    let record = WalletRecord {
        passphrase: seed.passphrase().to_string(),
        mnemonic_phrase: seed.phrase(),
        temp_priv_key: random_key_base64(),
        prev_temp_priv_key: random_key_base64(),
        device_address: device_address(&device_pubkey)?,
        address: first.address,
        wallet: state.wallet.clone(),
        is_change: 0,
        address_index: first.address_index,
        definition: first.definition,
        xpubkey: state.xpubkey.clone(),
    };

    log::info!("Built wallet {} with first address {}", state.wallet, record.address);
    Ok(CreatedWallet {
        record,
        state,
        seed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const ABANDON_PHRASE: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    #[test]
    fn test_import_known_wallet() {
        let created = import_wallet(ABANDON_PHRASE, "").unwrap();
        assert_eq!(
            created.record.xpubkey,
            "xpub6BosfCnifzxcFwrSzQiqu2DBVTshkCXacvNsWGYJVVhhawA7d4R5WSWGFNbi8Aw6ZRc1brxMyWMzG3DSSSSoekkudhUd9yLb6qx39T9nMdj"
        );
        assert_eq!(created.record.wallet, "r04SBTDyb/qDRzmw6wMAk8iBv3P4+JP8aDeCMyXag/I=");
        assert_eq!(created.record.address.as_str(), "QZAB2MYRLRVUNITTOOCF5ZE3AG4TCJDD");
        assert_eq!(created.record.address_index, 0);
        assert_eq!(created.state.next_index(false), 1);
        assert_eq!(created.state.next_index(true), 0);
    }

    #[test]
    fn test_same_phrase_same_address_twice() {
        let first = import_wallet(ABANDON_PHRASE, "").unwrap();
        let second = import_wallet(ABANDON_PHRASE, "").unwrap();
        assert_eq!(first.record.address, second.record.address);
        assert_eq!(first.record.device_address, second.record.device_address);
        assert_ne!(first.record.temp_priv_key, second.record.temp_priv_key);
    }

    #[test]
    fn test_xpub_derivation_matches_known_index_one() {
        let created = import_wallet(ABANDON_PHRASE, "").unwrap();
        let xpub = created.state.xpub().unwrap();
        let second = IssuedAddress::derive(&xpub, false, 1).unwrap();
        assert_eq!(second.address.as_str(), "LBFE3LOJHOH24Y4J54RR6GDM3KVL2PWJ");
    }

    #[test]
    fn test_created_record_fields() {
        let created = create_wallet("secret").unwrap();
        let json = serde_json::to_value(&created.record).unwrap();
        for field in [
            "passphrase",
            "mnemonic_phrase",
            "temp_priv_key",
            "prev_temp_priv_key",
            "device_address",
            "address",
            "wallet",
            "is_change",
            "address_index",
            "definition",
            "xpubkey",
        ] {
            assert!(json.get(field).is_some(), "missing {}", field);
        }
        assert_eq!(json["passphrase"], "secret");
        assert_eq!(json["definition"][0], "sig");
        assert!(!format!("{:?}", created.record).contains(&created.record.mnemonic_phrase));
    }

    #[test]
    fn test_bad_phrase_is_invalid_seed() {
        let result = import_wallet("not a real mnemonic phrase", "");
        assert!(matches!(
            result,
            Err(RecordError::Derivation(HdError::InvalidSeed(_)))
        ));
    }
}
