//! Signer backed by the wallet's own HD seed

use std::collections::{BTreeMap, HashMap};
use zeroize::Zeroizing;

use super::{Signer, SignerError};
use crate::crypto::{derive_key_pair, DerivationPath, MnemonicSeed};
use crate::definition::{Address, SpendingDefinition};
use crate::wallet::{IssuedAddress, WalletState};

/// Signs for issued addresses of one wallet account.
///
/// Holds the stretched seed; the private key for an address is derived per
/// `sign` call and wiped when the call returns.
pub struct LocalSigner {
    seed: Zeroizing<[u8; 64]>,
    account: u32,
    addresses: HashMap<Address, IssuedAddress>,
}

impl LocalSigner {
    /// Stretches the mnemonic; async callers should use [`LocalSigner::from_stretched`]
    pub fn new(seed: &MnemonicSeed, account: u32, addresses: impl IntoIterator<Item = IssuedAddress>) -> Self {
        Self::from_stretched(seed.to_seed(), account, addresses)
    }

    /// Signer over an already stretched 64-byte seed
    pub fn from_stretched(
        seed: Zeroizing<[u8; 64]>,
        account: u32,
        addresses: impl IntoIterator<Item = IssuedAddress>,
    ) -> Self {
        Self {
            seed,
            account,
            addresses: addresses
                .into_iter()
                .map(|issued| (issued.address.clone(), issued))
                .collect(),
        }
    }

    /// Signer for every address recorded in a wallet's state
    pub fn for_wallet(seed: &MnemonicSeed, state: &WalletState) -> Self {
        Self::new(seed, state.account, state.addresses.iter().cloned())
    }

    pub fn add_address(&mut self, issued: IssuedAddress) {
        self.addresses.insert(issued.address.clone(), issued);
    }

    pub fn knows(&self, address: &Address) -> bool {
        self.addresses.contains_key(address)
    }

    fn issued(&self, address: &Address) -> Result<&IssuedAddress, SignerError> {
        self.addresses
            .get(address)
            .ok_or_else(|| SignerError::DefinitionNotFound(address.to_string()))
    }
}

impl Signer for LocalSigner {
    fn signing_path_lengths(&self, address: &Address) -> Result<BTreeMap<String, usize>, SignerError> {
        Ok(self.issued(address)?.definition.signing_path_lengths())
    }

    fn definition(&self, address: &Address) -> Result<SpendingDefinition, SignerError> {
        Ok(self.issued(address)?.definition.clone())
    }

    fn sign(&self, digest: &[u8; 32], address: &Address, signing_path: &str) -> Result<String, SignerError> {
        let issued = self.issued(address)?;
        let expected = issued
            .definition
            .signing_keys()
            .remove(signing_path)
            .ok_or_else(|| SignerError::UnknownSigningPath {
                address: address.to_string(),
                path: signing_path.to_string(),
            })?;

        let path = DerivationPath::bip44(self.account, issued.is_change, issued.address_index)?;
        let key_pair = derive_key_pair(&self.seed[..], &path)?;
        if key_pair.public_key_base64() != expected {
            return Err(SignerError::Refused(format!(
                "key at {} does not match {} path {}",
                path, address, signing_path
            )));
        }
        Ok(key_pair.sign(digest)?)
    }
}

impl std::fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSigner")
            .field("account", &self.account)
            .field("addresses", &self.addresses.len())
            .finish_non_exhaustive()
    }
}
