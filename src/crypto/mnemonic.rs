//! Mnemonic seeds (BIP39)
//!
//! A mnemonic phrase plus passphrase stretches to a 64-byte seed, which is
//! the root of every key this wallet derives. The seed only lives in memory
//! and is wiped when dropped.

use bip39::Mnemonic;
use rand::RngCore;
use zeroize::Zeroizing;

use super::hd::{DerivationPath, ExtendedPrivateKey, HdError};
use super::keys::KeyPair;

/// Entropy size for freshly generated phrases (12 words)
const ENTROPY_BYTES: usize = 16;

/// A mnemonic phrase and the passphrase that salts it
#[derive(Clone)]
pub struct MnemonicSeed {
    mnemonic: Mnemonic,
    passphrase: Zeroizing<String>,
}

impl MnemonicSeed {
    /// Generate a fresh 12-word phrase.
    ///
    /// Retries until the phrase re-parses with a valid checksum, so the
    /// caller never sees a generation failure.
    pub fn generate(passphrase: &str) -> Self {
        let mut rng = rand::thread_rng();
        loop {
            let mut entropy = Zeroizing::new([0u8; ENTROPY_BYTES]);
            rng.fill_bytes(&mut entropy[..]);

            let mnemonic = match Mnemonic::from_entropy(&entropy[..]) {
                Ok(m) => m,
                Err(e) => {
                    log::debug!("Discarding mnemonic candidate: {}", e);
                    continue;
                }
            };
            let phrase = Zeroizing::new(mnemonic.to_string());
            if Mnemonic::parse_normalized(phrase.as_str()).is_ok() {
                return Self {
                    mnemonic,
                    passphrase: Zeroizing::new(passphrase.to_string()),
                };
            }
        }
    }

    /// Import a caller-supplied phrase, validating its checksum
    pub fn import(phrase: &str, passphrase: &str) -> Result<Self, HdError> {
        let mnemonic = Mnemonic::parse_normalized(phrase.trim())
            .map_err(|e| HdError::InvalidSeed(e.to_string()))?;
        Ok(Self {
            mnemonic,
            passphrase: Zeroizing::new(passphrase.to_string()),
        })
    }

    /// The space-separated phrase
    pub fn phrase(&self) -> String {
        self.mnemonic.to_string()
    }

    pub fn passphrase(&self) -> &str {
        self.passphrase.as_str()
    }

    pub fn word_count(&self) -> usize {
        self.mnemonic.word_count()
    }

    /// Stretch phrase and passphrase into the 64-byte seed
    pub fn to_seed(&self) -> Zeroizing<[u8; 64]> {
        Zeroizing::new(self.mnemonic.to_seed(self.passphrase.as_str()))
    }

    /// Master extended private key of this seed
    pub fn master_key(&self) -> Result<ExtendedPrivateKey, HdError> {
        ExtendedPrivateKey::new_master(&self.to_seed()[..])
    }

    /// Derive the key pair at `path`
    pub fn derive_key_pair(&self, path: &DerivationPath) -> Result<KeyPair, HdError> {
        derive_key_pair(&self.to_seed()[..], path)
    }
}

impl std::fmt::Debug for MnemonicSeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MnemonicSeed")
            .field("words", &self.word_count())
            .field("phrase", &"[redacted]")
            .finish()
    }
}

/// Derive the key pair at `path` from a raw seed.
///
/// Pure function: identical seed and path always yield the same key pair.
pub fn derive_key_pair(seed: &[u8], path: &DerivationPath) -> Result<KeyPair, HdError> {
    let master = ExtendedPrivateKey::new_master(seed)?;
    master.derive_path(path)?.key_pair()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ABANDON_PHRASE: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    #[test]
    fn test_known_seed() {
        let seed = MnemonicSeed::import(ABANDON_PHRASE, "").unwrap();
        assert_eq!(
            hex::encode(&seed.to_seed()[..]),
            "5eb00bbddcf069084889a8ab9155568165f5c453ccb85e70811aaed6f6da5fc19a5ac40b389cd370d086206dec8aa6c43daea6690f20ad3d8d48b2d2ce9e38e4"
        );
    }

    #[test]
    fn test_known_bip44_key() {
        let seed = MnemonicSeed::import(ABANDON_PHRASE, "").unwrap();
        let path: DerivationPath = "m/44'/0'/0'/0/0".parse().unwrap();
        let kp = seed.derive_key_pair(&path).unwrap();
        assert_eq!(
            hex::encode(kp.public_key.serialize()),
            "03aaeb52dd7494c361049de67cc680e83ebcbbbdbeb13637d92cd845f70308af5e"
        );
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let seed = MnemonicSeed::import(ABANDON_PHRASE, "").unwrap();
        let path = DerivationPath::bip44(0, true, 3).unwrap();
        let first = seed.derive_key_pair(&path).unwrap();
        let second = seed.derive_key_pair(&path).unwrap();
        assert_eq!(first.public_key, second.public_key);
        assert_eq!(first.secret_key.secret_bytes(), second.secret_key.secret_bytes());
    }

    #[test]
    fn test_passphrase_changes_keys() {
        let plain = MnemonicSeed::import(ABANDON_PHRASE, "").unwrap();
        let salted = MnemonicSeed::import(ABANDON_PHRASE, "TREZOR").unwrap();
        let path = DerivationPath::bip44(0, false, 0).unwrap();
        assert_ne!(
            plain.derive_key_pair(&path).unwrap().public_key,
            salted.derive_key_pair(&path).unwrap().public_key
        );
    }

    #[test]
    fn test_bad_checksum_rejected() {
        let bad = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon";
        assert!(matches!(
            MnemonicSeed::import(bad, ""),
            Err(HdError::InvalidSeed(_))
        ));
    }

    #[test]
    fn test_generated_phrase_reimports() {
        let generated = MnemonicSeed::generate("");
        assert_eq!(generated.word_count(), 12);
        let reimported = MnemonicSeed::import(&generated.phrase(), "").unwrap();
        assert_eq!(generated.to_seed()[..], reimported.to_seed()[..]);
    }

    #[test]
    fn test_debug_redacts_phrase() {
        let seed = MnemonicSeed::import(ABANDON_PHRASE, "").unwrap();
        assert!(!format!("{:?}", seed).contains("abandon"));
    }
}
