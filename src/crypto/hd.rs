//! Hierarchical deterministic key derivation (BIP32)
//!
//! Derivation itself is done by the `bip32` crate. This module pins the
//! path grammar the wallet accepts and hands out `secp256k1` keys, so the
//! rest of the crate never sees the `bip32` key types.
//!
//! Extended private keys derive hardened and normal children; extended
//! public keys derive normal children only, which is what lets address
//! issuance run without touching private material.

use bip32::{Prefix, XPrv, XPub};
use secp256k1::{PublicKey, SecretKey};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use zeroize::Zeroizing;

use super::keys::KeyPair;

pub use bip32::ChildNumber;

/// First hardened child index
pub const HARDENED_OFFSET: u32 = ChildNumber::HARDENED_FLAG;

/// Errors raised by key derivation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HdError {
    #[error("Invalid derivation path: {0}")]
    InvalidPath(String),
    #[error("Invalid seed: {0}")]
    InvalidSeed(String),
    #[error("Cannot derive hardened child {0} from a public key")]
    HardenedFromPublic(u32),
    #[error("Derived key out of range at child {0}")]
    KeyOutOfRange(u32),
    #[error("Invalid extended key: {0}")]
    InvalidExtendedKey(String),
}

// =============================================================================
// Derivation Path
// =============================================================================

/// A non-hardened child; index must be below 2^31
pub fn normal_child(index: u32) -> Result<ChildNumber, HdError> {
    ChildNumber::new(index, false)
        .map_err(|_| HdError::InvalidPath(format!("normal index {} out of range", index)))
}

/// A hardened child; index must be below 2^31 before the offset is applied
pub fn hardened_child(index: u32) -> Result<ChildNumber, HdError> {
    ChildNumber::new(index, true)
        .map_err(|_| HdError::InvalidPath(format!("hardened index {} out of range", index)))
}

/// One path component: decimal digits with an optional `'` or `h` suffix
fn parse_child(s: &str) -> Result<ChildNumber, HdError> {
    let (digits, hardened) = match s.strip_suffix('\'').or_else(|| s.strip_suffix('h')) {
        Some(rest) => (rest, true),
        None => (s, false),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(HdError::InvalidPath(format!("bad component '{}'", s)));
    }
    let index: u32 = digits
        .parse()
        .map_err(|_| HdError::InvalidPath(format!("component '{}' overflows", s)))?;
    if hardened {
        hardened_child(index)
    } else {
        normal_child(index)
    }
}

/// An ordered list of child steps, written `m/44'/0'/0'/0/5`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DerivationPath(bip32::DerivationPath);

impl DerivationPath {
    /// The empty path (`m`)
    pub fn master() -> Self {
        Self::default()
    }

    /// Account-level path `m/44'/0'/<account>'`
    pub fn bip44_account(account: u32) -> Result<Self, HdError> {
        Ok(Self::master()
            .child(hardened_child(44)?)
            .child(hardened_child(0)?)
            .child(hardened_child(account)?))
    }

    /// Full signing path `m/44'/0'/<account>'/<is_change>/<address_index>`
    pub fn bip44(account: u32, is_change: bool, address_index: u32) -> Result<Self, HdError> {
        Ok(Self::bip44_account(account)?
            .child(normal_child(u32::from(is_change))?)
            .child(normal_child(address_index)?))
    }

    /// Path relative to an account: `m/<is_change>/<address_index>`
    pub fn account_relative(is_change: bool, address_index: u32) -> Result<Self, HdError> {
        Ok(Self::master()
            .child(normal_child(u32::from(is_change))?)
            .child(normal_child(address_index)?))
    }

    /// Extend the path by one step
    pub fn child(mut self, child: ChildNumber) -> Self {
        self.0.push(child);
        self
    }

    pub fn children(&self) -> impl Iterator<Item = ChildNumber> + '_ {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.children().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for DerivationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m")?;
        for child in self.children() {
            if child.is_hardened() {
                write!(f, "/{}'", child.index())?;
            } else {
                write!(f, "/{}", child.index())?;
            }
        }
        Ok(())
    }
}

impl FromStr for DerivationPath {
    type Err = HdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('/');
        if parts.next() != Some("m") {
            return Err(HdError::InvalidPath(format!("'{}' must start with m", s)));
        }
        parts.try_fold(Self::master(), |path, part| Ok(path.child(parse_child(part)?)))
    }
}

// =============================================================================
// Extended Keys
// =============================================================================

fn to_secp_public(xpub: &XPub) -> Result<PublicKey, HdError> {
    PublicKey::from_slice(&xpub.to_bytes()).map_err(|e| HdError::InvalidExtendedKey(e.to_string()))
}

/// An extended private key: secret scalar plus chain code
#[derive(Clone)]
pub struct ExtendedPrivateKey {
    xprv: XPrv,
}

impl ExtendedPrivateKey {
    /// Derive the master key from a BIP39 (or raw BIP32) seed
    pub fn new_master(seed: &[u8]) -> Result<Self, HdError> {
        if seed.len() < 16 || seed.len() > 64 {
            return Err(HdError::InvalidSeed(format!(
                "seed must be 16..=64 bytes, got {}",
                seed.len()
            )));
        }
        let xprv = XPrv::new(seed).map_err(|e| HdError::InvalidSeed(e.to_string()))?;
        Ok(Self { xprv })
    }

    /// Derive one child key (CKDpriv)
    pub fn derive_child(&self, child: ChildNumber) -> Result<Self, HdError> {
        let xprv = self
            .xprv
            .derive_child(child)
            .map_err(|_| HdError::KeyOutOfRange(child.0))?;
        Ok(Self { xprv })
    }

    /// Derive along a whole path
    pub fn derive_path(&self, path: &DerivationPath) -> Result<Self, HdError> {
        path.children()
            .try_fold(self.clone(), |key, child| key.derive_child(child))
    }

    /// The key pair at this node
    pub fn key_pair(&self) -> Result<KeyPair, HdError> {
        let bytes = Zeroizing::new(self.xprv.to_bytes());
        let secret_key = SecretKey::from_slice(&bytes[..])
            .map_err(|e| HdError::InvalidExtendedKey(e.to_string()))?;
        Ok(KeyPair::from_secret_key(secret_key))
    }

    pub fn public_key(&self) -> Result<PublicKey, HdError> {
        to_secp_public(&self.xprv.public_key())
    }

    /// Neuter to the matching extended public key
    pub fn to_extended_public_key(&self) -> Result<ExtendedPublicKey, HdError> {
        ExtendedPublicKey::from_xpub(self.xprv.public_key())
    }
}

impl fmt::Debug for ExtendedPrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let attrs = self.xprv.attrs();
        f.debug_struct("ExtendedPrivateKey")
            .field("depth", &attrs.depth)
            .field("child_number", &attrs.child_number.0)
            .field("secret_key", &"[redacted]")
            .finish()
    }
}

/// An extended public key; serializes to an `xpub...` string
#[derive(Clone)]
pub struct ExtendedPublicKey {
    xpub: XPub,
    public_key: PublicKey,
}

impl ExtendedPublicKey {
    fn from_xpub(xpub: XPub) -> Result<Self, HdError> {
        let public_key = to_secp_public(&xpub)?;
        Ok(Self { xpub, public_key })
    }

    /// Derive one normal child key (CKDpub)
    pub fn derive_child(&self, child: ChildNumber) -> Result<Self, HdError> {
        if child.is_hardened() {
            return Err(HdError::HardenedFromPublic(child.0));
        }
        let xpub = self
            .xpub
            .derive_child(child)
            .map_err(|_| HdError::KeyOutOfRange(child.0))?;
        Self::from_xpub(xpub)
    }

    /// Derive along a path of normal children
    pub fn derive_path(&self, path: &DerivationPath) -> Result<Self, HdError> {
        path.children()
            .try_fold(self.clone(), |key, child| key.derive_child(child))
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// BIP32 key fingerprint (first 4 bytes of HASH160)
    pub fn fingerprint(&self) -> [u8; 4] {
        self.xpub.fingerprint()
    }
}

impl fmt::Display for ExtendedPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.xpub.to_string(Prefix::XPUB))
    }
}

impl fmt::Debug for ExtendedPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ExtendedPublicKey").field(&self.to_string()).finish()
    }
}

impl PartialEq for ExtendedPublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}

impl Eq for ExtendedPublicKey {}

impl FromStr for ExtendedPublicKey {
    type Err = HdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !s.starts_with("xpub") {
            return Err(HdError::InvalidExtendedKey("not an xpub".to_string()));
        }
        let xpub = XPub::from_str(s).map_err(|e| HdError::InvalidExtendedKey(e.to_string()))?;
        Self::from_xpub(xpub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VECTOR1_SEED: &str = "000102030405060708090a0b0c0d0e0f";
    const VECTOR1_MASTER_XPUB: &str = "xpub661MyMwAqRbcFtXgS5sYJABqqG9YLmC4Q1Rdap9gSE8NqtwybGhePY2gZ29ESFjqJoCu1Rupje8YtGqsefD265TMg7usUDFdp6W1EGMcet8";
    // Chain m/0' of BIP32 test vector 1
    const VECTOR1_M0H_XPUB: &str = "xpub68Gmy5EdvgibQVfPdqkBBCHxA5htiqg55crXYuXoQRKfDBFA1WEjWgP6LHhwBZeNK1VTsfTFUHCdrfp1bgwQ9xv5ski8PX9rL2dZXvgGDnw";

    #[test]
    fn test_parse_path() {
        let path: DerivationPath = "m/44'/0'/0'/0/5".parse().unwrap();
        assert_eq!(path.len(), 5);
        let children: Vec<ChildNumber> = path.children().collect();
        assert!(children[0].is_hardened());
        assert_eq!(children[0].index(), 44);
        assert!(!children[4].is_hardened());
        assert_eq!(children[4].index(), 5);
        assert_eq!(path.to_string(), "m/44'/0'/0'/0/5");
        assert_eq!(path, DerivationPath::bip44(0, false, 5).unwrap());
    }

    #[test]
    fn test_parse_h_suffix() {
        let path: DerivationPath = "m/44h/0h".parse().unwrap();
        assert_eq!(path.to_string(), "m/44'/0'");
        assert_eq!(DerivationPath::master().to_string(), "m");
    }

    #[test]
    fn test_invalid_paths() {
        for bad in ["", "44'/0'", "m/", "m/x", "m/-1", "m/+1", "m/2147483648'", "m/2147483648", "m/1''"] {
            assert!(
                matches!(bad.parse::<DerivationPath>(), Err(HdError::InvalidPath(_))),
                "{} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_master_from_bip32_vector() {
        let seed = hex::decode(VECTOR1_SEED).unwrap();
        let master = ExtendedPrivateKey::new_master(&seed).unwrap();
        assert_eq!(
            master.to_extended_public_key().unwrap().to_string(),
            VECTOR1_MASTER_XPUB
        );
    }

    #[test]
    fn test_hardened_child_from_bip32_vector() {
        let seed = hex::decode(VECTOR1_SEED).unwrap();
        let child = ExtendedPrivateKey::new_master(&seed)
            .unwrap()
            .derive_path(&"m/0'".parse().unwrap())
            .unwrap();
        assert_eq!(child.to_extended_public_key().unwrap().to_string(), VECTOR1_M0H_XPUB);
    }

    #[test]
    fn test_short_seed_rejected() {
        assert!(matches!(
            ExtendedPrivateKey::new_master(&[1u8; 8]),
            Err(HdError::InvalidSeed(_))
        ));
    }

    #[test]
    fn test_public_derivation_matches_private() {
        let seed = hex::decode(VECTOR1_SEED).unwrap();
        let account = ExtendedPrivateKey::new_master(&seed)
            .unwrap()
            .derive_path(&DerivationPath::bip44_account(0).unwrap())
            .unwrap();
        let relative = DerivationPath::account_relative(false, 7).unwrap();

        let via_private = account.derive_path(&relative).unwrap();
        let via_public = account
            .to_extended_public_key()
            .unwrap()
            .derive_path(&relative)
            .unwrap();
        assert_eq!(&via_private.public_key().unwrap(), via_public.public_key());
        assert_eq!(via_private.key_pair().unwrap().public_key, *via_public.public_key());
    }

    #[test]
    fn test_hardened_from_public_rejected() {
        let seed = hex::decode(VECTOR1_SEED).unwrap();
        let xpub = ExtendedPrivateKey::new_master(&seed)
            .unwrap()
            .to_extended_public_key()
            .unwrap();
        assert!(matches!(
            xpub.derive_child(hardened_child(0).unwrap()),
            Err(HdError::HardenedFromPublic(_))
        ));
    }

    #[test]
    fn test_xpub_string_roundtrip() {
        let parsed: ExtendedPublicKey = VECTOR1_MASTER_XPUB.parse().unwrap();
        assert_eq!(parsed.to_string(), VECTOR1_MASTER_XPUB);

        let mut corrupted = VECTOR1_MASTER_XPUB.to_string();
        corrupted.pop();
        corrupted.push('9');
        assert!(corrupted.parse::<ExtendedPublicKey>().is_err());
        assert!("tpubD6NzVbkrYhZ4".parse::<ExtendedPublicKey>().is_err());
    }
}
