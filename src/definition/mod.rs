//! Spending definitions and the addresses derived from them
//!
//! A definition is a policy tree whose leaves are "signature verifies under
//! this public key". Its JSON form is the wire format:
//!
//! ```text
//! ["sig", {"pubkey": "<base64 compressed point>"}]
//! ["and", [<definition>, ...]]
//! ["or", [<definition>, ...]]
//! ["r of set", {"required": 2, "set": [<definition>, ...]}]
//! ```
//!
//! The address of a definition is the checksummed content hash of its
//! canonical source string.

pub mod address;
pub mod object_hash;

pub use address::{device_address, is_valid_address, Address};
pub use object_hash::{chash160_of, sha256_of, source_string, ObjectHashError};

use secp256k1::PublicKey;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::crypto::{
    is_valid_base64, public_key_from_base64, public_key_to_base64, verify_signature,
    PUBKEY_LENGTH, SIG_LENGTH,
};

/// Signing path of the definition root
pub const ROOT_SIGNING_PATH: &str = "r";

/// Errors from parsing or hashing definitions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DefinitionError {
    #[error("Malformed definition: {0}")]
    MalformedDefinition(String),
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
    #[error("Canonical form error: {0}")]
    Hash(#[from] ObjectHashError),
}

fn malformed(reason: impl Into<String>) -> DefinitionError {
    DefinitionError::MalformedDefinition(reason.into())
}

/// A spending policy tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpendingDefinition {
    /// A signature by `pubkey` (base64 compressed point)
    Sig { pubkey: String },
    /// Every branch must hold
    And(Vec<SpendingDefinition>),
    /// At least one branch must hold
    Or(Vec<SpendingDefinition>),
    /// At least `required` branches of `set` must hold
    RequiredOf {
        required: usize,
        set: Vec<SpendingDefinition>,
    },
}

impl SpendingDefinition {
    /// Single-signature definition for a public key
    pub fn single_sig(public_key: &PublicKey) -> Self {
        SpendingDefinition::Sig {
            pubkey: public_key_to_base64(public_key),
        }
    }

    /// JSON wire form
    pub fn to_json(&self) -> Value {
        match self {
            SpendingDefinition::Sig { pubkey } => json!(["sig", { "pubkey": pubkey }]),
            SpendingDefinition::And(branches) => json!([
                "and",
                branches.iter().map(Self::to_json).collect::<Vec<_>>()
            ]),
            SpendingDefinition::Or(branches) => json!([
                "or",
                branches.iter().map(Self::to_json).collect::<Vec<_>>()
            ]),
            SpendingDefinition::RequiredOf { required, set } => json!([
                "r of set",
                {
                    "required": required,
                    "set": set.iter().map(Self::to_json).collect::<Vec<_>>()
                }
            ]),
        }
    }

    /// Parse and validate the JSON wire form
    pub fn from_json(value: &Value) -> Result<Self, DefinitionError> {
        let parts = value
            .as_array()
            .filter(|parts| parts.len() == 2)
            .ok_or_else(|| malformed("definition must be a 2-element array"))?;
        let op = parts[0]
            .as_str()
            .ok_or_else(|| malformed("operator must be a string"))?;
        let args = &parts[1];

        let definition = match op {
            "sig" => {
                let object = args
                    .as_object()
                    .filter(|o| o.len() == 1)
                    .ok_or_else(|| malformed("sig expects {\"pubkey\": ...}"))?;
                let pubkey = object
                    .get("pubkey")
                    .and_then(Value::as_str)
                    .ok_or_else(|| malformed("sig expects a string pubkey"))?;
                SpendingDefinition::Sig {
                    pubkey: pubkey.to_string(),
                }
            }
            "and" | "or" => {
                let branches = Self::parse_branches(args)?;
                if op == "and" {
                    SpendingDefinition::And(branches)
                } else {
                    SpendingDefinition::Or(branches)
                }
            }
            "r of set" => {
                let object = args
                    .as_object()
                    .filter(|o| o.len() == 2)
                    .ok_or_else(|| malformed("r of set expects {required, set}"))?;
                let required = object
                    .get("required")
                    .and_then(Value::as_u64)
                    .ok_or_else(|| malformed("required must be a positive integer"))?;
                let set = Self::parse_branches(
                    object
                        .get("set")
                        .ok_or_else(|| malformed("r of set expects a set"))?,
                )?;
                SpendingDefinition::RequiredOf {
                    required: usize::try_from(required)
                        .map_err(|_| malformed("required out of range"))?,
                    set,
                }
            }
            other => return Err(malformed(format!("unknown operator '{}'", other))),
        };
        definition.validate()?;
        Ok(definition)
    }

    fn parse_branches(value: &Value) -> Result<Vec<SpendingDefinition>, DefinitionError> {
        value
            .as_array()
            .ok_or_else(|| malformed("branches must be an array"))?
            .iter()
            .map(Self::from_json)
            .collect()
    }

    /// Check structural rules and leaf key encodings
    pub fn validate(&self) -> Result<(), DefinitionError> {
        match self {
            SpendingDefinition::Sig { pubkey } => {
                if !is_valid_base64(pubkey, PUBKEY_LENGTH) {
                    return Err(malformed(format!("pubkey '{}' has wrong length or encoding", pubkey)));
                }
                public_key_from_base64(pubkey)
                    .map_err(|_| malformed(format!("pubkey '{}' is not a curve point", pubkey)))?;
                Ok(())
            }
            SpendingDefinition::And(branches) | SpendingDefinition::Or(branches) => {
                if branches.len() < 2 {
                    return Err(malformed("and/or need at least 2 branches"));
                }
                branches.iter().try_for_each(Self::validate)
            }
            SpendingDefinition::RequiredOf { required, set } => {
                if set.len() < 2 {
                    return Err(malformed("r of set needs at least 2 members"));
                }
                if *required == 0 || *required > set.len() {
                    return Err(malformed(format!(
                        "required {} out of range for set of {}",
                        required,
                        set.len()
                    )));
                }
                set.iter().try_for_each(Self::validate)
            }
        }
    }

    /// Derive the address of this definition
    pub fn address(&self) -> Result<Address, DefinitionError> {
        address::derive_address(self)
    }

    /// Signing path of every signature leaf, mapped to its public key
    pub fn signing_keys(&self) -> BTreeMap<String, String> {
        let mut keys = BTreeMap::new();
        self.collect_signing_keys(ROOT_SIGNING_PATH, &mut keys);
        keys
    }

    fn collect_signing_keys(&self, path: &str, keys: &mut BTreeMap<String, String>) {
        match self {
            SpendingDefinition::Sig { pubkey } => {
                keys.insert(path.to_string(), pubkey.clone());
            }
            SpendingDefinition::And(branches)
            | SpendingDefinition::Or(branches)
            | SpendingDefinition::RequiredOf { set: branches, .. } => {
                for (i, branch) in branches.iter().enumerate() {
                    branch.collect_signing_keys(&format!("{}.{}", path, i), keys);
                }
            }
        }
    }

    /// Expected signature length at each signing path
    pub fn signing_path_lengths(&self) -> BTreeMap<String, usize> {
        self.signing_keys()
            .into_keys()
            .map(|path| (path, SIG_LENGTH))
            .collect()
    }

    /// Evaluate the policy against authentifiers over `digest`
    pub fn is_satisfied(&self, authentifiers: &BTreeMap<String, String>, digest: &[u8; 32]) -> bool {
        self.evaluate(ROOT_SIGNING_PATH, authentifiers, digest)
    }

    fn evaluate(&self, path: &str, authentifiers: &BTreeMap<String, String>, digest: &[u8; 32]) -> bool {
        let branch_results = |branches: &[SpendingDefinition]| -> Vec<bool> {
            branches
                .iter()
                .enumerate()
                .map(|(i, b)| b.evaluate(&format!("{}.{}", path, i), authentifiers, digest))
                .collect()
        };
        match self {
            SpendingDefinition::Sig { pubkey } => {
                let Some(signature) = authentifiers.get(path) else {
                    return false;
                };
                match public_key_from_base64(pubkey) {
                    Ok(key) => verify_signature(&key, digest, signature).unwrap_or(false),
                    Err(_) => false,
                }
            }
            SpendingDefinition::And(branches) => branch_results(branches).into_iter().all(|ok| ok),
            SpendingDefinition::Or(branches) => branch_results(branches).into_iter().any(|ok| ok),
            SpendingDefinition::RequiredOf { required, set } => {
                branch_results(set).into_iter().filter(|ok| *ok).count() >= *required
            }
        }
    }
}

impl Serialize for SpendingDefinition {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SpendingDefinition {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_json(&value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{sha256, KeyPair};

    fn key(seed: &[u8]) -> KeyPair {
        KeyPair::from_secret_bytes(&sha256(seed)).unwrap()
    }

    #[test]
    fn test_single_sig_json() {
        let kp = key(b"alice");
        let def = SpendingDefinition::single_sig(&kp.public_key);
        let json = def.to_json();
        assert_eq!(json[0], "sig");
        assert_eq!(json[1]["pubkey"], kp.public_key_base64());
        assert_eq!(SpendingDefinition::from_json(&json).unwrap(), def);
    }

    #[test]
    fn test_semantically_equal_json_same_address() {
        let a = key(b"a").public_key_base64();
        let b = key(b"b").public_key_base64();
        let first = format!(
            r#"["r of set", {{"required": 1, "set": [["sig", {{"pubkey": "{a}"}}], ["sig", {{"pubkey": "{b}"}}]]}}]"#
        );
        let second = format!(
            r#"["r of set",{{"set":[["sig",{{"pubkey":"{a}"}}],["sig",{{"pubkey":"{b}"}}]],"required":1}}]"#
        );
        let d1: SpendingDefinition = serde_json::from_str(&first).unwrap();
        let d2: SpendingDefinition = serde_json::from_str(&second).unwrap();
        assert_eq!(d1.address().unwrap(), d2.address().unwrap());
    }

    #[test]
    fn test_wrong_length_pubkey_is_malformed() {
        let json = serde_json::json!(["sig", {"pubkey": "AAAA"}]);
        assert!(matches!(
            SpendingDefinition::from_json(&json),
            Err(DefinitionError::MalformedDefinition(_))
        ));
        let def = SpendingDefinition::Sig {
            pubkey: "A".repeat(44),
        };
        assert!(matches!(def.address(), Err(DefinitionError::MalformedDefinition(_))));
    }

    #[test]
    fn test_unknown_operator_rejected() {
        let json = serde_json::json!(["xor", []]);
        assert!(SpendingDefinition::from_json(&json).is_err());
    }

    #[test]
    fn test_signing_paths() {
        let (a, b, c) = (key(b"a"), key(b"b"), key(b"c"));
        let def = SpendingDefinition::And(vec![
            SpendingDefinition::single_sig(&a.public_key),
            SpendingDefinition::RequiredOf {
                required: 1,
                set: vec![
                    SpendingDefinition::single_sig(&b.public_key),
                    SpendingDefinition::single_sig(&c.public_key),
                ],
            },
        ]);
        let keys = def.signing_keys();
        assert_eq!(
            keys.keys().cloned().collect::<Vec<_>>(),
            vec!["r.0", "r.1.0", "r.1.1"]
        );
        assert_eq!(keys["r.1.1"], c.public_key_base64());

        let single = SpendingDefinition::single_sig(&a.public_key);
        assert_eq!(
            single.signing_path_lengths(),
            BTreeMap::from([(ROOT_SIGNING_PATH.to_string(), SIG_LENGTH)])
        );
    }

    #[test]
    fn test_evaluation() {
        let (a, b) = (key(b"a"), key(b"b"));
        let digest = sha256(b"unit");
        let def = SpendingDefinition::Or(vec![
            SpendingDefinition::single_sig(&a.public_key),
            SpendingDefinition::single_sig(&b.public_key),
        ]);

        let mut auth = BTreeMap::new();
        assert!(!def.is_satisfied(&auth, &digest));

        auth.insert("r.1".to_string(), b.sign(&digest).unwrap());
        assert!(def.is_satisfied(&auth, &digest));

        // a signature under the wrong key at r.0 does not count
        let and = SpendingDefinition::And(vec![
            SpendingDefinition::single_sig(&a.public_key),
            SpendingDefinition::single_sig(&b.public_key),
        ]);
        auth.insert("r.0".to_string(), b.sign(&digest).unwrap());
        assert!(!and.is_satisfied(&auth, &digest));
    }
}
