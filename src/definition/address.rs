//! Checksummed 32-character addresses

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use super::object_hash::chash160_of;
use super::{DefinitionError, SpendingDefinition};
use crate::crypto::is_chash_valid;

/// An address: the content hash of a spending definition
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Address {
    type Err = DefinitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if is_valid_address(s) {
            Ok(Address(s.to_string()))
        } else {
            Err(DefinitionError::InvalidAddress(s.to_string()))
        }
    }
}

impl TryFrom<String> for Address {
    type Error = DefinitionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.0
    }
}

impl AsRef<str> for Address {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// True if `candidate` is an uppercase content hash with a valid checksum
pub fn is_valid_address(candidate: &str) -> bool {
    candidate.chars().all(|c| !c.is_ascii_lowercase()) && is_chash_valid(candidate)
}

/// Validate the definition, then hash its canonical form
pub fn derive_address(definition: &SpendingDefinition) -> Result<Address, DefinitionError> {
    definition.validate()?;
    Ok(Address(chash160_of(&definition.to_json())?))
}

/// Device address for a base64 device public key
pub fn device_address(device_pubkey: &str) -> Result<String, DefinitionError> {
    Ok(format!(
        "0{}",
        chash160_of(&Value::String(device_pubkey.to_string()))?
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{public_key_from_base64, sha256, KeyPair};

    const ABANDON_PUBKEY: &str = "A6rrUt10lMNhBJ3mfMaA6D68u72+sTY32SzYRfcDCK9e";

    #[test]
    fn test_known_address() {
        let key = public_key_from_base64(ABANDON_PUBKEY).unwrap();
        let def = SpendingDefinition::single_sig(&key);
        assert_eq!(
            derive_address(&def).unwrap().as_str(),
            "QZAB2MYRLRVUNITTOOCF5ZE3AG4TCJDD"
        );
    }

    #[test]
    fn test_address_is_stable() {
        let kp = KeyPair::from_secret_bytes(&sha256(b"stable")).unwrap();
        let def = SpendingDefinition::single_sig(&kp.public_key);
        let first = def.address().unwrap();
        let second = def.clone().address().unwrap();
        assert_eq!(first, second);
        assert!(is_valid_address(first.as_str()));
    }

    #[test]
    fn test_parse_address() {
        assert!("QZAB2MYRLRVUNITTOOCF5ZE3AG4TCJDD".parse::<Address>().is_ok());
        assert!("qzab2myrlrvunittoocf5ze3ag4tcjdd".parse::<Address>().is_err());
        assert!("QZAB2MYRLRVUNITTOOCF5ZE3AG4TCJDE".parse::<Address>().is_err());
        assert!("QZAB2MYR".parse::<Address>().is_err());
    }

    #[test]
    fn test_serde_rejects_invalid() {
        let ok: Address = serde_json::from_str("\"QZAB2MYRLRVUNITTOOCF5ZE3AG4TCJDD\"").unwrap();
        assert_eq!(serde_json::to_string(&ok).unwrap(), "\"QZAB2MYRLRVUNITTOOCF5ZE3AG4TCJDD\"");
        assert!(serde_json::from_str::<Address>("\"NOT-AN-ADDRESS\"").is_err());
    }

    #[test]
    fn test_device_address_shape() {
        let addr = device_address(ABANDON_PUBKEY).unwrap();
        assert_eq!(addr.len(), 33);
        assert!(addr.starts_with('0'));
        assert!(is_chash_valid(&addr[1..]));
    }
}
