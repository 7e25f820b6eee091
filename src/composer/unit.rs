//! Units and joints
//!
//! A unit is the signed payload submitted to the network; a joint wraps it
//! for transport. Hashes are taken over the canonical source string of the
//! unit's JSON form, so field order in these structs is irrelevant.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

use super::request::{AssetSpec, Output};
use crate::crypto::encode_base64;
use crate::definition::{sha256_of, source_string, Address, ObjectHashError, SpendingDefinition};
use crate::funds::OutputRef;

/// Protocol version written into every unit
pub const UNIT_VERSION: &str = "1.0";

/// Network alternative (mainnet)
pub const ALT: &str = "1";

/// Filler character for signatures not produced yet
pub const PLACEHOLDER_CHAR: char = '-';

#[derive(Error, Debug)]
pub enum UnitError {
    #[error("Canonical form error: {0}")]
    Hash(#[from] ObjectHashError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageApp {
    Payment,
    Asset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadLocation {
    Inline,
    None,
}

/// Payment payload; `asset` is absent for base currency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset: Option<String>,
    pub inputs: Vec<OutputRef>,
    pub outputs: Vec<Output>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    Payment(PaymentPayload),
    Asset(AssetSpec),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub app: MessageApp,
    pub payload_location: PayloadLocation,
    pub payload_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Payload>,
}

impl Message {
    fn payload_hash(payload: &Payload) -> Result<String, UnitError> {
        Ok(encode_base64(&sha256_of(&serde_json::to_value(payload)?)?))
    }

    /// Message carrying its payload
    pub fn inline(app: MessageApp, payload: Payload) -> Result<Self, UnitError> {
        Ok(Self {
            app,
            payload_location: PayloadLocation::Inline,
            payload_hash: Self::payload_hash(&payload)?,
            payload: Some(payload),
        })
    }

    /// Message that commits to a payload delivered out of band
    pub fn private(app: MessageApp, payload: &Payload) -> Result<Self, UnitError> {
        Ok(Self {
            app,
            payload_location: PayloadLocation::None,
            payload_hash: Self::payload_hash(payload)?,
            payload: None,
        })
    }

    /// True if the inline payload still matches its hash
    pub fn payload_matches(&self) -> Result<bool, UnitError> {
        match &self.payload {
            Some(payload) => Ok(Self::payload_hash(payload)? == self.payload_hash),
            None => Ok(self.payload_location == PayloadLocation::None),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub address: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<SpendingDefinition>,
    pub authentifiers: BTreeMap<String, String>,
}

impl Author {
    /// Author with placeholder signatures of the declared lengths
    pub fn with_placeholders(
        address: Address,
        definition: Option<SpendingDefinition>,
        lengths: &BTreeMap<String, usize>,
    ) -> Self {
        Self {
            address,
            definition,
            authentifiers: lengths
                .iter()
                .map(|(path, len)| (path.clone(), PLACEHOLDER_CHAR.to_string().repeat(*len)))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    pub version: String,
    pub alt: String,
    pub messages: Vec<Message>,
    pub authors: Vec<Author>,
    pub timestamp: u64,
    pub headers_commission: u64,
    pub payload_commission: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl Unit {
    pub fn new(authors: Vec<Author>, messages: Vec<Message>) -> Self {
        Self {
            version: UNIT_VERSION.to_string(),
            alt: ALT.to_string(),
            messages,
            authors,
            timestamp: u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default(),
            headers_commission: 0,
            payload_commission: 0,
            unit: None,
        }
    }

    fn without_id(&self) -> Result<Value, UnitError> {
        let mut value = serde_json::to_value(self)?;
        if let Some(object) = value.as_object_mut() {
            object.remove("unit");
        }
        Ok(value)
    }

    /// Digest every author signs: the unit without authentifiers and id
    pub fn hash_to_sign(&self) -> Result<[u8; 32], UnitError> {
        let mut value = self.without_id()?;
        if let Some(authors) = value.get_mut("authors").and_then(Value::as_array_mut) {
            for author in authors {
                if let Some(author) = author.as_object_mut() {
                    author.remove("authentifiers");
                }
            }
        }
        Ok(sha256_of(&value)?)
    }

    /// Unit id: base64 SHA-256 of the signed unit
    pub fn compute_id(&self) -> Result<String, UnitError> {
        Ok(encode_base64(&sha256_of(&self.without_id()?)?))
    }

    /// Canonical size of everything but the messages
    pub fn headers_size(&self) -> Result<usize, UnitError> {
        let mut value = self.without_id()?;
        if let Some(object) = value.as_object_mut() {
            object.remove("messages");
        }
        Ok(source_string(&value)?.len())
    }

    /// Canonical size of the messages
    pub fn payload_size(&self) -> Result<usize, UnitError> {
        Ok(source_string(&serde_json::to_value(&self.messages)?)?.len())
    }
}

/// A unit ready for broadcast
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Joint {
    pub unit: Unit,
}

/// Out-of-band payload of a private asset transfer, for one recipient
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateElement {
    pub unit: String,
    pub message_index: u32,
    pub output_index: u32,
    pub payload: PaymentPayload,
}

/// Chain of private transfer records delivered to a recipient
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateChain {
    pub to: Address,
    pub elements: Vec<PrivateElement>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{sha256, KeyPair};

    fn sample_unit() -> Unit {
        let kp = KeyPair::from_secret_bytes(&sha256(b"author")).unwrap();
        let definition = SpendingDefinition::single_sig(&kp.public_key);
        let address = definition.address().unwrap();
        let payload = Payload::Payment(PaymentPayload {
            asset: None,
            inputs: vec![OutputRef {
                unit: "uU0nuZNNPgilLlLX2n2r+sSE7+N6U4DukIj3rOLvzek=".to_string(),
                message_index: 0,
                output_index: 1,
            }],
            outputs: vec![Output {
                address: address.clone(),
                amount: 10,
            }],
        });
        let author = Author::with_placeholders(
            address,
            Some(definition.clone()),
            &definition.signing_path_lengths(),
        );
        Unit::new(vec![author], vec![Message::inline(MessageApp::Payment, payload).unwrap()])
    }

    #[test]
    fn test_placeholders_have_declared_length() {
        let unit = sample_unit();
        assert_eq!(unit.authors[0].authentifiers["r"], "-".repeat(88));
    }

    #[test]
    fn test_hash_to_sign_ignores_authentifiers_and_id() {
        let unit = sample_unit();
        let digest = unit.hash_to_sign().unwrap();

        let mut signed = unit.clone();
        signed
            .authors[0]
            .authentifiers
            .insert("r".to_string(), "x".repeat(88));
        signed.unit = Some("id".to_string());
        assert_eq!(signed.hash_to_sign().unwrap(), digest);

        signed.headers_commission = 1;
        assert_ne!(signed.hash_to_sign().unwrap(), digest);
    }

    #[test]
    fn test_unit_id_covers_authentifiers() {
        let unit = sample_unit();
        let mut signed = unit.clone();
        signed
            .authors[0]
            .authentifiers
            .insert("r".to_string(), "x".repeat(88));
        assert_ne!(unit.compute_id().unwrap(), signed.compute_id().unwrap());
        assert_eq!(unit.compute_id().unwrap().len(), 44);
    }

    #[test]
    fn test_private_message_hides_payload() {
        let payload = Payload::Asset(AssetSpec::default());
        let inline = Message::inline(MessageApp::Asset, payload.clone()).unwrap();
        let private = Message::private(MessageApp::Asset, &payload).unwrap();
        assert_eq!(inline.payload_hash, private.payload_hash);
        assert!(private.payload.is_none());
        assert!(inline.payload_matches().unwrap());
        let json = serde_json::to_value(&private).unwrap();
        assert_eq!(json["payload_location"], "none");
        assert!(json.get("payload").is_none());
    }

    #[test]
    fn test_joint_json_roundtrip() {
        let joint = Joint { unit: sample_unit() };
        let text = serde_json::to_string(&joint).unwrap();
        let back: Joint = serde_json::from_str(&text).unwrap();
        assert_eq!(back, joint);
    }
}
