//! Canonical serialization of JSON values
//!
//! The "source string" is the single byte sequence every hash in this crate
//! is computed over. Object keys are visited in sorted order, so two
//! documents that differ only in key order or whitespace hash identically.

use serde_json::Value;
use thiserror::Error;

use crate::crypto::{chash160, sha256};

const SEPARATOR: &str = "\x00";

/// Values the canonical form refuses to encode
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ObjectHashError {
    #[error("null value in canonical form")]
    NullValue,
    #[error("empty array in canonical form")]
    EmptyArray,
    #[error("empty object in canonical form")]
    EmptyObject,
    #[error("non-integer number {0} in canonical form")]
    NonInteger(String),
}

fn extract_components(value: &Value, components: &mut Vec<String>) -> Result<(), ObjectHashError> {
    match value {
        Value::Null => return Err(ObjectHashError::NullValue),
        Value::String(s) => {
            components.push("s".to_string());
            components.push(s.clone());
        }
        Value::Number(n) => {
            let text = n
                .as_u64()
                .map(|v| v.to_string())
                .or_else(|| n.as_i64().map(|v| v.to_string()))
                .ok_or_else(|| ObjectHashError::NonInteger(n.to_string()))?;
            components.push("n".to_string());
            components.push(text);
        }
        Value::Bool(b) => {
            components.push("b".to_string());
            components.push(b.to_string());
        }
        Value::Array(items) => {
            if items.is_empty() {
                return Err(ObjectHashError::EmptyArray);
            }
            components.push("[".to_string());
            for item in items {
                extract_components(item, components)?;
            }
            components.push("]".to_string());
        }
        Value::Object(map) => {
            if map.is_empty() {
                return Err(ObjectHashError::EmptyObject);
            }
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for key in keys {
                components.push(key.clone());
                extract_components(&map[key], components)?;
            }
        }
    }
    Ok(())
}

/// Canonical source string of a JSON value
pub fn source_string(value: &Value) -> Result<String, ObjectHashError> {
    let mut components = Vec::new();
    extract_components(value, &mut components)?;
    Ok(components.join(SEPARATOR))
}

/// 160-bit checksummed content hash of a value
pub fn chash160_of(value: &Value) -> Result<String, ObjectHashError> {
    Ok(chash160(&source_string(value)?))
}

/// SHA-256 of a value's source string
pub fn sha256_of(value: &Value) -> Result<[u8; 32], ObjectHashError> {
    Ok(sha256(source_string(value)?.as_bytes()))
}
