//! JSON-RPC 2.0 envelope and positional parameter access

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{WalletError, CODE_INTERNAL};

pub const JSONRPC_VERSION: &str = "2.0";
pub const CODE_PARSE_ERROR: i64 = -32700;
pub const CODE_INVALID_REQUEST: i64 = -32600;

#[derive(Debug, Clone, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub id: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorObject>,
    pub id: Value,
}

impl RpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn failure(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: None,
            error: Some(RpcErrorObject {
                code,
                message: message.into(),
            }),
            id,
        }
    }

    pub fn from_error(id: Value, error: &WalletError) -> Self {
        Self::failure(id, error.code(), error.to_string())
    }

    pub fn timed_out(id: Value) -> Self {
        Self::failure(id, CODE_INTERNAL, "request timed out")
    }
}

/// Positional parameters of a call. Missing trailing entries and `null`
/// read as absent.
pub struct Params<'a> {
    values: &'a [Value],
}

impl<'a> Params<'a> {
    pub fn new(params: &'a Value) -> Result<Self, WalletError> {
        match params {
            Value::Array(values) => Ok(Self { values }),
            Value::Null => Ok(Self { values: &[] }),
            _ => Err(WalletError::InvalidInput("params must be an array".into())),
        }
    }

    fn get(&self, index: usize) -> Option<&'a Value> {
        self.values.get(index).filter(|v| !v.is_null())
    }

    pub fn opt_str(&self, index: usize, name: &str) -> Result<Option<&'a str>, WalletError> {
        match self.get(index) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(_) => Err(WalletError::InvalidInput(format!("{} must be a string", name))),
        }
    }

    pub fn str(&self, index: usize, name: &str) -> Result<&'a str, WalletError> {
        self.opt_str(index, name)?
            .ok_or_else(|| WalletError::InvalidInput(format!("missing {}", name)))
    }

    /// A positive integer amount
    pub fn amount(&self, index: usize) -> Result<u64, WalletError> {
        let value = self
            .get(index)
            .ok_or_else(|| WalletError::InvalidInput("missing amount".into()))?;
        match value.as_u64() {
            Some(amount) if amount > 0 => Ok(amount),
            _ => Err(WalletError::InvalidInput(format!(
                "amount must be a positive integer, got {}",
                value
            ))),
        }
    }

    pub fn opt_value(&self, index: usize) -> Option<&'a Value> {
        self.get(index)
    }

    pub fn value(&self, index: usize, name: &str) -> Result<&'a Value, WalletError> {
        self.get(index)
            .ok_or_else(|| WalletError::InvalidInput(format!("missing {}", name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_defaults() {
        let request: RpcRequest = serde_json::from_value(json!({"method": "getnewaddress"})).unwrap();
        assert_eq!(request.method, "getnewaddress");
        assert!(request.params.is_null());
        assert!(request.id.is_null());
    }

    #[test]
    fn test_params_access() {
        let raw = json!([null, "LBFE3LOJHOH24Y4J54RR6GDM3KVL2PWJ", 1500]);
        let params = Params::new(&raw).unwrap();
        assert_eq!(params.opt_str(0, "wallet").unwrap(), None);
        assert_eq!(params.str(1, "address").unwrap(), "LBFE3LOJHOH24Y4J54RR6GDM3KVL2PWJ");
        assert_eq!(params.amount(2).unwrap(), 1500);
        assert!(params.str(3, "asset").is_err());
    }

    #[test]
    fn test_amount_rejects_non_integers() {
        for raw in [json!([0]), json!([-5]), json!([1.5]), json!(["100"])] {
            let params = Params::new(&raw).unwrap();
            assert!(matches!(params.amount(0), Err(WalletError::InvalidInput(_))), "{}", raw);
        }
    }

    #[test]
    fn test_error_response_shape() {
        let response = RpcResponse::from_error(json!(7), &WalletError::InsufficientFunds("short".into()));
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value, json!({"jsonrpc": "2.0", "error": {"code": -32001, "message": "short"}, "id": 7}));
    }
}
