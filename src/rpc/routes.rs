//! RPC server routes

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};

use super::handlers::{dispatch, RpcState};
use super::protocol::{RpcRequest, RpcResponse, CODE_INVALID_REQUEST, CODE_PARSE_ERROR};

/// Create the RPC router
pub fn create_router(state: RpcState) -> Router {
    // Configure CORS for browser access
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", post(handle_rpc))
        .route("/health", get(health_check))
        .layer(cors)
        .with_state(state)
}

/// GET /health
async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

/// POST / - one JSON-RPC 2.0 call
async fn handle_rpc(State(state): State<RpcState>, body: String) -> Json<RpcResponse> {
    Json(handle_body(&state, &body).await)
}

async fn handle_body(state: &RpcState, body: &str) -> RpcResponse {
    let value: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(e) => return RpcResponse::failure(Value::Null, CODE_PARSE_ERROR, format!("parse error: {}", e)),
    };
    let id = value.get("id").cloned().unwrap_or(Value::Null);
    match serde_json::from_value::<RpcRequest>(value) {
        Ok(request) => dispatch(state, request).await,
        Err(e) => RpcResponse::failure(id, CODE_INVALID_REQUEST, format!("invalid request: {}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composer::{Composer, FeeRate, SizeFeePolicy};
    use crate::config::WalletConfig;
    use crate::funds::{MemoryBalanceIndex, SpendUnconfirmed};
    use crate::locks::KeyedLocks;
    use crate::network::RecordingNetwork;
    use crate::wallet::{IssuanceGuard, MemoryWalletStore, WalletSession};
    use std::sync::Arc;

    fn state() -> RpcState {
        let locks = Arc::new(KeyedLocks::new());
        RpcState {
            session: Arc::new(WalletSession::new(IssuanceGuard::new(
                Arc::new(MemoryWalletStore::new()),
                locks.clone(),
            ))),
            composer: Arc::new(Composer::new(
                Arc::new(MemoryBalanceIndex::new()),
                Arc::new(SizeFeePolicy::new(FeeRate::per_byte(1))),
                locks,
                SpendUnconfirmed::Own,
            )),
            network: Arc::new(RecordingNetwork::new()),
            config: Arc::new(WalletConfig::default()),
        }
    }

    #[tokio::test]
    async fn test_parse_error() {
        let response = handle_body(&state(), "{not json").await;
        assert_eq!(response.error.unwrap().code, CODE_PARSE_ERROR);
    }

    #[tokio::test]
    async fn test_invalid_request_keeps_id() {
        let response = handle_body(&state(), r#"{"id": 9, "params": []}"#).await;
        assert_eq!(response.id, json!(9));
        assert_eq!(response.error.unwrap().code, CODE_INVALID_REQUEST);
    }

    #[tokio::test]
    async fn test_call_without_wallet() {
        let body = r#"{"jsonrpc": "2.0", "id": "a", "method": "getnewaddress", "params": []}"#;
        let response = handle_body(&state(), body).await;
        assert_eq!(response.id, json!("a"));
        assert_eq!(response.error.unwrap().message, "No wallet is open");
    }

    #[test]
    fn test_router_builds() {
        let _router = create_router(state());
    }
}
