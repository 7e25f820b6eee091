//! JSON-RPC command handlers

use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::protocol::{Params, RpcRequest, RpcResponse};
use crate::composer::{
    parse_asset, AssetDefinitionRequest, AssetPaymentRequest, AssetSpec, ComposedJoint, Composer,
    Output, PaymentRequest,
};
use crate::config::WalletConfig;
use crate::definition::{is_valid_address, Address};
use crate::error::WalletError;
use crate::funds::BASE_ASSET;
use crate::network::Network;
use crate::wallet::{create_wallet, WalletSecrets, WalletSession};

/// Shared state of the RPC server
#[derive(Clone)]
pub struct RpcState {
    pub session: Arc<WalletSession>,
    pub composer: Arc<Composer>,
    pub network: Arc<dyn Network>,
    pub config: Arc<WalletConfig>,
}

// ============================================================================
// Dispatch
// ============================================================================

/// Run one request to completion, bounded by the configured timeout
pub async fn dispatch(state: &RpcState, request: RpcRequest) -> RpcResponse {
    let started = Instant::now();
    let limit = Duration::from_secs(state.config.rpc_timeout_secs);
    let method = request.method.clone();

    let result = match tokio::time::timeout(limit, call(state, &request)).await {
        Ok(result) => result,
        Err(_) => {
            log::warn!("{} timed out after {} s", method, limit.as_secs());
            return RpcResponse::timed_out(request.id);
        }
    };
    log::info!("{} took {} ms", method, started.elapsed().as_millis());

    match result {
        Ok(value) => RpcResponse::success(request.id, value),
        Err(e) => {
            log::warn!("{} failed ({}): {}", method, e.category(), e);
            RpcResponse::from_error(request.id, &e)
        }
    }
}

async fn call(state: &RpcState, request: &RpcRequest) -> Result<Value, WalletError> {
    let params = Params::new(&request.params)?;
    match request.method.as_str() {
        "validateaddress" | "verifyaddress" => validate_address(&params),
        "getnewaddress" => get_new_address(state).await,
        "getbalance" => get_balance(state, &params).await,
        "createwallet" => create_new_wallet(state, &params).await,
        "sendpayment" => send_payment(state, &params).await,
        "sendtoaddress" => send_to_address(state, &params).await,
        "createasset" => create_asset(state, &params).await,
        "sendassetpayment" => send_asset_payment(state, &params).await,
        other => Err(WalletError::UnknownMethod(other.to_string())),
    }
}

/// Wallet named by `args[0]` of the spending commands: an id, a
/// `createwallet` record, or null for the default wallet. A record unlocks
/// its wallet in the session.
async fn wallet_arg(state: &RpcState, params: &Params<'_>) -> Result<String, WalletError> {
    match params.opt_value(0) {
        None => Ok(state.session.default_wallet().await?),
        Some(Value::String(wallet)) => Ok(wallet.clone()),
        Some(record @ Value::Object(_)) => {
            let secrets: WalletSecrets = serde_json::from_value(record.clone())
                .map_err(|e| WalletError::InvalidInput(format!("invalid wallet record: {}", e)))?;
            let created = tokio::task::spawn_blocking(move || secrets.unlock())
                .await
                .map_err(|e| WalletError::Internal(format!("wallet unlock aborted: {}", e)))??;
            Ok(state.session.open(created).await?.wallet)
        }
        Some(_) => Err(WalletError::InvalidInput(
            "wallet must be a wallet id or a wallet record".into(),
        )),
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// validateaddress [address]
fn validate_address(params: &Params<'_>) -> Result<Value, WalletError> {
    let candidate = params.str(0, "address")?;
    Ok(json!(is_valid_address(candidate)))
}

/// getnewaddress - next receiving address of the default wallet
async fn get_new_address(state: &RpcState) -> Result<Value, WalletError> {
    let wallet = state.session.default_wallet().await?;
    let issued = state.session.issue_address(&wallet, false).await?;
    Ok(json!(issued.address))
}

/// getbalance [address] - per-asset stable and pending totals
async fn get_balance(state: &RpcState, params: &Params<'_>) -> Result<Value, WalletError> {
    let wallet = state.session.default_wallet().await?;
    let wallet_state = state.session.state(&wallet).await?;

    let addresses = match params.opt_str(0, "address")? {
        Some(candidate) => {
            let address: Address = candidate
                .parse()
                .map_err(|_| WalletError::InvalidInput(format!("invalid address {}", candidate)))?;
            if wallet_state.find(&address).is_none() {
                return Err(WalletError::InvalidInput(format!("address {} not found", address)));
            }
            vec![address]
        }
        None => wallet_state.address_list(),
    };

    let balances = state.composer.balances().query_available(&addresses)?;
    serde_json::to_value(balances).map_err(|e| WalletError::Internal(e.to_string()))
}

/// createwallet [passphrase]
async fn create_new_wallet(state: &RpcState, params: &Params<'_>) -> Result<Value, WalletError> {
    let passphrase = params.opt_str(0, "passphrase")?.unwrap_or_default().to_string();

    // Seed stretching is CPU bound
    let created = tokio::task::spawn_blocking(move || create_wallet(&passphrase))
        .await
        .map_err(|e| WalletError::Internal(format!("wallet generation aborted: {}", e)))??;

    let record = created.record.clone();
    state.session.open(created).await?;
    log::info!("Created wallet {} with address {}", record.wallet, record.address);
    serde_json::to_value(&record).map_err(|e| WalletError::Internal(e.to_string()))
}

/// sendpayment [wallet, to, amount]
async fn send_payment(state: &RpcState, params: &Params<'_>) -> Result<Value, WalletError> {
    let output = Output::parse(params.str(1, "to")?, params.amount(2)?)?;
    let wallet = wallet_arg(state, params).await?;

    let funding = state.session.state(&wallet).await?.address_list();
    let request = PaymentRequest::new(funding, vec![output])?;
    let signer = state.session.signer(&wallet).await?;

    let composed = state
        .composer
        .compose_payment(&request, &signer)
        .await
        .into_result()?;
    deliver(state, &composed)
}

/// sendtoaddress [to, amount, asset] - pays from the default wallet with
/// change going to a freshly issued change address
async fn send_to_address(state: &RpcState, params: &Params<'_>) -> Result<Value, WalletError> {
    let output = Output::parse(params.str(0, "to")?, params.amount(1)?)?;
    let asset = match params.opt_str(2, "asset")? {
        None | Some(BASE_ASSET) => None,
        Some(asset) => Some(parse_asset(asset)?),
    };
    let wallet = state.session.default_wallet().await?;

    let change = state.session.issue_address(&wallet, true).await?;
    let funding = state.session.state(&wallet).await?.address_list();
    let signer = state.session.signer(&wallet).await?;

    let outcome = match asset {
        None => {
            let request = PaymentRequest::new(funding, vec![output])?.with_change_address(change.address);
            state.composer.compose_payment(&request, &signer).await
        }
        Some(asset) => {
            let request = AssetPaymentRequest::new(&asset, funding, vec![output])?
                .with_change_address(change.address);
            state.composer.compose_asset_payment(&request, &signer).await
        }
    };
    deliver(state, &outcome.into_result()?)
}

/// createasset [wallet, asset_spec] - returns the new asset id
async fn create_asset(state: &RpcState, params: &Params<'_>) -> Result<Value, WalletError> {
    let spec: AssetSpec = serde_json::from_value(params.value(1, "asset_spec")?.clone())
        .map_err(|e| WalletError::InvalidInput(format!("invalid asset definition: {}", e)))?;
    let wallet = wallet_arg(state, params).await?;

    let wallet_state = state.session.state(&wallet).await?;
    let definer = wallet_state
        .main_address()
        .map(|issued| issued.address.clone())
        .ok_or_else(|| WalletError::InvalidInput(format!("wallet {} has no address", wallet)))?;
    let request = AssetDefinitionRequest::new(definer, spec)?;
    let signer = state.session.signer(&wallet).await?;

    let composed = state
        .composer
        .compose_asset_definition(&request, &signer)
        .await
        .into_result()?;
    deliver(state, &composed)
}

/// sendassetpayment [wallet, asset, to, amount]
async fn send_asset_payment(state: &RpcState, params: &Params<'_>) -> Result<Value, WalletError> {
    let asset = parse_asset(params.str(1, "asset")?)?;
    let output = Output::parse(params.str(2, "to")?, params.amount(3)?)?;
    let wallet = wallet_arg(state, params).await?;

    let funding = state.session.state(&wallet).await?.address_list();
    let request = AssetPaymentRequest::new(&asset, funding, vec![output])?;
    let signer = state.session.signer(&wallet).await?;

    let composed = state
        .composer
        .compose_asset_payment(&request, &signer)
        .await
        .into_result()?;
    deliver(state, &composed)
}

/// Broadcast a committed joint and hand private chains to their recipients
fn deliver(state: &RpcState, composed: &ComposedJoint) -> Result<Value, WalletError> {
    state.network.broadcast_joint(&composed.joint)?;

    let mut by_recipient: BTreeMap<&Address, Vec<_>> = BTreeMap::new();
    for chain in &composed.private_chains {
        by_recipient.entry(&chain.to).or_default().push(chain.clone());
    }
    for (to, chains) in by_recipient {
        state.network.send_private_payment(to, &chains)?;
    }

    let unit = composed
        .unit_id()
        .ok_or_else(|| WalletError::Internal("committed joint has no unit id".into()))?;
    Ok(json!(unit))
}
