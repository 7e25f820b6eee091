//! JSON-RPC command surface
//!
//! A single `POST /` endpoint speaking JSON-RPC 2.0 with positional params.
//!
//! # Commands
//! - `validateaddress [address]`, alias `verifyaddress`
//! - `getnewaddress`
//! - `getbalance [address]`
//! - `createwallet [passphrase]`
//! - `sendpayment [wallet, to, amount]`
//! - `sendtoaddress [to, amount, asset]`
//! - `createasset [wallet, asset_spec]`
//! - `sendassetpayment [wallet, asset, to, amount]`

pub mod handlers;
pub mod protocol;
pub mod routes;

pub use handlers::{dispatch, RpcState};
pub use protocol::{Params, RpcErrorObject, RpcRequest, RpcResponse, JSONRPC_VERSION};
pub use routes::create_router;
