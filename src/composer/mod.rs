//! Transaction composition
//!
//! Turns validated payment and asset requests into signed joints. The
//! composer checks funds, selects inputs, estimates the fee, asks a
//! [`Signer`](crate::signer::Signer) for every signing path and reports
//! exactly one [`CompositionOutcome`]. Broadcasting is left to the caller.

pub mod composer;
pub mod fee;
pub mod outcome;
pub mod request;
pub mod unit;
pub mod verify;

pub use composer::{spend_lock_key, Composer, CompositionState, ASSET_MESSAGE_INDEX, BASE_MESSAGE_INDEX};
pub use fee::{Fee, FeePolicy, FeeRate, SizeFeePolicy, MIN_FEE_RATE};
pub use outcome::{ComposedJoint, CompositionError, CompositionOutcome, FailureKind};
pub use request::{
    parse_asset, AssetDefinitionRequest, AssetPaymentRequest, AssetSpec, Output, PaymentRequest,
    RequestError,
};
pub use unit::{
    Author, Joint, Message, MessageApp, Payload, PayloadLocation, PaymentPayload, PrivateChain,
    PrivateElement, Unit, UnitError,
};
pub use verify::{verify_joint, VerifyError};
