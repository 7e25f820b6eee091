//! Crate-level error type
//!
//! Every command surface funnels failures into [`WalletError`]. The first
//! four variants are the reportable categories; the rest wrap module errors
//! and are classified by [`WalletError::code`].

use thiserror::Error;

use crate::composer::RequestError;
use crate::config::ConfigError;
use crate::crypto::HdError;
use crate::definition::DefinitionError;
use crate::funds::IndexError;
use crate::network::NetworkError;
use crate::signer::SignerError;
use crate::storage::StorageError;
use crate::wallet::{GuardError, RecordError, SessionError, StoreError};

// JSON-RPC error codes
pub const CODE_INVALID_PARAMS: i64 = -32602;
pub const CODE_METHOD_NOT_FOUND: i64 = -32601;
pub const CODE_INTERNAL: i64 = -32603;
pub const CODE_INSUFFICIENT_FUNDS: i64 = -32001;
pub const CODE_SIGNING_FAILURE: i64 = -32002;

#[derive(Error, Debug)]
pub enum WalletError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("{0}")]
    InsufficientFunds(String),
    #[error("{0}")]
    SigningFailure(String),
    #[error("{0}")]
    ConcurrencyViolation(String),
    #[error("Method not found: {0}")]
    UnknownMethod(String),
    #[error("{0}")]
    Internal(String),

    #[error(transparent)]
    Request(#[from] RequestError),
    #[error(transparent)]
    Definition(#[from] DefinitionError),
    #[error(transparent)]
    Hd(#[from] HdError),
    #[error(transparent)]
    Record(#[from] RecordError),
    #[error(transparent)]
    Session(SessionError),
    #[error(transparent)]
    Guard(GuardError),
    #[error(transparent)]
    Store(StoreError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Signer(#[from] SignerError),
    #[error(transparent)]
    Network(#[from] NetworkError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl WalletError {
    /// JSON-RPC error code for this failure
    pub fn code(&self) -> i64 {
        match self {
            WalletError::InvalidInput(_)
            | WalletError::Request(_)
            | WalletError::Definition(_) => CODE_INVALID_PARAMS,
            WalletError::Hd(e) => hd_code(e),
            WalletError::Record(RecordError::Derivation(e)) => hd_code(e),
            WalletError::Record(RecordError::Definition(_)) => CODE_INVALID_PARAMS,
            WalletError::Session(e) => match e {
                SessionError::NoWallet | SessionError::UnknownWallet(_) | SessionError::Locked(_) => {
                    CODE_INVALID_PARAMS
                }
                _ => CODE_INTERNAL,
            },
            WalletError::Guard(GuardError::UnknownWallet(_)) => CODE_INVALID_PARAMS,
            WalletError::InsufficientFunds(_) => CODE_INSUFFICIENT_FUNDS,
            WalletError::SigningFailure(_) | WalletError::Signer(_) => CODE_SIGNING_FAILURE,
            WalletError::UnknownMethod(_) => CODE_METHOD_NOT_FOUND,
            _ => CODE_INTERNAL,
        }
    }

    /// Category name used in logs
    pub fn category(&self) -> &'static str {
        match self.code() {
            CODE_INVALID_PARAMS => "invalid_input",
            CODE_INSUFFICIENT_FUNDS => "insufficient_funds",
            CODE_SIGNING_FAILURE => "signing_failure",
            CODE_METHOD_NOT_FOUND => "unknown_method",
            _ => match self {
                WalletError::ConcurrencyViolation(_) => "concurrency_violation",
                _ => "internal",
            },
        }
    }
}

// Issuance races surface as ConcurrencyViolation however deeply they were wrapped

impl From<StoreError> for WalletError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::CounterMismatch { .. } => WalletError::ConcurrencyViolation(e.to_string()),
            other => WalletError::Store(other),
        }
    }
}

impl From<GuardError> for WalletError {
    fn from(e: GuardError) -> Self {
        match e {
            GuardError::ConcurrencyViolation(_) => WalletError::ConcurrencyViolation(e.to_string()),
            GuardError::Store(store) => store.into(),
            other => WalletError::Guard(other),
        }
    }
}

impl From<SessionError> for WalletError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::Guard(guard) => guard.into(),
            SessionError::Store(store) => store.into(),
            other => WalletError::Session(other),
        }
    }
}

fn hd_code(e: &HdError) -> i64 {
    match e {
        HdError::InvalidPath(_) | HdError::InvalidSeed(_) | HdError::InvalidExtendedKey(_) => {
            CODE_INVALID_PARAMS
        }
        _ => CODE_INTERNAL,
    }
}

pub type Result<T> = std::result::Result<T, WalletError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_taxonomy_codes() {
        assert_eq!(WalletError::InvalidInput("x".into()).code(), CODE_INVALID_PARAMS);
        assert_eq!(WalletError::InsufficientFunds("x".into()).code(), CODE_INSUFFICIENT_FUNDS);
        assert_eq!(WalletError::SigningFailure("x".into()).code(), CODE_SIGNING_FAILURE);
        assert_eq!(WalletError::ConcurrencyViolation("x".into()).code(), CODE_INTERNAL);
        assert_eq!(WalletError::UnknownMethod("x".into()).code(), CODE_METHOD_NOT_FOUND);
    }

    #[test]
    fn test_wrapped_errors_are_classified() {
        let e: WalletError = RequestError::NoOutputs.into();
        assert_eq!(e.code(), CODE_INVALID_PARAMS);
        assert_eq!(e.to_string(), "no outputs");

        let e: WalletError = HdError::InvalidSeed("checksum".into()).into();
        assert_eq!(e.category(), "invalid_input");

        let e: WalletError = GuardError::ConcurrencyViolation("raced".into()).into();
        assert!(matches!(e, WalletError::ConcurrencyViolation(_)));
        assert_eq!(e.category(), "concurrency_violation");

        let e: WalletError = SessionError::NoWallet.into();
        assert_eq!(e.code(), CODE_INVALID_PARAMS);
    }

    #[test]
    fn test_issuance_race_surfaces_through_every_wrapper() {
        let mismatch = || StoreError::CounterMismatch {
            wallet: "w".into(),
            expected: 3,
            found: 4,
        };
        let wrapped: Vec<WalletError> = vec![
            mismatch().into(),
            GuardError::from(mismatch()).into(),
            SessionError::Guard(GuardError::from(mismatch())).into(),
            SessionError::Store(mismatch()).into(),
        ];
        for e in wrapped {
            assert!(matches!(e, WalletError::ConcurrencyViolation(_)), "{:?}", e);
            assert_eq!(e.category(), "concurrency_violation");
            assert_eq!(e.code(), CODE_INTERNAL);
        }

        let e: WalletError = SessionError::Guard(GuardError::UnknownWallet("w".into())).into();
        assert!(matches!(e, WalletError::Guard(GuardError::UnknownWallet(_))));
        assert_eq!(e.code(), CODE_INVALID_PARAMS);
    }

    #[test]
    fn test_reason_is_the_message() {
        let e = WalletError::InsufficientFunds("not enough spendable funds".into());
        assert_eq!(e.to_string(), "not enough spendable funds");
    }
}
