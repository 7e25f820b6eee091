//! Terminal result of one composition attempt

use serde::Serialize;
use std::fmt;

use super::fee::Fee;
use super::unit::{Joint, PrivateChain};
use crate::error::WalletError;

/// A committed joint plus anything that must travel beside it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComposedJoint {
    pub joint: Joint,
    /// Recipient chains for private asset transfers
    pub private_chains: Vec<PrivateChain>,
    pub fee: Fee,
}

impl ComposedJoint {
    pub fn unit_id(&self) -> Option<&str> {
        self.joint.unit.unit.as_deref()
    }
}

/// What kind of failure stopped an attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The request names something that does not exist
    InvalidInput,
    /// The signer refused, or returned something unusable
    Signing,
    /// Index, storage or serialization trouble
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositionError {
    pub kind: FailureKind,
    pub reason: String,
}

impl CompositionError {
    pub fn new(kind: FailureKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for CompositionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason)
    }
}

impl From<CompositionError> for WalletError {
    fn from(e: CompositionError) -> Self {
        match e.kind {
            FailureKind::InvalidInput => WalletError::InvalidInput(e.reason),
            FailureKind::Signing => WalletError::SigningFailure(e.reason),
            FailureKind::Internal => WalletError::Internal(e.reason),
        }
    }
}

/// Exactly one of these is produced per attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompositionOutcome {
    Ok(ComposedJoint),
    InsufficientFunds(String),
    Error(CompositionError),
}

impl CompositionOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, CompositionOutcome::Ok(_))
    }

    /// Short label for logs
    pub fn kind(&self) -> &'static str {
        match self {
            CompositionOutcome::Ok(_) => "ok",
            CompositionOutcome::InsufficientFunds(_) => "insufficient_funds",
            CompositionOutcome::Error(_) => "error",
        }
    }

    pub fn into_result(self) -> Result<ComposedJoint, WalletError> {
        match self {
            CompositionOutcome::Ok(joint) => Ok(joint),
            CompositionOutcome::InsufficientFunds(reason) => Err(WalletError::InsufficientFunds(reason)),
            CompositionOutcome::Error(e) => Err(e.into()),
        }
    }
}
