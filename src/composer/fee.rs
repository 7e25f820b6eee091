//! Fee estimation
//!
//! A unit pays a headers commission for its envelope and a payload
//! commission for its messages, both proportional to canonical size.
//! Estimates run on units whose signatures are still placeholders of the
//! final length, so the estimate equals the fee of the signed unit.

use serde::{Deserialize, Serialize};

use super::unit::{Unit, UnitError};

/// Default fee rate (base units per byte)
pub const MIN_FEE_RATE: u64 = 1;

// =============================================================================
// Fee Rate
// =============================================================================

/// Base units charged per byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FeeRate(pub u64);

impl FeeRate {
    pub fn per_byte(rate: u64) -> Self {
        Self(rate)
    }

    /// Calculate fee for a given size
    pub fn fee_for_size(&self, size_bytes: usize) -> u64 {
        self.0.saturating_mul(size_bytes as u64)
    }
}

impl Default for FeeRate {
    fn default() -> Self {
        Self(MIN_FEE_RATE)
    }
}

// =============================================================================
// Fee Policy
// =============================================================================

/// The two commissions of a unit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fee {
    pub headers_commission: u64,
    pub payload_commission: u64,
}

impl Fee {
    pub fn total(&self) -> u64 {
        self.headers_commission.saturating_add(self.payload_commission)
    }

    /// Write the commissions into a unit
    pub fn apply(&self, unit: &mut Unit) {
        unit.headers_commission = self.headers_commission;
        unit.payload_commission = self.payload_commission;
    }
}

/// Fee estimation strategy used by the composer
pub trait FeePolicy: Send + Sync {
    fn estimate(&self, unit: &Unit) -> Result<Fee, UnitError>;
}

/// Charges `rate` per canonical byte
#[derive(Debug, Clone, Copy, Default)]
pub struct SizeFeePolicy {
    rate: FeeRate,
}

impl SizeFeePolicy {
    pub fn new(rate: FeeRate) -> Self {
        Self { rate }
    }
}

impl FeePolicy for SizeFeePolicy {
    fn estimate(&self, unit: &Unit) -> Result<Fee, UnitError> {
        Ok(Fee {
            headers_commission: self.rate.fee_for_size(unit.headers_size()?),
            payload_commission: self.rate.fee_for_size(unit.payload_size()?),
        })
    }
}
