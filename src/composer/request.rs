//! Validated composition requests
//!
//! Everything here is checked at construction, so a request that reaches
//! the composer can fail only on funds or signing.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

use crate::crypto::{is_valid_base64, HASH_LENGTH};
use crate::definition::Address;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("no funding addresses")]
    NoFundingAddresses,
    #[error("no outputs")]
    NoOutputs,
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    #[error("amount must be a positive integer, got {0}")]
    InvalidAmount(String),
    #[error("total amount overflows")]
    AmountOverflow,
    #[error("invalid asset: {0}")]
    InvalidAsset(String),
    #[error("invalid asset definition: {0}")]
    InvalidAssetSpec(String),
}

/// One payment destination
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Output {
    pub address: Address,
    pub amount: u64,
}

impl Output {
    /// Parse a destination and a positive amount
    pub fn parse(address: &str, amount: u64) -> Result<Self, RequestError> {
        let address = address
            .parse()
            .map_err(|_| RequestError::InvalidAddress(address.to_string()))?;
        if amount == 0 {
            return Err(RequestError::InvalidAmount(amount.to_string()));
        }
        Ok(Self { address, amount })
    }
}

fn dedup_funding(funding: Vec<Address>) -> Result<Vec<Address>, RequestError> {
    let mut seen = BTreeSet::new();
    let funding: Vec<Address> = funding.into_iter().filter(|a| seen.insert(a.clone())).collect();
    if funding.is_empty() {
        return Err(RequestError::NoFundingAddresses);
    }
    Ok(funding)
}

fn total_of(outputs: &[Output]) -> Result<u64, RequestError> {
    if outputs.is_empty() {
        return Err(RequestError::NoOutputs);
    }
    outputs.iter().try_fold(0u64, |acc, o| {
        if o.amount == 0 {
            return Err(RequestError::InvalidAmount(o.amount.to_string()));
        }
        acc.checked_add(o.amount).ok_or(RequestError::AmountOverflow)
    })
}

/// Pay base currency from funding addresses.
///
/// The first funding address is the payer; it always appears among the
/// outputs and receives change unless `change_address` says otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRequest {
    funding: Vec<Address>,
    outputs: Vec<Output>,
    change_address: Option<Address>,
    total: u64,
}

impl PaymentRequest {
    pub fn new(funding: Vec<Address>, outputs: Vec<Output>) -> Result<Self, RequestError> {
        let funding = dedup_funding(funding)?;
        let total = total_of(&outputs)?;
        Ok(Self {
            funding,
            outputs,
            change_address: None,
            total,
        })
    }

    pub fn with_change_address(mut self, change: Address) -> Self {
        self.change_address = Some(change);
        self
    }

    pub fn funding(&self) -> &[Address] {
        &self.funding
    }

    pub fn payer(&self) -> &Address {
        &self.funding[0]
    }

    pub fn outputs(&self) -> &[Output] {
        &self.outputs
    }

    pub fn change_address(&self) -> &Address {
        self.change_address.as_ref().unwrap_or(&self.funding[0])
    }

    /// Sum of all requested outputs
    pub fn total(&self) -> u64 {
        self.total
    }
}

/// Check an asset id: 44-char canonical base64 of a 32-byte hash
pub fn parse_asset(asset: &str) -> Result<String, RequestError> {
    if is_valid_base64(asset, HASH_LENGTH) {
        Ok(asset.to_string())
    } else {
        Err(RequestError::InvalidAsset(asset.to_string()))
    }
}

/// Pay a divisible asset; the fee is paid in base currency by the same addresses
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetPaymentRequest {
    asset: String,
    payment: PaymentRequest,
}

impl AssetPaymentRequest {
    pub fn new(asset: &str, funding: Vec<Address>, outputs: Vec<Output>) -> Result<Self, RequestError> {
        Ok(Self {
            asset: parse_asset(asset)?,
            payment: PaymentRequest::new(funding, outputs)?,
        })
    }

    pub fn with_change_address(mut self, change: Address) -> Self {
        self.payment = self.payment.with_change_address(change);
        self
    }

    pub fn asset(&self) -> &str {
        &self.asset
    }

    pub fn payment(&self) -> &PaymentRequest {
        &self.payment
    }
}

/// Properties of a new asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetSpec {
    /// Total supply, or unlimited
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cap: Option<u64>,
    #[serde(default)]
    pub is_private: bool,
    #[serde(default = "default_true")]
    pub is_transferrable: bool,
    #[serde(default)]
    pub auto_destroy: bool,
    #[serde(default)]
    pub fixed_denominations: bool,
    #[serde(default)]
    pub issued_by_definer_only: bool,
    #[serde(default)]
    pub cosigned_by_definer: bool,
    #[serde(default)]
    pub spender_attested: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attestors: Option<Vec<Address>>,
}

fn default_true() -> bool {
    true
}

impl Default for AssetSpec {
    fn default() -> Self {
        Self {
            cap: None,
            is_private: false,
            is_transferrable: true,
            auto_destroy: false,
            fixed_denominations: false,
            issued_by_definer_only: false,
            cosigned_by_definer: false,
            spender_attested: false,
            attestors: None,
        }
    }
}

impl AssetSpec {
    pub fn validate(&self) -> Result<(), RequestError> {
        let invalid = |reason: &str| Err(RequestError::InvalidAssetSpec(reason.to_string()));
        if self.cap == Some(0) {
            return invalid("cap must be positive");
        }
        if self.fixed_denominations {
            return invalid("fixed denominations are not supported");
        }
        match (&self.attestors, self.spender_attested) {
            (Some(list), true) if !list.is_empty() => Ok(()),
            (_, true) => invalid("spender_attested requires attestors"),
            (Some(_), false) => invalid("attestors given but spender_attested is false"),
            (None, false) => Ok(()),
        }
    }
}

/// Define a new asset from one address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetDefinitionRequest {
    definer: Address,
    spec: AssetSpec,
}

impl AssetDefinitionRequest {
    pub fn new(definer: Address, spec: AssetSpec) -> Result<Self, RequestError> {
        spec.validate()?;
        Ok(Self { definer, spec })
    }

    pub fn definer(&self) -> &Address {
        &self.definer
    }

    pub fn spec(&self) -> &AssetSpec {
        &self.spec
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAYER: &str = "QZAB2MYRLRVUNITTOOCF5ZE3AG4TCJDD";
    const OTHER: &str = "LBFE3LOJHOH24Y4J54RR6GDM3KVL2PWJ";

    fn addr(s: &str) -> Address {
        s.parse().unwrap()
    }

    #[test]
    fn test_payment_request_defaults() {
        let req = PaymentRequest::new(
            vec![addr(PAYER), addr(OTHER), addr(PAYER)],
            vec![Output::parse(OTHER, 500).unwrap()],
        )
        .unwrap();
        assert_eq!(req.funding().len(), 2);
        assert_eq!(req.payer().as_str(), PAYER);
        assert_eq!(req.change_address().as_str(), PAYER);
        assert_eq!(req.total(), 500);

        let req = req.with_change_address(addr(OTHER));
        assert_eq!(req.change_address().as_str(), OTHER);
    }

    #[test]
    fn test_payment_request_rejects() {
        assert_eq!(
            PaymentRequest::new(vec![], vec![Output::parse(OTHER, 1).unwrap()]),
            Err(RequestError::NoFundingAddresses)
        );
        assert_eq!(
            PaymentRequest::new(vec![addr(PAYER)], vec![]),
            Err(RequestError::NoOutputs)
        );
        assert!(matches!(Output::parse(OTHER, 0), Err(RequestError::InvalidAmount(_))));
        assert!(matches!(Output::parse("bogus", 5), Err(RequestError::InvalidAddress(_))));
        assert_eq!(
            PaymentRequest::new(
                vec![addr(PAYER)],
                vec![
                    Output::parse(OTHER, u64::MAX).unwrap(),
                    Output::parse(PAYER, 1).unwrap()
                ]
            ),
            Err(RequestError::AmountOverflow)
        );
    }

    #[test]
    fn test_asset_id_validation() {
        assert!(parse_asset("uU0nuZNNPgilLlLX2n2r+sSE7+N6U4DukIj3rOLvzek=").is_ok());
        assert!(parse_asset("uU0nuZNNPgilLlLX2n2r+sSE7+N6U4DukIj3rOLvze").is_err());
        assert!(parse_asset("not base64 at all, but forty-four chars long").is_err());
    }

    #[test]
    fn test_asset_spec_validation() {
        assert!(AssetSpec::default().validate().is_ok());
        assert!(AssetSpec { cap: Some(0), ..Default::default() }.validate().is_err());
        assert!(AssetSpec { fixed_denominations: true, ..Default::default() }.validate().is_err());
        assert!(AssetSpec { spender_attested: true, ..Default::default() }.validate().is_err());
        assert!(AssetSpec {
            spender_attested: true,
            attestors: Some(vec![addr(OTHER)]),
            ..Default::default()
        }
        .validate()
        .is_ok());
    }

    #[test]
    fn test_asset_spec_from_json_defaults() {
        let spec: AssetSpec = serde_json::from_str(r#"{"cap": 1000000, "is_private": true}"#).unwrap();
        assert_eq!(spec.cap, Some(1_000_000));
        assert!(spec.is_private);
        assert!(spec.is_transferrable);
        assert!(!spec.issued_by_definer_only);
    }
}
