//! Transaction composer
//!
//! Each attempt moves `Building -> Signing -> Committed`, or to `Failed`
//! from either of the first two. Funding addresses are locked for the whole
//! attempt and the spent outputs are handed back to the balance index
//! before the locks drop, so two attempts never select the same outputs.
//!
//! Message layout: index 0 is always the base payment carrying the fee,
//! index 1 is the asset payment or asset definition when there is one.

use std::collections::{BTreeMap, BTreeSet};
use std::slice;
use std::sync::Arc;

use super::fee::{Fee, FeePolicy};
use super::outcome::{ComposedJoint, CompositionError, CompositionOutcome, FailureKind};
use super::request::{AssetDefinitionRequest, AssetPaymentRequest, AssetSpec, Output, PaymentRequest};
use super::unit::{
    Author, Joint, Message, MessageApp, Payload, PaymentPayload, PrivateChain, PrivateElement, Unit,
    UnitError,
};
use crate::definition::{Address, SpendingDefinition};
use crate::funds::{BalanceIndex, IndexError, OutputRef, SpendUnconfirmed, SpendableOutput, BASE_ASSET};
use crate::locks::KeyedLocks;
use crate::signer::{Signer, SignerError};

/// Fee re-estimation rounds before giving up
const MAX_FEE_ROUNDS: usize = 8;

pub const BASE_MESSAGE_INDEX: u32 = 0;
pub const ASSET_MESSAGE_INDEX: u32 = 1;

/// Lock key guarding outputs of one address
pub fn spend_lock_key(address: &Address) -> String {
    format!("spend:{}", address)
}

/// States of one composition attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositionState {
    Building,
    Signing,
    Committed,
    Failed,
}

struct Attempt {
    label: &'static str,
    state: CompositionState,
}

impl Attempt {
    fn new(label: &'static str) -> Self {
        log::debug!("{} composition: {:?}", label, CompositionState::Building);
        Self {
            label,
            state: CompositionState::Building,
        }
    }

    fn advance(&mut self, next: CompositionState) {
        log::debug!("{} composition: {:?} -> {:?}", self.label, self.state, next);
        self.state = next;
    }
}

/// Why an attempt stopped short of `Committed`
enum Abort {
    InsufficientFunds(String),
    Error(CompositionError),
}

impl Abort {
    fn signing(reason: impl Into<String>) -> Self {
        Abort::Error(CompositionError::new(FailureKind::Signing, reason))
    }

    fn internal(reason: impl Into<String>) -> Self {
        Abort::Error(CompositionError::new(FailureKind::Internal, reason))
    }
}

impl From<SignerError> for Abort {
    fn from(e: SignerError) -> Self {
        Abort::signing(e.to_string())
    }
}

impl From<UnitError> for Abort {
    fn from(e: UnitError) -> Self {
        Abort::internal(e.to_string())
    }
}

impl From<IndexError> for Abort {
    fn from(e: IndexError) -> Self {
        Abort::internal(e.to_string())
    }
}

struct AssetLeg<'a> {
    asset: &'a str,
    outputs: &'a [Output],
    total: u64,
    is_private: bool,
}

/// What one attempt has to produce
struct Plan<'a> {
    label: &'static str,
    funding: &'a [Address],
    payer: &'a Address,
    change_address: &'a Address,
    base_outputs: &'a [Output],
    base_total: u64,
    asset: Option<AssetLeg<'a>>,
    defines: Option<&'a AssetSpec>,
}

impl Plan<'_> {
    fn owns(&self, address: &Address) -> bool {
        address == self.change_address || self.funding.contains(address)
    }
}

/// Definition and signature lengths the signer declared for an author
struct AuthorTemplate {
    definition: SpendingDefinition,
    lengths: BTreeMap<String, usize>,
}

/// A unit with placeholder signatures and settled fee
struct Skeleton {
    unit: Unit,
    fee: Fee,
    private_payload: Option<PaymentPayload>,
}

/// Requested outputs plus the payer echo and change
fn with_change(outputs: &[Output], payer: &Address, change_address: &Address, change: u64) -> Vec<Output> {
    let mut all = outputs.to_vec();
    if change_address == payer {
        all.push(Output {
            address: payer.clone(),
            amount: change,
        });
    } else {
        all.push(Output {
            address: payer.clone(),
            amount: 0,
        });
        if change > 0 {
            all.push(Output {
                address: change_address.clone(),
                amount: change,
            });
        }
    }
    all.sort();
    all
}

fn outpoints(inputs: &[SpendableOutput]) -> Vec<OutputRef> {
    let mut refs: Vec<OutputRef> = inputs.iter().map(|i| i.outpoint.clone()).collect();
    refs.sort();
    refs
}

/// Builds, signs and commits joints
pub struct Composer {
    balances: Arc<dyn BalanceIndex>,
    fees: Arc<dyn FeePolicy>,
    locks: Arc<KeyedLocks>,
    spend_unconfirmed: SpendUnconfirmed,
}

impl Composer {
    pub fn new(
        balances: Arc<dyn BalanceIndex>,
        fees: Arc<dyn FeePolicy>,
        locks: Arc<KeyedLocks>,
        spend_unconfirmed: SpendUnconfirmed,
    ) -> Self {
        Self {
            balances,
            fees,
            locks,
            spend_unconfirmed,
        }
    }

    pub fn balances(&self) -> &Arc<dyn BalanceIndex> {
        &self.balances
    }

    /// Pay base currency
    pub async fn compose_payment(&self, request: &PaymentRequest, signer: &dyn Signer) -> CompositionOutcome {
        let plan = Plan {
            label: "payment",
            funding: request.funding(),
            payer: request.payer(),
            change_address: request.change_address(),
            base_outputs: request.outputs(),
            base_total: request.total(),
            asset: None,
            defines: None,
        };
        self.execute(plan, signer).await
    }

    /// Pay a divisible asset; the fee comes from the same addresses in base currency
    pub async fn compose_asset_payment(
        &self,
        request: &AssetPaymentRequest,
        signer: &dyn Signer,
    ) -> CompositionOutcome {
        let spec = match self.balances.asset_spec(request.asset()) {
            Ok(Some(spec)) => spec,
            Ok(None) => {
                return CompositionOutcome::Error(CompositionError::new(
                    FailureKind::InvalidInput,
                    format!("unknown asset {}", request.asset()),
                ))
            }
            Err(e) => {
                return CompositionOutcome::Error(CompositionError::new(FailureKind::Internal, e.to_string()))
            }
        };
        let payment = request.payment();
        let plan = Plan {
            label: "asset payment",
            funding: payment.funding(),
            payer: payment.payer(),
            change_address: payment.change_address(),
            base_outputs: &[],
            base_total: 0,
            asset: Some(AssetLeg {
                asset: request.asset(),
                outputs: payment.outputs(),
                total: payment.total(),
                is_private: spec.is_private,
            }),
            defines: None,
        };
        self.execute(plan, signer).await
    }

    /// Define a new asset; its id is the id of the committed unit
    pub async fn compose_asset_definition(
        &self,
        request: &AssetDefinitionRequest,
        signer: &dyn Signer,
    ) -> CompositionOutcome {
        let plan = Plan {
            label: "asset definition",
            funding: slice::from_ref(request.definer()),
            payer: request.definer(),
            change_address: request.definer(),
            base_outputs: &[],
            base_total: 0,
            asset: None,
            defines: Some(request.spec()),
        };
        self.execute(plan, signer).await
    }

    async fn execute(&self, plan: Plan<'_>, signer: &dyn Signer) -> CompositionOutcome {
        let _guards = self
            .locks
            .lock_many(plan.funding.iter().map(spend_lock_key))
            .await;

        let mut attempt = Attempt::new(plan.label);
        match self.run(&plan, signer, &mut attempt) {
            Ok(composed) => {
                log::info!(
                    "Composed {} unit {} (fee {})",
                    plan.label,
                    composed.unit_id().unwrap_or("?"),
                    composed.fee.total()
                );
                CompositionOutcome::Ok(composed)
            }
            Err(abort) => {
                attempt.advance(CompositionState::Failed);
                match abort {
                    Abort::InsufficientFunds(reason) => {
                        log::warn!("{} failed: {}", plan.label, reason);
                        CompositionOutcome::InsufficientFunds(reason)
                    }
                    Abort::Error(error) => {
                        log::error!("{} failed ({:?}): {}", plan.label, error.kind, error);
                        CompositionOutcome::Error(error)
                    }
                }
            }
        }
    }

    fn run(&self, plan: &Plan<'_>, signer: &dyn Signer, attempt: &mut Attempt) -> Result<ComposedJoint, Abort> {
        let policy = self.spend_unconfirmed;

        // Funds check comes before anything touches the signer
        let balances = self.balances.query_available(plan.funding)?;
        if let Some(leg) = &plan.asset {
            let available = balances.get(leg.asset).map_or(0, |b| b.spendable(policy));
            if available < leg.total {
                return Err(Abort::InsufficientFunds(format!(
                    "not enough asset {}: available {}, required {}",
                    leg.asset, available, leg.total
                )));
            }
        }
        let available = balances.get(BASE_ASSET).map_or(0, |b| b.spendable(policy));
        if available < plan.base_total {
            return Err(Abort::InsufficientFunds(format!(
                "not enough funds: available {}, required {} plus fee",
                available, plan.base_total
            )));
        }

        let (asset_inputs, asset_change) = match &plan.asset {
            Some(leg) => self.select_asset_inputs(plan, leg)?,
            None => (Vec::new(), 0),
        };

        let mut templates = BTreeMap::new();
        let mut base_inputs = Vec::new();
        let mut input_sum = 0u64;
        let mut skeleton = None;
        for candidate in self.balances.spendable_outputs(plan.funding, None, policy)? {
            input_sum = input_sum.saturating_add(candidate.amount);
            base_inputs.push(candidate);
            if input_sum < plan.base_total {
                continue;
            }
            skeleton = self.settle(
                plan,
                signer,
                &mut templates,
                &base_inputs,
                input_sum,
                &asset_inputs,
                asset_change,
            )?;
            if skeleton.is_some() {
                break;
            }
        }
        let Skeleton {
            mut unit,
            fee,
            private_payload,
        } = skeleton.ok_or_else(|| {
            Abort::InsufficientFunds(format!(
                "not enough funds to pay {} plus fee: {} spendable",
                plan.base_total, input_sum
            ))
        })?;

        attempt.advance(CompositionState::Signing);
        let digest = unit.hash_to_sign()?;
        for author in unit.authors.iter_mut() {
            let template = templates
                .get(&author.address)
                .ok_or_else(|| Abort::internal(format!("no template for author {}", author.address)))?;
            for (path, expected) in &template.lengths {
                let signature = signer.sign(&digest, &author.address, path)?;
                if signature.len() != *expected {
                    return Err(Abort::signing(format!(
                        "signer returned {} chars for {} path {}, declared {}",
                        signature.len(),
                        author.address,
                        path,
                        expected
                    )));
                }
                author.authentifiers.insert(path.clone(), signature);
            }
        }

        let unit_id = unit.compute_id()?;
        unit.unit = Some(unit_id.clone());

        let mut spent = outpoints(&base_inputs);
        spent.extend(outpoints(&asset_inputs));
        let created = self.own_outputs(plan, &unit, &unit_id, private_payload.as_ref());
        let defined = plan.defines.map(|spec| (unit_id.as_str(), spec));
        self.balances.apply_spend(&spent, created, defined)?;

        let private_chains = match (&plan.asset, private_payload) {
            (Some(leg), Some(payload)) => private_chains(leg, &unit_id, payload),
            _ => Vec::new(),
        };

        attempt.advance(CompositionState::Committed);
        Ok(ComposedJoint {
            joint: Joint { unit },
            private_chains,
            fee,
        })
    }

    fn select_asset_inputs(&self, plan: &Plan<'_>, leg: &AssetLeg<'_>) -> Result<(Vec<SpendableOutput>, u64), Abort> {
        let mut selected = Vec::new();
        let mut sum = 0u64;
        for candidate in self
            .balances
            .spendable_outputs(plan.funding, Some(leg.asset), self.spend_unconfirmed)?
        {
            sum = sum.saturating_add(candidate.amount);
            selected.push(candidate);
            if sum >= leg.total {
                return Ok((selected, sum - leg.total));
            }
        }
        Err(Abort::InsufficientFunds(format!(
            "not enough spendable asset {}: {} of {}",
            leg.asset, sum, leg.total
        )))
    }

    /// Iterate the fee estimate until the skeleton pays at least its own fee
    #[allow(clippy::too_many_arguments)]
    fn settle(
        &self,
        plan: &Plan<'_>,
        signer: &dyn Signer,
        templates: &mut BTreeMap<Address, AuthorTemplate>,
        base_inputs: &[SpendableOutput],
        input_sum: u64,
        asset_inputs: &[SpendableOutput],
        asset_change: u64,
    ) -> Result<Option<Skeleton>, Abort> {
        let mut fee = Fee::default();
        for _ in 0..MAX_FEE_ROUNDS {
            let Some(change) = input_sum
                .checked_sub(plan.base_total)
                .and_then(|rest| rest.checked_sub(fee.total()))
            else {
                return Ok(None);
            };

            let (mut unit, private_payload) =
                build_unit(plan, signer, templates, base_inputs, change, asset_inputs, asset_change)?;
            fee.apply(&mut unit);
            let estimate = self.fees.estimate(&unit)?;
            if estimate.headers_commission <= fee.headers_commission
                && estimate.payload_commission <= fee.payload_commission
            {
                return Ok(Some(Skeleton {
                    unit,
                    fee,
                    private_payload,
                }));
            }
            fee = Fee {
                headers_commission: fee.headers_commission.max(estimate.headers_commission),
                payload_commission: fee.payload_commission.max(estimate.payload_commission),
            };
        }
        Err(Abort::internal("fee estimate did not converge"))
    }

    /// Outputs of the committed unit that land on our own addresses
    fn own_outputs(
        &self,
        plan: &Plan<'_>,
        unit: &Unit,
        unit_id: &str,
        private_payload: Option<&PaymentPayload>,
    ) -> Vec<SpendableOutput> {
        let payments = unit
            .messages
            .iter()
            .enumerate()
            .filter_map(|(i, message)| match &message.payload {
                Some(Payload::Payment(payment)) => Some((i as u32, payment)),
                _ => None,
            })
            .chain(private_payload.map(|p| (ASSET_MESSAGE_INDEX, p)));

        let mut created = Vec::new();
        for (message_index, payment) in payments {
            for (output_index, output) in payment.outputs.iter().enumerate() {
                if output.amount == 0 || !plan.owns(&output.address) {
                    continue;
                }
                created.push(SpendableOutput {
                    outpoint: OutputRef {
                        unit: unit_id.to_string(),
                        message_index,
                        output_index: output_index as u32,
                    },
                    address: output.address.clone(),
                    asset: payment.asset.clone(),
                    amount: output.amount,
                    is_stable: false,
                    is_own: true,
                });
            }
        }
        created
    }
}

fn author_template<'t>(
    signer: &dyn Signer,
    templates: &'t mut BTreeMap<Address, AuthorTemplate>,
    address: &Address,
) -> Result<&'t AuthorTemplate, Abort> {
    if !templates.contains_key(address) {
        let definition = signer.definition(address)?;
        if definition.address().ok().as_ref() != Some(address) {
            return Err(Abort::signing(format!(
                "signer definition does not hash to {}",
                address
            )));
        }
        let lengths = signer.signing_path_lengths(address)?;
        templates.insert(address.clone(), AuthorTemplate { definition, lengths });
    }
    templates
        .get(address)
        .ok_or_else(|| Abort::internal(format!("no template for author {}", address)))
}

#[allow(clippy::too_many_arguments)]
fn build_unit(
    plan: &Plan<'_>,
    signer: &dyn Signer,
    templates: &mut BTreeMap<Address, AuthorTemplate>,
    base_inputs: &[SpendableOutput],
    base_change: u64,
    asset_inputs: &[SpendableOutput],
    asset_change: u64,
) -> Result<(Unit, Option<PaymentPayload>), Abort> {
    let author_addresses: BTreeSet<&Address> = base_inputs
        .iter()
        .chain(asset_inputs)
        .map(|input| &input.address)
        .collect();
    let mut authors = Vec::with_capacity(author_addresses.len());
    for address in author_addresses {
        let template = author_template(signer, templates, address)?;
        authors.push(Author::with_placeholders(
            address.clone(),
            Some(template.definition.clone()),
            &template.lengths,
        ));
    }

    let base_payment = PaymentPayload {
        asset: None,
        inputs: outpoints(base_inputs),
        outputs: with_change(plan.base_outputs, plan.payer, plan.change_address, base_change),
    };
    let mut messages = vec![Message::inline(MessageApp::Payment, Payload::Payment(base_payment))?];

    let mut private_payload = None;
    if let Some(leg) = &plan.asset {
        let payload = PaymentPayload {
            asset: Some(leg.asset.to_string()),
            inputs: outpoints(asset_inputs),
            outputs: with_change(leg.outputs, plan.payer, plan.change_address, asset_change),
        };
        if leg.is_private {
            messages.push(Message::private(MessageApp::Payment, &Payload::Payment(payload.clone()))?);
            private_payload = Some(payload);
        } else {
            messages.push(Message::inline(MessageApp::Payment, Payload::Payment(payload))?);
        }
    }
    if let Some(spec) = plan.defines {
        messages.push(Message::inline(MessageApp::Asset, Payload::Asset(spec.clone()))?);
    }

    Ok((Unit::new(authors, messages), private_payload))
}

/// One chain per recipient output of a private transfer
fn private_chains(leg: &AssetLeg<'_>, unit_id: &str, payload: PaymentPayload) -> Vec<PrivateChain> {
    let mut used = BTreeSet::new();
    let mut chains = Vec::with_capacity(leg.outputs.len());
    for wanted in leg.outputs {
        let position = payload
            .outputs
            .iter()
            .enumerate()
            .position(|(i, o)| o == wanted && !used.contains(&i));
        if let Some(output_index) = position {
            used.insert(output_index);
            chains.push(PrivateChain {
                to: wanted.address.clone(),
                elements: vec![PrivateElement {
                    unit: unit_id.to_string(),
                    message_index: ASSET_MESSAGE_INDEX,
                    output_index: output_index as u32,
                    payload: payload.clone(),
                }],
            });
        }
    }
    chains
}
