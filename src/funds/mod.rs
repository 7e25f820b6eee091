//! Balance and spendable-output index
//!
//! The composer asks this collaborator how much each funding address can
//! spend before it builds anything, then picks concrete outputs from it.
//! [`MemoryBalanceIndex`] is the reference implementation: an in-memory
//! output set optionally mirrored to a JSON snapshot.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::RwLock;
use thiserror::Error;

use crate::composer::AssetSpec;
use crate::definition::Address;
use crate::storage::{load_json, save_json, StorageError};

/// Asset key used for the native currency
pub const BASE_ASSET: &str = "base";

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Balance index lock poisoned")]
    Poisoned,
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Which unconfirmed outputs may be spent
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpendUnconfirmed {
    All,
    #[default]
    Own,
    None,
}

/// Stable and pending totals of one asset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetBalance {
    pub stable: u64,
    pub pending: u64,
}

impl AssetBalance {
    /// Upper bound of what the policy may spend
    pub fn spendable(&self, policy: SpendUnconfirmed) -> u64 {
        match policy {
            SpendUnconfirmed::None => self.stable,
            SpendUnconfirmed::Own | SpendUnconfirmed::All => self.stable.saturating_add(self.pending),
        }
    }
}

/// Reference to an output of an earlier unit
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OutputRef {
    pub unit: String,
    pub message_index: u32,
    pub output_index: u32,
}

/// An unspent output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendableOutput {
    #[serde(flatten)]
    pub outpoint: OutputRef,
    pub address: Address,
    /// `None` for the base asset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset: Option<String>,
    pub amount: u64,
    pub is_stable: bool,
    /// Created by one of our own units
    #[serde(default)]
    pub is_own: bool,
}

impl SpendableOutput {
    fn asset_key(&self) -> &str {
        self.asset.as_deref().unwrap_or(BASE_ASSET)
    }

    fn usable(&self, policy: SpendUnconfirmed) -> bool {
        self.is_stable
            || match policy {
                SpendUnconfirmed::All => true,
                SpendUnconfirmed::Own => self.is_own,
                SpendUnconfirmed::None => false,
            }
    }
}

/// Read side and spend bookkeeping of the output set
pub trait BalanceIndex: Send + Sync {
    /// Totals per asset over `addresses`
    fn query_available(&self, addresses: &[Address]) -> Result<BTreeMap<String, AssetBalance>, IndexError>;

    /// Outputs of `asset` on `addresses` that `policy` allows spending, largest first
    fn spendable_outputs(
        &self,
        addresses: &[Address],
        asset: Option<&str>,
        policy: SpendUnconfirmed,
    ) -> Result<Vec<SpendableOutput>, IndexError>;

    /// Remove spent outputs, add the ones a committed unit created for us and
    /// remember the asset it defined, if any. Nothing changes unless all of it
    /// is stored.
    fn apply_spend(
        &self,
        spent: &[OutputRef],
        created: Vec<SpendableOutput>,
        defined: Option<(&str, &AssetSpec)>,
    ) -> Result<(), IndexError>;

    /// Definition of a known asset
    fn asset_spec(&self, asset: &str) -> Result<Option<AssetSpec>, IndexError>;

    /// Remember an asset defined by a committed unit
    fn register_asset(&self, asset: &str, spec: AssetSpec) -> Result<(), IndexError>;
}

/// Snapshot file layout
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct OutputSet {
    outputs: Vec<SpendableOutput>,
    #[serde(default)]
    assets: BTreeMap<String, AssetSpec>,
}

/// In-memory output set
#[derive(Debug, Default)]
pub struct MemoryBalanceIndex {
    set: RwLock<OutputSet>,
    snapshot: Option<PathBuf>,
}

impl MemoryBalanceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_outputs(outputs: Vec<SpendableOutput>) -> Self {
        Self {
            set: RwLock::new(OutputSet {
                outputs,
                assets: BTreeMap::new(),
            }),
            snapshot: None,
        }
    }

    /// Load from a snapshot file (empty if missing); later changes are written back
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, IndexError> {
        let path = path.into();
        let set: OutputSet = load_json(&path)?.unwrap_or_default();
        log::info!(
            "Loaded {} outputs and {} assets from {}",
            set.outputs.len(),
            set.assets.len(),
            path.display()
        );
        Ok(Self {
            set: RwLock::new(set),
            snapshot: Some(path),
        })
    }

    pub fn add_output(&self, output: SpendableOutput) -> Result<(), IndexError> {
        self.update(|set| set.outputs.push(output))
    }

    pub fn len(&self) -> usize {
        self.set.read().map(|s| s.outputs.len()).unwrap_or(0)
    }

    /// Apply `change` to a copy, write the copy, then swap it in
    fn update(&self, change: impl FnOnce(&mut OutputSet)) -> Result<(), IndexError> {
        let mut set = self.set.write().map_err(|_| IndexError::Poisoned)?;
        let mut next = set.clone();
        change(&mut next);
        if let Some(path) = &self.snapshot {
            save_json(path, &next)?;
        }
        *set = next;
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BalanceIndex for MemoryBalanceIndex {
    fn query_available(&self, addresses: &[Address]) -> Result<BTreeMap<String, AssetBalance>, IndexError> {
        let wanted: BTreeSet<&Address> = addresses.iter().collect();
        let set = self.set.read().map_err(|_| IndexError::Poisoned)?;

        let mut balances: BTreeMap<String, AssetBalance> = BTreeMap::new();
        for output in set.outputs.iter().filter(|o| wanted.contains(&o.address)) {
            let entry = balances.entry(output.asset_key().to_string()).or_default();
            if output.is_stable {
                entry.stable = entry.stable.saturating_add(output.amount);
            } else {
                entry.pending = entry.pending.saturating_add(output.amount);
            }
        }
        Ok(balances)
    }

    fn spendable_outputs(
        &self,
        addresses: &[Address],
        asset: Option<&str>,
        policy: SpendUnconfirmed,
    ) -> Result<Vec<SpendableOutput>, IndexError> {
        let wanted: BTreeSet<&Address> = addresses.iter().collect();
        let set = self.set.read().map_err(|_| IndexError::Poisoned)?;

        let mut selected: Vec<SpendableOutput> = set
            .outputs
            .iter()
            .filter(|o| wanted.contains(&o.address))
            .filter(|o| o.asset.as_deref() == asset)
            .filter(|o| o.usable(policy))
            .cloned()
            .collect();
        selected.sort_by(|a, b| b.amount.cmp(&a.amount).then_with(|| a.outpoint.cmp(&b.outpoint)));
        Ok(selected)
    }

    fn apply_spend(
        &self,
        spent: &[OutputRef],
        created: Vec<SpendableOutput>,
        defined: Option<(&str, &AssetSpec)>,
    ) -> Result<(), IndexError> {
        let spent: BTreeSet<&OutputRef> = spent.iter().collect();
        self.update(|set| {
            set.outputs.retain(|o| !spent.contains(&o.outpoint));
            set.outputs.extend(created);
            if let Some((asset, spec)) = defined {
                set.assets.insert(asset.to_string(), spec.clone());
            }
        })
    }

    fn asset_spec(&self, asset: &str) -> Result<Option<AssetSpec>, IndexError> {
        let set = self.set.read().map_err(|_| IndexError::Poisoned)?;
        Ok(set.assets.get(asset).cloned())
    }

    fn register_asset(&self, asset: &str, spec: AssetSpec) -> Result<(), IndexError> {
        self.update(|set| {
            set.assets.insert(asset.to_string(), spec);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn address() -> Address {
        "QZAB2MYRLRVUNITTOOCF5ZE3AG4TCJDD".parse().unwrap()
    }

    fn output(unit: &str, amount: u64, is_stable: bool, is_own: bool) -> SpendableOutput {
        SpendableOutput {
            outpoint: OutputRef {
                unit: unit.to_string(),
                message_index: 0,
                output_index: 0,
            },
            address: address(),
            asset: None,
            amount,
            is_stable,
            is_own,
        }
    }

    #[test]
    fn test_query_available() {
        let index = MemoryBalanceIndex::with_outputs(vec![
            output("a", 100, true, false),
            output("b", 40, false, false),
        ]);
        let balances = index.query_available(&[address()]).unwrap();
        assert_eq!(balances[BASE_ASSET], AssetBalance { stable: 100, pending: 40 });
        assert_eq!(balances[BASE_ASSET].spendable(SpendUnconfirmed::None), 100);
        assert_eq!(balances[BASE_ASSET].spendable(SpendUnconfirmed::All), 140);
    }

    #[test]
    fn test_spend_policy() {
        let index = MemoryBalanceIndex::with_outputs(vec![
            output("a", 10, true, false),
            output("b", 20, false, true),
            output("c", 30, false, false),
        ]);
        let units = |policy| -> Vec<String> {
            index
                .spendable_outputs(&[address()], None, policy)
                .unwrap()
                .into_iter()
                .map(|o| o.outpoint.unit)
                .collect()
        };
        assert_eq!(units(SpendUnconfirmed::None), vec!["a"]);
        assert_eq!(units(SpendUnconfirmed::Own), vec!["b", "a"]);
        assert_eq!(units(SpendUnconfirmed::All), vec!["c", "b", "a"]);
    }

    #[test]
    fn test_apply_spend_persists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("outputs.json");
        let index = MemoryBalanceIndex::open(&path).unwrap();
        assert!(index.is_empty());
        index.add_output(output("a", 10, true, false)).unwrap();

        let spent = [output("a", 10, true, false).outpoint];
        index.apply_spend(&spent, vec![output("b", 7, false, true)], None).unwrap();

        index
            .register_asset("uU0nuZNNPgilLlLX2n2r+sSE7+N6U4DukIj3rOLvzek=", AssetSpec::default())
            .unwrap();

        let reopened = MemoryBalanceIndex::open(&path).unwrap();
        assert_eq!(reopened.len(), 1);
        let balances = reopened.query_available(&[address()]).unwrap();
        assert_eq!(balances[BASE_ASSET].pending, 7);
        assert_eq!(
            reopened
                .asset_spec("uU0nuZNNPgilLlLX2n2r+sSE7+N6U4DukIj3rOLvzek=")
                .unwrap(),
            Some(AssetSpec::default())
        );
        assert!(reopened.asset_spec("missing").unwrap().is_none());
    }

    #[test]
    fn test_failed_write_leaves_set_untouched() {
        let dir = tempdir().unwrap();
        let data = dir.path().join("data");
        std::fs::create_dir(&data).unwrap();
        let index = MemoryBalanceIndex::open(data.join("outputs.json")).unwrap();
        index.add_output(output("a", 100, true, false)).unwrap();

        // Replace the data directory with a plain file so every write fails
        std::fs::remove_dir_all(&data).unwrap();
        std::fs::write(&data, b"not a directory").unwrap();

        let spent = [output("a", 100, true, false).outpoint];
        let asset = "uU0nuZNNPgilLlLX2n2r+sSE7+N6U4DukIj3rOLvzek=";
        let result = index.apply_spend(
            &spent,
            vec![output("b", 60, false, true)],
            Some((asset, &AssetSpec::default())),
        );
        assert!(result.is_err());

        let balances = index.query_available(&[address()]).unwrap();
        assert_eq!(balances[BASE_ASSET], AssetBalance { stable: 100, pending: 0 });
        assert!(index.asset_spec(asset).unwrap().is_none());
        assert!(index.add_output(output("c", 5, true, false)).is_err());
        assert_eq!(index.len(), 1);
    }
}
