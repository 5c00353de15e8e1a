//! Per-product ownership ledger.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::billing::PurchaseState;
use crate::ProductId;

/// Ownership of a product as seen by the reconciler.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnershipState {
    /// No purchase has been reconciled yet.
    #[default]
    Unknown,
    /// At least one granted purchase is held.
    Purchased,
    /// The last purchase was canceled.
    Canceled,
    /// Every granted purchase was refunded.
    Refunded,
}

impl OwnershipState {
    /// Whether the product is in a terminal state of its purchase cycle.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Canceled | Self::Refunded)
    }
}

impl From<PurchaseState> for OwnershipState {
    fn from(state: PurchaseState) -> Self {
        match state {
            PurchaseState::Purchased => Self::Purchased,
            PurchaseState::Canceled => Self::Canceled,
            PurchaseState::Refunded => Self::Refunded,
        }
    }
}

/// Ledger entry for one product.
///
/// Purchases are identified by their purchase time. `granted` holds the
/// purchases whose unit is currently credited; `refunded` holds every
/// purchase a refund was seen for.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Current state.
    pub state: OwnershipState,
    /// Granted purchases not refunded yet.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub granted: BTreeSet<DateTime<Utc>>,
    /// Refunded purchases.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub refunded: BTreeSet<DateTime<Utc>>,
    /// When the entry last changed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl LedgerEntry {
    /// Whether the purchase made at `purchase_time` is credited.
    pub fn is_granted(&self, purchase_time: DateTime<Utc>) -> bool {
        self.granted.contains(&purchase_time)
    }

    /// Whether a refund was seen for the purchase made at `purchase_time`.
    pub fn is_refunded(&self, purchase_time: DateTime<Utc>) -> bool {
        self.refunded.contains(&purchase_time)
    }

    /// Whether a `Purchased` record at `purchase_time` is a redelivery.
    pub fn is_known_purchase(&self, purchase_time: DateTime<Utc>) -> bool {
        self.is_granted(purchase_time) || self.is_refunded(purchase_time)
    }

    /// Number of credited purchases.
    pub fn outstanding(&self) -> usize {
        self.granted.len()
    }

    /// Purchase time of the most recent credited purchase.
    pub fn latest_grant(&self) -> Option<DateTime<Utc>> {
        self.granted.iter().next_back().copied()
    }
}

/// Serializable ownership ledger, persisted between runs.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipLedger {
    #[serde(default)]
    entries: BTreeMap<ProductId, LedgerEntry>,
}

impl OwnershipLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Entry for a product, if any.
    pub fn entry(&self, product_id: &ProductId) -> Option<&LedgerEntry> {
        self.entries.get(product_id)
    }

    /// Current state of a product.
    pub fn state(&self, product_id: &ProductId) -> OwnershipState {
        self.entries
            .get(product_id)
            .map(|e| e.state)
            .unwrap_or_default()
    }

    pub(crate) fn insert(&mut self, product_id: ProductId, entry: LedgerEntry) {
        self.entries.insert(product_id, entry);
    }

    /// All entries ordered by product id.
    pub fn iter(&self) -> impl Iterator<Item = (&ProductId, &LedgerEntry)> {
        self.entries.iter()
    }

    /// Number of tracked products.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no product is tracked.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse a persisted ledger.
    pub fn from_json(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize for persistence.
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
