//! Purchase state reconciliation.
//!
//! Each purchase moves through `Purchased -> {Refunded}` and each product
//! is `Purchased` while at least one granted purchase is held. Entering
//! `Purchased` grants one unit of the item, refunding a granted purchase
//! revokes one unit unless friendly refunds are enabled, and `Canceled`
//! changes nothing in the economy.
//!
//! Purchases are identified by their purchase time. The ledger remembers
//! every granted and every refunded purchase per product, so a redelivered
//! `Purchased` record never grants twice and each refund revokes the unit
//! of exactly the purchase it names.
//!
//! For every record that changes the ledger the reconciler publishes
//! [`StoreEvent::PurchaseCompleted`], applies the effect, then publishes
//! [`StoreEvent::ItemPurchased`]. Redelivered purchases publish nothing.
//! Product ids missing from the catalog are reported as
//! [`StoreEvent::UnexpectedError`].

mod ledger;

pub use ledger::{LedgerEntry, OwnershipLedger, OwnershipState};

use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::billing::{PurchaseRecord, PurchaseState};
use crate::catalog::{Catalog, PurchasableItem};
use crate::events::{EventBus, StoreEvent};
use crate::{Result, ShopkitError};

/// What reconciling one record did to the economy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// One unit was granted.
    Granted,
    /// The purchase had been seen before; nothing changed.
    AlreadyGranted,
    /// One unit was revoked.
    Revoked,
    /// Refund recorded; the item was kept under friendly refunds.
    RefundForgiven,
    /// Refund for a purchase that is not credited; nothing to revoke.
    RefundIgnored,
    /// Cancellation recorded; nothing changed.
    Canceled,
}

impl ReconcileOutcome {
    /// Whether the economy balance changed.
    pub fn changed_balance(&self) -> bool {
        matches!(self, Self::Granted | Self::Revoked)
    }
}

/// Applies purchase records to the economy catalog.
///
/// # Thread Safety
///
/// The ledger sits behind a mutex held across the decision and the
/// economy effect, so concurrent records for one purchase never both
/// grant. Events are published after the lock is released.
pub struct PurchaseReconciler {
    catalog: Arc<dyn Catalog>,
    events: EventBus,
    friendly_refunds: bool,
    ledger: Mutex<OwnershipLedger>,
}

impl PurchaseReconciler {
    /// Create a reconciler with an empty ledger.
    pub fn new(catalog: Arc<dyn Catalog>, events: EventBus, friendly_refunds: bool) -> Self {
        Self {
            catalog,
            events,
            friendly_refunds,
            ledger: Mutex::new(OwnershipLedger::new()),
        }
    }

    /// Whether refunds keep granted items.
    pub fn friendly_refunds(&self) -> bool {
        self.friendly_refunds
    }

    /// Replace the ledger, e.g. with one loaded from storage.
    pub fn load_ledger(&self, ledger: OwnershipLedger) {
        *self.ledger.lock().unwrap_or_else(|e| e.into_inner()) = ledger;
    }

    /// Copy of the current ledger.
    pub fn ledger(&self) -> OwnershipLedger {
        self.ledger.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Apply one purchase record.
    ///
    /// Fails with [`ShopkitError::ItemNotFound`] when the catalog has no
    /// item for the product, and with [`ShopkitError::Economy`] when the
    /// item rejects the balance change. Both are also published as
    /// unexpected-error events. A failed record leaves the ledger as it
    /// was.
    pub fn reconcile(&self, record: &PurchaseRecord) -> Result<ReconcileOutcome> {
        let item = match self.catalog.get_purchasable_item(&record.product_id) {
            Some(item) => item,
            None => {
                tracing::error!(
                    product_id = %record.product_id,
                    "no purchasable item for product id"
                );
                self.events.publish(StoreEvent::unexpected(format!(
                    "unknown product id {}",
                    record.product_id
                )));
                return Err(ShopkitError::ItemNotFound(record.product_id.clone()));
            }
        };
        let item_id = item.item_id().to_string();

        if record.state == PurchaseState::Purchased && self.is_known_purchase(record) {
            tracing::debug!(
                product_id = %record.product_id,
                purchase_time = %record.purchase_time,
                "purchase redelivered"
            );
            return Ok(ReconcileOutcome::AlreadyGranted);
        }

        self.events.publish(StoreEvent::PurchaseCompleted {
            item_id: item_id.clone(),
            developer_payload: record.developer_payload.clone(),
        });

        let applied = {
            let mut ledger = self.ledger.lock().unwrap_or_else(|e| e.into_inner());
            let mut entry = ledger.entry(&record.product_id).cloned().unwrap_or_default();
            let applied = apply_record(&mut entry, record, item.as_ref(), self.friendly_refunds);
            if applied.is_ok() {
                entry.updated_at = Some(Utc::now());
                ledger.insert(record.product_id.clone(), entry);
            }
            applied
        };
        let outcome = applied.map_err(|e| self.economy_failure(&item_id, e))?;

        tracing::debug!(
            product_id = %record.product_id,
            item_id = %item_id,
            state = %record.state,
            ?outcome,
            "purchase reconciled"
        );

        // Lost a race with a concurrent delivery of the same purchase.
        if outcome != ReconcileOutcome::AlreadyGranted {
            self.events.publish(StoreEvent::ItemPurchased { item_id });
        }
        Ok(outcome)
    }

    fn is_known_purchase(&self, record: &PurchaseRecord) -> bool {
        self.ledger
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(&record.product_id)
            .is_some_and(|entry| entry.is_known_purchase(record.purchase_time))
    }

    fn economy_failure(&self, item_id: &str, err: ShopkitError) -> ShopkitError {
        tracing::error!(item_id = %item_id, error = %err, "economy update failed");
        self.events
            .publish(StoreEvent::unexpected(format!("economy update failed for {}", item_id)));
        err
    }
}

/// Decide and apply the effect of `record` on one product's entry.
fn apply_record(
    entry: &mut LedgerEntry,
    record: &PurchaseRecord,
    item: &dyn PurchasableItem,
    friendly_refunds: bool,
) -> Result<ReconcileOutcome> {
    let time = record.purchase_time;
    let outcome = match record.state {
        PurchaseState::Purchased => {
            if entry.is_known_purchase(time) {
                ReconcileOutcome::AlreadyGranted
            } else {
                item.grant(1)?;
                entry.granted.insert(time);
                ReconcileOutcome::Granted
            }
        }
        PurchaseState::Refunded => {
            let outcome = if !entry.is_granted(time) {
                ReconcileOutcome::RefundIgnored
            } else if friendly_refunds {
                ReconcileOutcome::RefundForgiven
            } else {
                item.revoke(1)?;
                ReconcileOutcome::Revoked
            };
            entry.granted.remove(&time);
            entry.refunded.insert(time);
            outcome
        }
        PurchaseState::Canceled => ReconcileOutcome::Canceled,
    };

    // A product stays Purchased while any grant is held, so neither a
    // restore's synthetic Canceled nor one refund demotes other purchases.
    entry.state = if entry.outstanding() > 0 {
        OwnershipState::Purchased
    } else if outcome == ReconcileOutcome::AlreadyGranted {
        entry.state
    } else {
        record.state.into()
    };
    Ok(outcome)
}
