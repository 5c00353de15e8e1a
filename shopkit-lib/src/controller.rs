//! Store session controller.
//!
//! [`StoreController`] ties the pieces together: it is initialized once
//! with the app's public key and secret, opens and closes store sessions
//! around a platform billing helper, runs purchases, and feeds every
//! purchase update through receipt verification and the reconciler.
//!
//! # Locking
//!
//! One async mutex guards the session: opening, closing, billing helper
//! setup and teardown, and every reconciliation. The purchase flow itself
//! runs without the lock so a slow user does not block platform callbacks.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::billing::{
    BillingResponse, BillingResult, BillingService, BillingServiceFactory, Purchase,
    PurchaseRecord, PurchaseState,
};
use crate::catalog::Catalog;
use crate::config::StoreConfig;
use crate::events::{EventBus, StoreEvent};
use crate::metrics::StoreMetrics;
use crate::payload::{AcceptAnyPayload, PayloadVerifier};
use crate::reconcile::{OwnershipLedger, PurchaseReconciler, ReconcileOutcome};
use crate::security::{ReceiptVerifier, VerificationMode};
use crate::storage::{keys, KeyValueStore, ObscuredKeyValueStore};
use crate::{ProductId, Result, ShopkitError};

/// Public key value shipped in project templates. Purchases are refused
/// until a real key is configured.
pub const PLACEHOLDER_PUBLIC_KEY: &str = "[YOUR PUBLIC KEY FROM GOOGLE PLAY]";

/// Why a completed purchase was not applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// The receipt signature did not verify.
    Signature,
    /// The developer payload was refused.
    Payload,
}

/// Result of a purchase or purchase update.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", content = "detail", rename_all = "snake_case")]
pub enum PurchaseResult {
    /// The purchase was verified and reconciled.
    Completed(ReconcileOutcome),
    /// The user cancelled the flow.
    Cancelled,
    /// The billing service failed the flow.
    Failed(BillingResponse),
    /// The purchase completed on the platform but was not applied.
    Rejected(RejectReason),
}

impl PurchaseResult {
    /// Whether the purchase reached the economy.
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

struct Credentials {
    public_key: String,
    assets_version: u32,
    verifier: Option<ReceiptVerifier>,
    // Every flag read and write after initialization goes through here.
    store: ObscuredKeyValueStore,
}

impl Credentials {
    fn has_real_public_key(&self) -> bool {
        !self.public_key.is_empty() && self.public_key != PLACEHOLDER_PUBLIC_KEY
    }
}

#[derive(Default)]
struct Session {
    billing: Option<Arc<dyn BillingService>>,
}

/// Coordinates initialization, store sessions and purchases.
///
/// Construct one per app and share it behind an `Arc`.
pub struct StoreController {
    config: StoreConfig,
    catalog: Arc<dyn Catalog>,
    storage: Arc<dyn KeyValueStore>,
    billing_factory: Arc<dyn BillingServiceFactory>,
    events: EventBus,
    reconciler: PurchaseReconciler,
    payload_verifier: Arc<dyn PayloadVerifier>,
    metrics: Arc<StoreMetrics>,
    verification_mode: VerificationMode,
    credentials: RwLock<Option<Arc<Credentials>>>,
    session: Mutex<Session>,
    // Mirrors the session state; only written with `session` held.
    store_open: AtomicBool,
}

impl StoreController {
    /// Create an uninitialized controller.
    pub fn new(
        config: StoreConfig,
        catalog: Arc<dyn Catalog>,
        storage: Arc<dyn KeyValueStore>,
        billing_factory: Arc<dyn BillingServiceFactory>,
        events: EventBus,
    ) -> Self {
        let reconciler =
            PurchaseReconciler::new(catalog.clone(), events.clone(), config.friendly_refunds);
        let verification_mode = VerificationMode::for_test_mode(config.test_mode);
        Self {
            config,
            catalog,
            storage,
            billing_factory,
            events,
            reconciler,
            payload_verifier: Arc::new(AcceptAnyPayload),
            metrics: Arc::new(StoreMetrics::new()),
            verification_mode,
            credentials: RwLock::new(None),
            session: Mutex::new(Session::default()),
            store_open: AtomicBool::new(false),
        }
    }

    /// Use a custom developer payload check.
    pub fn with_payload_verifier(mut self, verifier: Arc<dyn PayloadVerifier>) -> Self {
        self.payload_verifier = verifier;
        self
    }

    /// Record activity into shared metrics.
    pub fn with_metrics(mut self, metrics: Arc<StoreMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    // === Accessors ===

    /// Whether `initialize` succeeded.
    pub fn is_initialized(&self) -> bool {
        self.credentials
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Whether a store session is open.
    pub fn is_store_open(&self) -> bool {
        self.store_open.load(Ordering::SeqCst)
    }

    /// Whether the store was configured for test mode.
    pub fn is_test_mode(&self) -> bool {
        self.config.test_mode
    }

    /// How receipts are checked.
    pub fn verification_mode(&self) -> VerificationMode {
        self.verification_mode
    }

    /// Activity counters.
    pub fn metrics(&self) -> Arc<StoreMetrics> {
        self.metrics.clone()
    }

    /// Event bus the controller publishes to.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Active configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Economy catalog.
    pub fn catalog(&self) -> &Arc<dyn Catalog> {
        &self.catalog
    }

    /// Copy of the ownership ledger.
    pub fn ledger(&self) -> OwnershipLedger {
        self.reconciler.ledger()
    }

    /// Assets version given at initialization.
    pub fn assets_version(&self) -> Option<u32> {
        self.credentials
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|c| c.assets_version)
    }

    // === Lifecycle ===

    /// Initialize the controller.
    ///
    /// The custom secret is required on every run: it keys the obscured
    /// storage and is never persisted. A missing public key falls back to
    /// the one stored by an earlier run. Fails with
    /// [`ShopkitError::MissingCustomSecret`],
    /// [`ShopkitError::SecretMismatch`] when the secret differs from the
    /// one the stored values were written with, or
    /// [`ShopkitError::MissingPublicKey`], and leaves the controller
    /// uninitialized on any failure.
    #[tracing::instrument(skip(self, public_key, custom_secret))]
    pub async fn initialize(
        &self,
        public_key: Option<&str>,
        custom_secret: Option<&str>,
        assets_version: u32,
    ) -> Result<()> {
        let _session = self.session.lock().await;
        if self.is_initialized() {
            tracing::warn!("store controller is already initialized");
            return Err(ShopkitError::AlreadyInitialized);
        }
        self.config.validate()?;

        // Stored values only open with the secret, so it is checked first.
        let custom_secret = non_empty(custom_secret).ok_or_else(|| {
            tracing::error!("no custom secret given, can't initialize store");
            ShopkitError::MissingCustomSecret
        })?;
        let store = ObscuredKeyValueStore::new(self.storage.clone(), custom_secret)?;
        let secret_known = store.check_secret().await?;

        let public_key = match non_empty(public_key) {
            Some(key) => Some(key.to_string()),
            None => store
                .get_string(keys::PUBLIC_KEY)
                .await?
                .filter(|v| !v.trim().is_empty()),
        }
        .ok_or_else(|| {
            tracing::error!("no public key given and none stored, can't initialize store");
            ShopkitError::MissingPublicKey
        })?;

        let verifier = if public_key == PLACEHOLDER_PUBLIC_KEY {
            tracing::warn!("placeholder public key configured, purchases are disabled");
            None
        } else {
            Some(ReceiptVerifier::from_base64(&public_key)?.with_mode(self.verification_mode))
        };

        if !secret_known {
            store.remember_secret().await?;
        }
        store.set_string(keys::PUBLIC_KEY, &public_key).await?;
        store
            .set_string(keys::ASSETS_VERSION, &assets_version.to_string())
            .await?;

        self.reconciler.load_ledger(load_ledger(&store).await);

        *self.credentials.write().unwrap_or_else(|e| e.into_inner()) = Some(Arc::new(Credentials {
            public_key,
            assets_version,
            verifier,
            store,
        }));

        tracing::info!(test_mode = self.config.test_mode, "store controller initialized");
        Ok(())
    }

    /// Open a store session.
    ///
    /// Creates a billing helper and starts setup. When billing is
    /// supported, owned purchases are restored right away. A failed setup
    /// still opens the session, without billing.
    #[tracing::instrument(skip(self))]
    pub async fn store_opening(&self) -> Result<()> {
        let credentials = self.credentials()?;
        let mut session = self.session.lock().await;
        if self.is_store_open() {
            return Err(ShopkitError::StoreAlreadyOpen);
        }

        let billing = self
            .billing_factory
            .create(&credentials.public_key, self.config.test_mode);

        let supported = match self.bounded("start_setup", billing.start_setup()).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "billing setup failed");
                billing.dispose().await;
                false
            }
        };
        self.publish_billing_supported(supported);

        if supported {
            session.billing = Some(billing.clone());
        }
        self.store_open.store(true, Ordering::SeqCst);
        self.events.publish(StoreEvent::OpeningStore);
        tracing::debug!(billing_supported = supported, "store opened");

        if supported {
            self.events.publish(StoreEvent::RestoreTransactionsStarted);
            self.restore_from(billing.as_ref(), &credentials).await;
        }
        Ok(())
    }

    /// Close the store session and dispose its billing helper.
    ///
    /// Closing a closed store does nothing.
    #[tracing::instrument(skip(self))]
    pub async fn store_closing(&self) -> Result<()> {
        self.credentials()?;
        let mut session = self.session.lock().await;
        if !self.is_store_open() {
            tracing::debug!("store already closed");
            return Ok(());
        }

        self.store_open.store(false, Ordering::SeqCst);
        self.events.publish(StoreEvent::ClosingStore);
        if let Some(billing) = session.billing.take() {
            billing.dispose().await;
        }
        Ok(())
    }

    // === Purchases ===

    /// Buy a product.
    ///
    /// Resolves when the platform purchase flow has finished. Precondition
    /// failures are errors; platform outcomes are reported through
    /// [`PurchaseResult`] and events.
    #[tracing::instrument(skip(self, developer_payload), fields(product_id = %product_id))]
    pub async fn buy(&self, product_id: &ProductId, developer_payload: &str) -> Result<PurchaseResult> {
        let credentials = self.credentials()?;
        if !credentials.has_real_public_key() {
            tracing::error!("no real public key configured, can't start a purchase");
            return Err(ShopkitError::MissingPublicKey);
        }

        let billing = {
            let session = self.session.lock().await;
            if !self.is_store_open() {
                return Err(ShopkitError::StoreNotOpen);
            }
            session.billing.clone().ok_or_else(|| {
                ShopkitError::BillingUnavailable("billing is not supported in this session".into())
            })?
        };

        let item_id = self.item_id(product_id);
        match &item_id {
            Some(item_id) => self.events.publish(StoreEvent::PurchaseStarted {
                product_id: product_id.clone(),
                item_id: item_id.clone(),
            }),
            None => tracing::error!("no purchasable item for product id, continuing anyway"),
        }
        self.metrics.record_purchase_started();

        let purchase = match billing
            .launch_purchase_flow(product_id, developer_payload)
            .await
        {
            Ok(purchase) => purchase,
            Err(failure) if failure.response == BillingResponse::UserCanceled => {
                tracing::debug!("purchase cancelled by user");
                self.metrics.record_purchase_cancelled();
                match item_id {
                    Some(item_id) => self.events.publish(StoreEvent::PurchaseCancelled { item_id }),
                    None => self.unexpected(format!("cancelled unknown product {}", product_id)),
                }
                return Ok(PurchaseResult::Cancelled);
            }
            Err(failure) => {
                tracing::error!(error = %failure, "purchase flow failed");
                self.metrics.record_purchase_failed();
                self.unexpected(format!("purchase of {} failed: {}", product_id, failure));
                return Ok(PurchaseResult::Failed(failure.response));
            }
        };

        if purchase.product_id() != product_id {
            tracing::warn!(
                received = %purchase.product_id(),
                "platform returned a purchase for a different product"
            );
        }

        let result = self.process_purchase(&purchase, &credentials).await?;
        if result.is_completed() {
            self.metrics.record_purchase_completed();
        }
        Ok(result)
    }

    /// Handle a purchase update delivered by the platform outside `buy`.
    ///
    /// The receipt goes through the same checks as a bought purchase.
    #[tracing::instrument(skip(self, purchase), fields(product_id = %purchase.product_id()))]
    pub async fn handle_purchase_update(&self, purchase: &Purchase) -> Result<PurchaseResult> {
        let credentials = self.credentials()?;
        self.process_purchase(purchase, &credentials).await
    }

    /// Reconcile a record whose receipt was already verified.
    #[tracing::instrument(skip(self, record), fields(product_id = %record.product_id, state = %record.state))]
    pub async fn handle_purchase_state_change(
        &self,
        record: &PurchaseRecord,
    ) -> Result<ReconcileOutcome> {
        let credentials = self.credentials()?;
        let _session = self.session.lock().await;
        self.apply(record, &credentials).await
    }

    // === Restore ===

    /// Restore owned purchases from the platform.
    ///
    /// Uses the open session's billing helper, or a temporary one that is
    /// disposed afterwards. Returns whether the restore succeeded.
    #[tracing::instrument(skip(self))]
    pub async fn restore_transactions(&self) -> Result<bool> {
        let credentials = self.credentials()?;
        self.events.publish(StoreEvent::RestoreTransactionsStarted);

        let session = self.session.lock().await;
        if let Some(billing) = session.billing.clone() {
            return Ok(self.restore_from(billing.as_ref(), &credentials).await);
        }

        let billing = self
            .billing_factory
            .create(&credentials.public_key, self.config.test_mode);
        let success = match self.bounded("start_setup", billing.start_setup()).await {
            Ok(()) => self.restore_from(billing.as_ref(), &credentials).await,
            Err(e) => {
                tracing::warn!(error = %e, "billing setup for restore failed");
                self.finish_restore(false);
                false
            }
        };
        billing.dispose().await;
        drop(session);
        Ok(success)
    }

    /// Whether transactions were restored at least once.
    pub async fn transactions_already_restored(&self) -> Result<bool> {
        let credentials = self.credentials()?;
        credentials.store.get_bool(keys::RESTORED).await
    }

    /// Relay a billing availability notification.
    pub fn on_billing_supported(&self, supported: bool) -> Result<()> {
        self.credentials()?;
        self.publish_billing_supported(supported);
        Ok(())
    }

    // === Internals ===

    fn credentials(&self) -> Result<Arc<Credentials>> {
        self.credentials
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or(ShopkitError::NotInitialized)
    }

    async fn persist_ledger(&self, store: &ObscuredKeyValueStore) -> Result<()> {
        let json = self.reconciler.ledger().to_json()?;
        store.set_string(keys::PURCHASE_LEDGER, &json).await
    }

    async fn bounded<T>(
        &self,
        operation: &str,
        call: impl Future<Output = BillingResult<T>>,
    ) -> Result<T> {
        let timeout = self.config.billing_timeout();
        match tokio::time::timeout(timeout, call).await {
            Ok(result) => result.map_err(ShopkitError::from),
            Err(_) => Err(ShopkitError::Timeout {
                operation: operation.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }

    fn item_id(&self, product_id: &ProductId) -> Option<String> {
        self.catalog
            .get_purchasable_item(product_id)
            .map(|item| item.item_id().to_string())
    }

    fn publish_billing_supported(&self, supported: bool) {
        if supported {
            self.events.publish(StoreEvent::BillingSupported);
        } else {
            self.events.publish(StoreEvent::BillingNotSupported);
        }
    }

    fn unexpected(&self, reason: String) {
        self.metrics.record_unexpected_error();
        self.events.publish(StoreEvent::unexpected(reason));
    }

    fn verify_receipt(&self, purchase: &Purchase, credentials: &Credentials) -> bool {
        if self.verification_mode.is_bypass() {
            return true;
        }
        match &credentials.verifier {
            Some(verifier) => verifier.verify_purchase(purchase),
            None => {
                tracing::warn!("no verification key configured, rejecting receipt");
                false
            }
        }
    }

    async fn process_purchase(
        &self,
        purchase: &Purchase,
        credentials: &Credentials,
    ) -> Result<PurchaseResult> {
        if !self.verify_receipt(purchase, credentials) {
            self.metrics.record_verification_failure();
            self.metrics.record_purchase_rejected();
            self.unexpected(format!(
                "receipt verification failed for {}",
                purchase.product_id()
            ));
            return Ok(PurchaseResult::Rejected(RejectReason::Signature));
        }

        if !self.payload_verifier.verify_payload(&purchase.record) {
            tracing::warn!(product_id = %purchase.product_id(), "developer payload refused");
            self.metrics.record_purchase_rejected();
            self.unexpected(format!(
                "developer payload refused for {}",
                purchase.product_id()
            ));
            return Ok(PurchaseResult::Rejected(RejectReason::Payload));
        }

        let _session = self.session.lock().await;
        let outcome = self.apply(&purchase.record, credentials).await?;
        Ok(PurchaseResult::Completed(outcome))
    }

    /// Reconcile a record and persist the ledger. Caller holds the session lock.
    ///
    /// The economy has already changed when persisting fails, so the
    /// failure is logged and the outcome still returned. The next
    /// successful write stores the whole ledger.
    async fn apply(
        &self,
        record: &PurchaseRecord,
        credentials: &Credentials,
    ) -> Result<ReconcileOutcome> {
        let outcome = match self.reconciler.reconcile(record) {
            Ok(outcome) => outcome,
            Err(e) => {
                self.metrics.record_unexpected_error();
                return Err(e);
            }
        };

        match outcome {
            ReconcileOutcome::Granted => self.metrics.record_grant(),
            ReconcileOutcome::Revoked => self.metrics.record_revoke(),
            ReconcileOutcome::RefundForgiven => self.metrics.record_refund_forgiven(),
            _ => {}
        }

        if let Err(e) = self.persist_ledger(&credentials.store).await {
            tracing::error!(
                product_id = %record.product_id,
                ?outcome,
                error = %e,
                "failed to persist purchase ledger"
            );
            self.metrics.record_unexpected_error();
        }
        Ok(outcome)
    }

    fn accept_restored(&self, purchase: &Purchase, credentials: &Credentials) -> bool {
        if self.config.verify_signatures_on_restore && !self.verify_receipt(purchase, credentials) {
            self.metrics.record_verification_failure();
            return false;
        }
        self.payload_verifier.verify_payload(&purchase.record)
    }

    /// Query inventory and reconcile every market product. Caller holds the
    /// session lock.
    async fn restore_from(&self, billing: &dyn BillingService, credentials: &Credentials) -> bool {
        let inventory = match self.bounded("query_inventory", billing.query_inventory()).await {
            Ok(inventory) => inventory,
            Err(e) => {
                tracing::error!(error = %e, "inventory query failed");
                self.finish_restore(false);
                return false;
            }
        };

        let mut success = true;
        for product_id in self.catalog.market_product_ids() {
            let record = match inventory.get_purchase(&product_id) {
                Some(purchase) if self.accept_restored(purchase, credentials) => PurchaseRecord {
                    state: PurchaseState::Purchased,
                    ..purchase.record.clone()
                },
                _ => PurchaseRecord::new(product_id.clone(), PurchaseState::Canceled, Utc::now(), ""),
            };
            if let Err(e) = self.apply(&record, credentials).await {
                tracing::error!(product_id = %product_id, error = %e, "restore of product failed");
                success = false;
            }
        }

        if let Err(e) = credentials.store.set_bool(keys::RESTORED, true).await {
            tracing::error!(error = %e, "failed to persist restored flag");
            success = false;
        }

        self.finish_restore(success);
        success
    }

    fn finish_restore(&self, success: bool) {
        self.metrics.record_restore(success);
        self.events
            .publish(StoreEvent::RestoreTransactions { success });
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

async fn load_ledger(store: &ObscuredKeyValueStore) -> OwnershipLedger {
    let json = match store.get_string(keys::PURCHASE_LEDGER).await {
        Ok(Some(json)) => json,
        Ok(None) => return OwnershipLedger::new(),
        Err(e) => {
            tracing::warn!(error = %e, "stored purchase ledger is unreadable, starting empty");
            return OwnershipLedger::new();
        }
    };
    OwnershipLedger::from_json(&json).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "stored purchase ledger is unreadable, starting empty");
        OwnershipLedger::new()
    })
}
