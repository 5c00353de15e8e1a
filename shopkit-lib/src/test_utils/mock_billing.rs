//! Scripted billing service.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;

use super::TestSigner;
use crate::billing::{
    BillingFailure, BillingResponse, BillingResult, BillingService, BillingServiceFactory,
    Inventory, Purchase, PurchaseRecord, PurchaseState,
};
use crate::ProductId;

/// Billing service with scripted outcomes.
///
/// By default setup succeeds, the inventory is empty, and every purchase
/// flow completes with a receipt signed by [`TestSigner::shared`]. Completed
/// purchases are added to the inventory, the way the platform keeps owned
/// products.
pub struct MockBillingService {
    setup_result: Mutex<BillingResult<()>>,
    setup_delay: Mutex<Option<Duration>>,
    purchase_outcomes: Mutex<VecDeque<BillingResult<Purchase>>>,
    inventory: Mutex<Inventory>,
    inventory_failure: Mutex<Option<BillingFailure>>,
    signer: &'static TestSigner,

    setup_calls: AtomicUsize,
    purchase_calls: AtomicUsize,
    inventory_calls: AtomicUsize,
    dispose_calls: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl MockBillingService {
    /// Create a mock that signs with [`TestSigner::shared`].
    pub fn new() -> Self {
        Self::with_signer(TestSigner::shared())
    }

    /// Create a mock that signs with `signer`.
    pub fn with_signer(signer: &'static TestSigner) -> Self {
        Self {
            setup_result: Mutex::new(Ok(())),
            setup_delay: Mutex::new(None),
            purchase_outcomes: Mutex::new(VecDeque::new()),
            inventory: Mutex::new(Inventory::new()),
            inventory_failure: Mutex::new(None),
            signer,
            setup_calls: AtomicUsize::new(0),
            purchase_calls: AtomicUsize::new(0),
            inventory_calls: AtomicUsize::new(0),
            dispose_calls: AtomicUsize::new(0),
        }
    }

    /// Signer used for generated receipts.
    pub fn signer(&self) -> &'static TestSigner {
        self.signer
    }

    /// Make setup fail with `response`.
    pub fn fail_setup(&self, response: BillingResponse) {
        *lock(&self.setup_result) = Err(BillingFailure::new(response, "setup failed"));
    }

    /// Delay setup, e.g. to trigger the billing timeout.
    pub fn delay_setup(&self, delay: Duration) {
        *lock(&self.setup_delay) = Some(delay);
    }

    /// Queue the outcome of the next purchase flow.
    pub fn push_purchase_outcome(&self, outcome: BillingResult<Purchase>) {
        lock(&self.purchase_outcomes).push_back(outcome);
    }

    /// Queue a user cancellation for the next purchase flow.
    pub fn cancel_next_purchase(&self) {
        self.push_purchase_outcome(Err(BillingFailure::user_canceled()));
    }

    /// Queue a billing failure for the next purchase flow.
    pub fn fail_next_purchase(&self, response: BillingResponse) {
        self.push_purchase_outcome(Err(BillingFailure::new(response, "purchase failed")));
    }

    /// Mark a product as owned with a freshly signed receipt.
    pub fn add_owned(&self, product_id: impl Into<ProductId>, developer_payload: &str) -> Purchase {
        let record = PurchaseRecord::new(
            product_id,
            PurchaseState::Purchased,
            Utc::now(),
            developer_payload,
        );
        let purchase = self.signer.signed_purchase(record);
        self.add_owned_purchase(purchase.clone());
        purchase
    }

    /// Mark a product as owned with the given purchase.
    pub fn add_owned_purchase(&self, purchase: Purchase) {
        lock(&self.inventory).add_purchase(purchase);
    }

    /// Forget every owned product.
    pub fn clear_inventory(&self) {
        *lock(&self.inventory) = Inventory::new();
    }

    /// Make inventory queries fail with `response`.
    pub fn fail_inventory(&self, response: BillingResponse) {
        *lock(&self.inventory_failure) = Some(BillingFailure::new(response, "query failed"));
    }

    /// Snapshot of owned products.
    pub fn inventory(&self) -> Inventory {
        lock(&self.inventory).clone()
    }

    /// Number of `start_setup` calls.
    pub fn setup_calls(&self) -> usize {
        self.setup_calls.load(Ordering::SeqCst)
    }

    /// Number of `launch_purchase_flow` calls.
    pub fn purchase_calls(&self) -> usize {
        self.purchase_calls.load(Ordering::SeqCst)
    }

    /// Number of `query_inventory` calls.
    pub fn inventory_calls(&self) -> usize {
        self.inventory_calls.load(Ordering::SeqCst)
    }

    /// Number of `dispose` calls.
    pub fn dispose_calls(&self) -> usize {
        self.dispose_calls.load(Ordering::SeqCst)
    }
}

impl Default for MockBillingService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl BillingService for MockBillingService {
    async fn start_setup(&self) -> BillingResult<()> {
        self.setup_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *lock(&self.setup_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        lock(&self.setup_result).clone()
    }

    async fn launch_purchase_flow(
        &self,
        product_id: &ProductId,
        developer_payload: &str,
    ) -> BillingResult<Purchase> {
        self.purchase_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = lock(&self.purchase_outcomes).pop_front();
        let outcome = scripted.unwrap_or_else(|| {
            let record = PurchaseRecord::new(
                product_id.clone(),
                PurchaseState::Purchased,
                Utc::now(),
                developer_payload,
            );
            Ok(self.signer.signed_purchase(record))
        });
        if let Ok(purchase) = &outcome {
            if purchase.record.state == PurchaseState::Purchased {
                self.add_owned_purchase(purchase.clone());
            }
        }
        outcome
    }

    async fn query_inventory(&self) -> BillingResult<Inventory> {
        self.inventory_calls.fetch_add(1, Ordering::SeqCst);
        let failure = lock(&self.inventory_failure).clone();
        if let Some(failure) = failure {
            return Err(failure);
        }
        Ok(self.inventory())
    }

    async fn dispose(&self) {
        self.dispose_calls.fetch_add(1, Ordering::SeqCst);
    }
}

/// Factory that hands out one shared [`MockBillingService`].
pub struct MockBillingFactory {
    service: Arc<MockBillingService>,
    created: AtomicUsize,
    last_public_key: Mutex<Option<String>>,
    last_debug_logging: Mutex<Option<bool>>,
}

impl MockBillingFactory {
    /// Create a factory around `service`.
    pub fn new(service: Arc<MockBillingService>) -> Self {
        Self {
            service,
            created: AtomicUsize::new(0),
            last_public_key: Mutex::new(None),
            last_debug_logging: Mutex::new(None),
        }
    }

    /// The shared service.
    pub fn service(&self) -> Arc<MockBillingService> {
        self.service.clone()
    }

    /// Number of helpers created.
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Public key passed to the last `create`.
    pub fn last_public_key(&self) -> Option<String> {
        lock(&self.last_public_key).clone()
    }

    /// Debug flag passed to the last `create`.
    pub fn last_debug_logging(&self) -> Option<bool> {
        *lock(&self.last_debug_logging)
    }
}

impl BillingServiceFactory for MockBillingFactory {
    fn create(&self, public_key: &str, debug_logging: bool) -> Arc<dyn BillingService> {
        self.created.fetch_add(1, Ordering::SeqCst);
        *lock(&self.last_public_key) = Some(public_key.to_string());
        *lock(&self.last_debug_logging) = Some(debug_logging);
        self.service.clone()
    }
}
