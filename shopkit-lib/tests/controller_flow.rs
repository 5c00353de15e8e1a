//! End-to-end store flows against the scripted billing service.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use shopkit_lib::events::EventRecorder;
use shopkit_lib::prelude::*;
use shopkit_lib::storage::{keys, ObscuredKeyValueStore};
use shopkit_lib::test_utils::{
    purchase_record, sample_catalog, MockBillingFactory, MockBillingService, TestFixtures,
    TestSigner,
};

struct Harness {
    controller: Arc<StoreController>,
    billing: Arc<MockBillingService>,
    factory: Arc<MockBillingFactory>,
    catalog: Arc<InMemoryCatalog>,
    storage: Arc<InMemoryKeyValueStore>,
    recorder: EventRecorder,
}

impl Harness {
    fn new(config: StoreConfig) -> Self {
        Self::with_storage(config, Arc::new(InMemoryKeyValueStore::new()))
    }

    fn with_storage(config: StoreConfig, storage: Arc<InMemoryKeyValueStore>) -> Self {
        let billing = Arc::new(MockBillingService::new());
        let factory = Arc::new(MockBillingFactory::new(billing.clone()));
        let catalog = Arc::new(sample_catalog());
        let events = EventBus::new();
        let recorder = EventRecorder::attach(&events);
        let controller = Arc::new(StoreController::new(
            config,
            catalog.clone(),
            storage.clone(),
            factory.clone(),
            events,
        ));
        Self {
            controller,
            billing,
            factory,
            catalog,
            storage,
            recorder,
        }
    }

    async fn open(config: StoreConfig) -> Self {
        let harness = Self::new(config);
        harness.initialize().await.unwrap();
        harness.controller.store_opening().await.unwrap();
        harness.recorder.clear();
        harness
    }

    async fn initialize(&self) -> Result<()> {
        self.controller
            .initialize(
                Some(TestSigner::shared().public_key_base64()),
                Some(TestFixtures::CUSTOM_SECRET),
                1,
            )
            .await
    }

    fn balance(&self, product: &str) -> u64 {
        self.catalog
            .item(&ProductId::from(product))
            .map(|item| item.balance())
            .unwrap_or(0)
    }
}

// === Initialization ===

#[tokio::test]
async fn test_initialize_requires_key_and_secret() {
    let harness = Harness::new(StoreConfig::default());

    let err = harness
        .controller
        .initialize(None, Some("secret"), 1)
        .await
        .unwrap_err();
    assert!(matches!(err, ShopkitError::MissingPublicKey));
    assert!(!harness.controller.is_initialized());

    let err = harness
        .controller
        .initialize(Some(TestSigner::shared().public_key_base64()), Some(""), 1)
        .await
        .unwrap_err();
    assert!(matches!(err, ShopkitError::MissingCustomSecret));
    assert!(!harness.controller.is_initialized());
}

#[tokio::test]
async fn test_initialize_rejects_malformed_key() {
    let harness = Harness::new(StoreConfig::default());
    let err = harness
        .controller
        .initialize(Some("not-a-key"), Some("secret"), 1)
        .await
        .unwrap_err();

    assert_eq!(err.code(), ShopkitErrorCode::MalformedPublicKey);
    assert!(!harness.controller.is_initialized());
    assert!(harness
        .storage
        .get_string(keys::PUBLIC_KEY)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_initialize_falls_back_to_stored_public_key() {
    let storage = Arc::new(InMemoryKeyValueStore::new());
    let first = Harness::with_storage(StoreConfig::default(), storage.clone());
    first.initialize().await.unwrap();

    let second = Harness::with_storage(StoreConfig::default(), storage);
    second
        .controller
        .initialize(None, Some(TestFixtures::CUSTOM_SECRET), 2)
        .await
        .unwrap();

    assert!(second.controller.is_initialized());
    assert_eq!(second.controller.assets_version(), Some(2));
    second.controller.store_opening().await.unwrap();
    assert_eq!(
        second.factory.last_public_key().as_deref(),
        Some(TestSigner::shared().public_key_base64())
    );
}

#[tokio::test]
async fn test_initialize_requires_secret_every_run() {
    let storage = Arc::new(InMemoryKeyValueStore::new());
    let first = Harness::with_storage(StoreConfig::default(), storage.clone());
    first.initialize().await.unwrap();

    let second = Harness::with_storage(StoreConfig::default(), storage);
    let err = second.controller.initialize(None, None, 2).await.unwrap_err();
    assert!(matches!(err, ShopkitError::MissingCustomSecret));
    assert!(!second.controller.is_initialized());
}

#[tokio::test]
async fn test_initialize_rejects_other_secret() {
    let storage = Arc::new(InMemoryKeyValueStore::new());
    let first = Harness::with_storage(StoreConfig::default(), storage.clone());
    first.initialize().await.unwrap();

    let second = Harness::with_storage(StoreConfig::default(), storage);
    let err = second
        .controller
        .initialize(
            Some(TestSigner::shared().public_key_base64()),
            Some("another-secret"),
            1,
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), ShopkitErrorCode::SecretMismatch);
    assert!(!second.controller.is_initialized());
}

#[tokio::test]
async fn test_stored_flags_are_obscured() {
    let harness = Harness::open(StoreConfig::default()).await;
    harness
        .controller
        .handle_purchase_state_change(&purchase_record(
            TestFixtures::NO_ADS_PRODUCT,
            PurchaseState::Purchased,
            Utc::now(),
        ))
        .await
        .unwrap();

    let raw_ledger = harness
        .storage
        .get_string(keys::PURCHASE_LEDGER)
        .await
        .unwrap()
        .unwrap();
    assert!(!raw_ledger.contains(TestFixtures::NO_ADS_PRODUCT));
    let raw_restored = harness.storage.get_string(keys::RESTORED).await.unwrap().unwrap();
    assert_ne!(raw_restored, "true");
    assert!(harness.controller.transactions_already_restored().await.unwrap());

    let obscured = ObscuredKeyValueStore::new(harness.storage.clone(), TestFixtures::CUSTOM_SECRET)
        .unwrap();
    let ledger = obscured.get_string(keys::PURCHASE_LEDGER).await.unwrap().unwrap();
    assert!(ledger.contains(TestFixtures::NO_ADS_PRODUCT));
}

#[tokio::test]
async fn test_initialize_twice_fails() {
    let harness = Harness::new(StoreConfig::default());
    harness.initialize().await.unwrap();
    assert!(matches!(
        harness.initialize().await,
        Err(ShopkitError::AlreadyInitialized)
    ));
}

// === Session ===

#[tokio::test]
async fn test_buy_requires_open_store() {
    let harness = Harness::new(StoreConfig::default());
    harness.initialize().await.unwrap();

    let err = harness
        .controller
        .buy(&TestFixtures::COINS_PRODUCT.into(), "")
        .await
        .unwrap_err();
    assert!(matches!(err, ShopkitError::StoreNotOpen));
    assert_eq!(harness.billing.purchase_calls(), 0);
}

#[tokio::test]
async fn test_open_close_lifecycle() {
    let harness = Harness::new(StoreConfig::default().with_test_mode(true));
    harness.initialize().await.unwrap();

    harness.controller.store_opening().await.unwrap();
    assert!(harness.controller.is_store_open());
    assert_eq!(
        harness.factory.last_public_key().as_deref(),
        Some(TestSigner::shared().public_key_base64())
    );
    assert_eq!(harness.factory.last_debug_logging(), Some(true));
    assert!(matches!(
        harness.controller.store_opening().await,
        Err(ShopkitError::StoreAlreadyOpen)
    ));

    harness.controller.store_closing().await.unwrap();
    assert!(!harness.controller.is_store_open());
    assert_eq!(harness.billing.dispose_calls(), 1);
    assert!(harness.recorder.names().contains(&"closing_store"));

    // closing twice is a no-op
    harness.controller.store_closing().await.unwrap();
    assert_eq!(harness.billing.dispose_calls(), 1);
}

#[tokio::test]
async fn test_failed_setup_opens_without_billing() {
    let harness = Harness::new(StoreConfig::default());
    harness.initialize().await.unwrap();
    harness.billing.fail_setup(BillingResponse::BillingUnavailable);

    harness.controller.store_opening().await.unwrap();

    assert!(harness.controller.is_store_open());
    assert_eq!(
        harness.recorder.names(),
        vec!["billing_not_supported", "opening_store"]
    );
    assert_eq!(harness.billing.inventory_calls(), 0);

    let err = harness
        .controller
        .buy(&TestFixtures::COINS_PRODUCT.into(), "")
        .await
        .unwrap_err();
    assert_eq!(err.code(), ShopkitErrorCode::BillingUnavailable);
}

#[tokio::test(start_paused = true)]
async fn test_setup_timeout_is_billing_not_supported() {
    let harness = Harness::new(StoreConfig::default().with_billing_timeout(1));
    harness.initialize().await.unwrap();
    harness.billing.delay_setup(Duration::from_secs(5));

    harness.controller.store_opening().await.unwrap();

    assert!(harness.recorder.names().contains(&"billing_not_supported"));
    assert_eq!(harness.billing.dispose_calls(), 1);
}

// === Purchases ===

#[tokio::test]
async fn test_buy_grants_item() {
    let harness = Harness::open(StoreConfig::default()).await;

    let result = harness
        .controller
        .buy(&TestFixtures::COINS_PRODUCT.into(), "order-1")
        .await
        .unwrap();

    assert_eq!(result, PurchaseResult::Completed(ReconcileOutcome::Granted));
    assert_eq!(harness.balance(TestFixtures::COINS_PRODUCT), 1);
    assert_eq!(
        harness.recorder.events(),
        vec![
            StoreEvent::PurchaseStarted {
                product_id: TestFixtures::COINS_PRODUCT.into(),
                item_id: "gold".into(),
            },
            StoreEvent::PurchaseCompleted {
                item_id: "gold".into(),
                developer_payload: "order-1".into(),
            },
            StoreEvent::ItemPurchased {
                item_id: "gold".into()
            },
        ]
    );

    let snapshot = harness.controller.metrics().snapshot();
    assert_eq!(snapshot.purchases_started, 1);
    assert_eq!(snapshot.purchases_completed, 1);
    assert_eq!(snapshot.grants, 1);
}

#[tokio::test]
async fn test_duplicate_purchase_update_does_not_double_grant() {
    let harness = Harness::open(StoreConfig::default()).await;
    let purchase = TestSigner::shared().signed_purchase(purchase_record(
        TestFixtures::NO_ADS_PRODUCT,
        PurchaseState::Purchased,
        Utc::now(),
    ));

    let first = harness.controller.handle_purchase_update(&purchase).await.unwrap();
    let second = harness.controller.handle_purchase_update(&purchase).await.unwrap();

    assert_eq!(first, PurchaseResult::Completed(ReconcileOutcome::Granted));
    assert_eq!(
        second,
        PurchaseResult::Completed(ReconcileOutcome::AlreadyGranted)
    );
    assert_eq!(harness.balance(TestFixtures::NO_ADS_PRODUCT), 1);
    assert_eq!(harness.controller.metrics().snapshot().grants, 1);
}

#[tokio::test]
async fn test_consumable_can_be_bought_repeatedly() {
    let harness = Harness::open(StoreConfig::default()).await;
    let product: ProductId = TestFixtures::COINS_PRODUCT.into();

    harness.controller.buy(&product, "a").await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    harness.controller.buy(&product, "b").await.unwrap();

    assert_eq!(harness.balance(TestFixtures::COINS_PRODUCT), 2);
}

#[tokio::test]
async fn test_refund_revokes_without_friendly_refunds() {
    let harness = Harness::open(StoreConfig::default()).await;
    let now = Utc::now();
    let signer = TestSigner::shared();

    harness
        .controller
        .handle_purchase_update(&signer.signed_purchase(purchase_record(
            TestFixtures::SWORD_PRODUCT,
            PurchaseState::Purchased,
            now,
        )))
        .await
        .unwrap();
    let refund = signer.signed_purchase(purchase_record(
        TestFixtures::SWORD_PRODUCT,
        PurchaseState::Refunded,
        now,
    ));
    let result = harness.controller.handle_purchase_update(&refund).await.unwrap();

    assert_eq!(result, PurchaseResult::Completed(ReconcileOutcome::Revoked));
    assert_eq!(harness.balance(TestFixtures::SWORD_PRODUCT), 0);
    assert_eq!(harness.controller.metrics().snapshot().revokes, 1);
}

#[tokio::test]
async fn test_refund_keeps_item_with_friendly_refunds() {
    let harness = Harness::open(StoreConfig::default().with_friendly_refunds(true)).await;
    let now = Utc::now();

    harness
        .controller
        .handle_purchase_state_change(&purchase_record(
            TestFixtures::SWORD_PRODUCT,
            PurchaseState::Purchased,
            now,
        ))
        .await
        .unwrap();
    let outcome = harness
        .controller
        .handle_purchase_state_change(&purchase_record(
            TestFixtures::SWORD_PRODUCT,
            PurchaseState::Refunded,
            now,
        ))
        .await
        .unwrap();

    assert_eq!(outcome, ReconcileOutcome::RefundForgiven);
    assert_eq!(harness.balance(TestFixtures::SWORD_PRODUCT), 1);
}

#[tokio::test]
async fn test_user_cancel_publishes_cancelled() {
    let harness = Harness::open(StoreConfig::default()).await;
    harness.billing.cancel_next_purchase();

    let result = harness
        .controller
        .buy(&TestFixtures::SWORD_PRODUCT.into(), "")
        .await
        .unwrap();

    assert_eq!(result, PurchaseResult::Cancelled);
    assert_eq!(
        harness.recorder.names(),
        vec!["purchase_started", "purchase_cancelled"]
    );
    assert_eq!(harness.balance(TestFixtures::SWORD_PRODUCT), 0);
}

#[tokio::test]
async fn test_billing_failure_publishes_unexpected_error() {
    let harness = Harness::open(StoreConfig::default()).await;
    harness.billing.fail_next_purchase(BillingResponse::ItemUnavailable);

    let result = harness
        .controller
        .buy(&TestFixtures::SWORD_PRODUCT.into(), "")
        .await
        .unwrap();

    assert_eq!(result, PurchaseResult::Failed(BillingResponse::ItemUnavailable));
    assert!(harness.recorder.names().contains(&"unexpected_error"));
    assert_eq!(harness.controller.metrics().snapshot().purchases_failed, 1);
}

#[tokio::test]
async fn test_forged_receipt_is_rejected() {
    let harness = Harness::open(StoreConfig::default()).await;
    let forged = TestSigner::other().signed_purchase(purchase_record(
        TestFixtures::NO_ADS_PRODUCT,
        PurchaseState::Purchased,
        Utc::now(),
    ));
    harness.billing.push_purchase_outcome(Ok(forged));

    let result = harness
        .controller
        .buy(&TestFixtures::NO_ADS_PRODUCT.into(), "")
        .await
        .unwrap();

    assert_eq!(result, PurchaseResult::Rejected(RejectReason::Signature));
    assert_eq!(harness.balance(TestFixtures::NO_ADS_PRODUCT), 0);
    assert!(harness.recorder.names().contains(&"unexpected_error"));
    assert_eq!(
        harness.controller.metrics().snapshot().verification_failures,
        1
    );
}

#[tokio::test]
async fn test_payload_verifier_can_reject() {
    let harness = Harness::new(StoreConfig::default());
    let billing = harness.billing.clone();
    let events = EventBus::new();
    let recorder = EventRecorder::attach(&events);
    let controller = StoreController::new(
        StoreConfig::default(),
        harness.catalog.clone(),
        Arc::new(InMemoryKeyValueStore::new()),
        harness.factory.clone(),
        events,
    )
    .with_payload_verifier(Arc::new(|record: &PurchaseRecord| {
        record.developer_payload.starts_with("order-")
    }));
    controller
        .initialize(Some(TestSigner::shared().public_key_base64()), Some("s"), 1)
        .await
        .unwrap();
    controller.store_opening().await.unwrap();

    let rejected = controller
        .buy(&TestFixtures::SWORD_PRODUCT.into(), "forged")
        .await
        .unwrap();
    let accepted = controller
        .buy(&TestFixtures::SWORD_PRODUCT.into(), "order-9")
        .await
        .unwrap();

    assert_eq!(rejected, PurchaseResult::Rejected(RejectReason::Payload));
    assert!(accepted.is_completed());
    assert_eq!(billing.purchase_calls(), 2);
    assert!(recorder.names().contains(&"unexpected_error"));
}

#[tokio::test]
async fn test_unknown_product_is_unexpected_error() {
    let harness = Harness::open(StoreConfig::default()).await;

    let err = harness
        .controller
        .buy(&TestFixtures::UNKNOWN_PRODUCT.into(), "")
        .await
        .unwrap_err();

    assert!(matches!(err, ShopkitError::ItemNotFound(_)));
    assert_eq!(harness.recorder.names(), vec!["unexpected_error"]);
    assert_eq!(harness.billing.purchase_calls(), 1);
}

// === Restore ===

#[tokio::test]
async fn test_restore_reconciles_owned_products() {
    let harness = Harness::new(StoreConfig::default());
    harness.initialize().await.unwrap();
    harness.billing.add_owned(TestFixtures::NO_ADS_PRODUCT, "dev");

    assert!(!harness.controller.transactions_already_restored().await.unwrap());
    assert!(harness.controller.restore_transactions().await.unwrap());

    assert_eq!(harness.balance(TestFixtures::NO_ADS_PRODUCT), 1);
    assert_eq!(harness.balance(TestFixtures::COINS_PRODUCT), 0);
    assert!(harness.controller.transactions_already_restored().await.unwrap());
    assert_eq!(
        harness.controller.ledger().state(&TestFixtures::COINS_PRODUCT.into()),
        OwnershipState::Canceled
    );
    // closed store: temporary helper disposed
    assert_eq!(harness.billing.dispose_calls(), 1);

    let names = harness.recorder.names();
    assert_eq!(names.first(), Some(&"restore_transactions_started"));
    assert_eq!(
        harness.recorder.events().last(),
        Some(&StoreEvent::RestoreTransactions { success: true })
    );

    // restoring again does not grant twice
    assert!(harness.controller.restore_transactions().await.unwrap());
    assert_eq!(harness.balance(TestFixtures::NO_ADS_PRODUCT), 1);
}

#[tokio::test]
async fn test_refund_after_restore_still_revokes() {
    let harness = Harness::open(StoreConfig::default()).await;
    let bought = Utc::now();
    let signer = TestSigner::shared();

    harness
        .controller
        .handle_purchase_update(&signer.signed_purchase(purchase_record(
            TestFixtures::NO_ADS_PRODUCT,
            PurchaseState::Purchased,
            bought,
        )))
        .await
        .unwrap();

    // The platform no longer lists the product, so restore reports it as
    // canceled.
    harness.billing.clear_inventory();
    assert!(harness.controller.restore_transactions().await.unwrap());
    assert_eq!(
        harness.controller.ledger().state(&TestFixtures::NO_ADS_PRODUCT.into()),
        OwnershipState::Purchased
    );

    let result = harness
        .controller
        .handle_purchase_update(&signer.signed_purchase(purchase_record(
            TestFixtures::NO_ADS_PRODUCT,
            PurchaseState::Refunded,
            bought,
        )))
        .await
        .unwrap();

    assert_eq!(result, PurchaseResult::Completed(ReconcileOutcome::Revoked));
    assert_eq!(harness.balance(TestFixtures::NO_ADS_PRODUCT), 0);
}

#[tokio::test]
async fn test_restore_skips_unverified_receipts() {
    let harness = Harness::new(StoreConfig::default());
    harness.initialize().await.unwrap();
    harness.billing.add_owned_purchase(TestSigner::other().signed_purchase(purchase_record(
        TestFixtures::NO_ADS_PRODUCT,
        PurchaseState::Purchased,
        Utc::now(),
    )));

    assert!(harness.controller.restore_transactions().await.unwrap());
    assert_eq!(harness.balance(TestFixtures::NO_ADS_PRODUCT), 0);
}

#[tokio::test]
async fn test_restore_failure_reports_false() {
    let harness = Harness::open(StoreConfig::default()).await;
    harness.billing.fail_inventory(BillingResponse::ServiceUnavailable);

    assert!(!harness.controller.restore_transactions().await.unwrap());
    assert_eq!(
        harness.recorder.events().last(),
        Some(&StoreEvent::RestoreTransactions { success: false })
    );
    assert_eq!(harness.controller.metrics().snapshot().restores_failed, 1);
}

#[tokio::test]
async fn test_ledger_survives_restart() {
    let storage = Arc::new(InMemoryKeyValueStore::new());
    let purchase = TestSigner::shared().signed_purchase(purchase_record(
        TestFixtures::NO_ADS_PRODUCT,
        PurchaseState::Purchased,
        Utc::now(),
    ));

    let first = Harness::with_storage(StoreConfig::default(), storage.clone());
    first.initialize().await.unwrap();
    first.controller.handle_purchase_update(&purchase).await.unwrap();

    let second = Harness::with_storage(StoreConfig::default(), storage);
    second.initialize().await.unwrap();
    let result = second.controller.handle_purchase_update(&purchase).await.unwrap();

    assert_eq!(
        result,
        PurchaseResult::Completed(ReconcileOutcome::AlreadyGranted)
    );
    assert_eq!(second.balance(TestFixtures::NO_ADS_PRODUCT), 0);
}

/// Flag store whose ledger writes fail once `fail_ledger` is set.
#[derive(Default)]
struct FailingLedgerStore {
    inner: InMemoryKeyValueStore,
    fail_ledger: AtomicBool,
}

#[async_trait::async_trait]
impl KeyValueStore for FailingLedgerStore {
    async fn get_string(&self, key: &str) -> Result<Option<String>> {
        self.inner.get_string(key).await
    }

    async fn set_string(&self, key: &str, value: &str) -> Result<()> {
        if key == keys::PURCHASE_LEDGER && self.fail_ledger.load(Ordering::SeqCst) {
            return Err(ShopkitError::storage("disk full"));
        }
        self.inner.set_string(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.inner.remove(key).await
    }
}

#[tokio::test]
async fn test_ledger_write_failure_still_reports_grant() {
    let storage = Arc::new(FailingLedgerStore::default());
    let billing = Arc::new(MockBillingService::new());
    let catalog = Arc::new(sample_catalog());
    let controller = StoreController::new(
        StoreConfig::default(),
        catalog.clone(),
        storage.clone(),
        Arc::new(MockBillingFactory::new(billing)),
        EventBus::new(),
    );
    controller
        .initialize(
            Some(TestSigner::shared().public_key_base64()),
            Some(TestFixtures::CUSTOM_SECRET),
            1,
        )
        .await
        .unwrap();
    storage.fail_ledger.store(true, Ordering::SeqCst);

    let purchase = TestSigner::shared().signed_purchase(purchase_record(
        TestFixtures::COINS_PRODUCT,
        PurchaseState::Purchased,
        Utc::now(),
    ));
    let result = controller.handle_purchase_update(&purchase).await.unwrap();

    assert_eq!(result, PurchaseResult::Completed(ReconcileOutcome::Granted));
    let balance = catalog
        .item(&TestFixtures::COINS_PRODUCT.into())
        .map(|item| item.balance())
        .unwrap_or(0);
    assert_eq!(balance, 1);
    assert_eq!(controller.metrics().snapshot().unexpected_errors, 1);

    // the in-memory ledger still answers redeliveries
    let again = controller.handle_purchase_update(&purchase).await.unwrap();
    assert_eq!(again, PurchaseResult::Completed(ReconcileOutcome::AlreadyGranted));
}

// === Concurrency ===

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_duplicate_updates_grant_once() {
    let harness = Harness::open(StoreConfig::default()).await;
    let purchase = TestSigner::shared().signed_purchase(purchase_record(
        TestFixtures::NO_ADS_PRODUCT,
        PurchaseState::Purchased,
        Utc::now(),
    ));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let controller = harness.controller.clone();
        let purchase = purchase.clone();
        handles.push(tokio::spawn(async move {
            controller.handle_purchase_update(&purchase).await.unwrap()
        }));
    }

    let mut granted = 0;
    for handle in handles {
        if handle.await.unwrap() == PurchaseResult::Completed(ReconcileOutcome::Granted) {
            granted += 1;
        }
    }

    assert_eq!(granted, 1);
    assert_eq!(harness.balance(TestFixtures::NO_ADS_PRODUCT), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_purchase_update_during_close() {
    let harness = Harness::open(StoreConfig::default()).await;
    let purchase = TestSigner::shared().signed_purchase(purchase_record(
        TestFixtures::COINS_PRODUCT,
        PurchaseState::Purchased,
        Utc::now(),
    ));

    let controller = harness.controller.clone();
    let update = tokio::spawn(async move { controller.handle_purchase_update(&purchase).await });
    harness.controller.store_closing().await.unwrap();

    assert!(update.await.unwrap().unwrap().is_completed());
    assert!(!harness.controller.is_store_open());
    assert_eq!(harness.balance(TestFixtures::COINS_PRODUCT), 1);
}
