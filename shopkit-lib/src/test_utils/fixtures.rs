//! Test fixtures.

use chrono::{DateTime, Utc};

use crate::billing::{PurchaseRecord, PurchaseState};
use crate::catalog::{InMemoryCatalog, ItemDefinition, ItemKind};

/// Commonly used test values.
pub struct TestFixtures;

impl TestFixtures {
    /// Product of a currency pack in [`sample_catalog`].
    pub const COINS_PRODUCT: &'static str = "coins_100";
    /// Product of a consumable good in [`sample_catalog`].
    pub const SWORD_PRODUCT: &'static str = "sword";
    /// Product of a non-consumable in [`sample_catalog`].
    pub const NO_ADS_PRODUCT: &'static str = "no_ads";
    /// A product id no catalog knows.
    pub const UNKNOWN_PRODUCT: &'static str = "unknown_product";
    /// Custom secret accepted by `initialize`.
    pub const CUSTOM_SECRET: &'static str = "test-secret";
    /// Placeholder key shipped in project templates.
    pub const PLACEHOLDER_KEY: &'static str = crate::controller::PLACEHOLDER_PUBLIC_KEY;
}

/// Definitions behind [`sample_catalog`].
pub fn sample_definitions() -> Vec<ItemDefinition> {
    vec![
        ItemDefinition {
            item_id: "gold".to_string(),
            product_id: TestFixtures::COINS_PRODUCT.into(),
            name: "100 Gold".to_string(),
            kind: ItemKind::CurrencyPack,
            initial_balance: 0,
        },
        ItemDefinition {
            item_id: "sword".to_string(),
            product_id: TestFixtures::SWORD_PRODUCT.into(),
            name: "Sword".to_string(),
            kind: ItemKind::Good,
            initial_balance: 0,
        },
        ItemDefinition {
            item_id: "no_ads".to_string(),
            product_id: TestFixtures::NO_ADS_PRODUCT.into(),
            name: "Remove Ads".to_string(),
            kind: ItemKind::NonConsumable,
            initial_balance: 0,
        },
    ]
}

/// Catalog with one item of each kind.
pub fn sample_catalog() -> InMemoryCatalog {
    InMemoryCatalog::from_definitions(sample_definitions())
}

/// Build a purchase record.
pub fn purchase_record(
    product: &str,
    state: PurchaseState,
    purchase_time: DateTime<Utc>,
) -> PurchaseRecord {
    PurchaseRecord::new(product, state, purchase_time, "fixture-payload")
}
