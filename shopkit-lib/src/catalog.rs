//! Economy catalog: lookup of purchasable items by product id.
//!
//! The economy model belongs to the host application. The controller only
//! needs to find the item behind a product id and change its balance, so
//! both sides are traits. [`InMemoryCatalog`] is a complete implementation
//! for apps that keep balances in memory and for tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::{ProductId, Result, ShopkitError};

/// Kind of virtual item sold through the platform store.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    /// A pack of virtual currency.
    CurrencyPack,
    /// A consumable good.
    #[default]
    Good,
    /// A one-time unlock; holds at most one unit.
    NonConsumable,
}

/// An economy item that can be bought with real money.
pub trait PurchasableItem: Send + Sync {
    /// Item identifier inside the economy.
    fn item_id(&self) -> &str;

    /// Platform product id this item is sold under.
    fn product_id(&self) -> &ProductId;

    /// Give `amount` units to the user. Returns the new balance.
    fn grant(&self, amount: u64) -> Result<u64>;

    /// Take `amount` units from the user. Returns the new balance.
    fn revoke(&self, amount: u64) -> Result<u64>;

    /// Current balance.
    fn balance(&self) -> u64;
}

/// Source of purchasable items.
pub trait Catalog: Send + Sync {
    /// Find the item sold under `product_id`.
    fn get_purchasable_item(&self, product_id: &ProductId) -> Option<Arc<dyn PurchasableItem>>;

    /// Every product id sold through the platform store.
    fn market_product_ids(&self) -> Vec<ProductId>;
}

/// Catalog entry as read from JSON.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDefinition {
    /// Item identifier inside the economy.
    pub item_id: String,
    /// Platform product id.
    pub product_id: ProductId,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Item kind.
    #[serde(default)]
    pub kind: ItemKind,
    /// Balance the item starts with.
    #[serde(default)]
    pub initial_balance: u64,
}

/// Item with an in-memory balance.
#[derive(Debug)]
pub struct VirtualItem {
    item_id: String,
    product_id: ProductId,
    name: String,
    kind: ItemKind,
    balance: AtomicU64,
}

impl VirtualItem {
    /// Create a new item with zero balance.
    pub fn new(item_id: impl Into<String>, product_id: impl Into<ProductId>, kind: ItemKind) -> Self {
        Self {
            item_id: item_id.into(),
            product_id: product_id.into(),
            name: String::new(),
            kind,
            balance: AtomicU64::new(0),
        }
    }

    /// Set the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the starting balance.
    pub fn with_balance(self, balance: u64) -> Self {
        self.balance.store(self.clamp(balance), Ordering::SeqCst);
        self
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Item kind.
    pub fn kind(&self) -> ItemKind {
        self.kind
    }

    fn clamp(&self, balance: u64) -> u64 {
        match self.kind {
            ItemKind::NonConsumable => balance.min(1),
            _ => balance,
        }
    }
}

impl From<ItemDefinition> for VirtualItem {
    fn from(def: ItemDefinition) -> Self {
        VirtualItem::new(def.item_id, def.product_id, def.kind)
            .with_name(def.name)
            .with_balance(def.initial_balance)
    }
}

impl PurchasableItem for VirtualItem {
    fn item_id(&self) -> &str {
        &self.item_id
    }

    fn product_id(&self) -> &ProductId {
        &self.product_id
    }

    fn grant(&self, amount: u64) -> Result<u64> {
        let previous = self
            .balance
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                current.checked_add(amount).map(|next| self.clamp(next))
            })
            .map_err(|_| ShopkitError::Economy(format!("balance overflow for {}", self.item_id)))?;
        Ok(self.clamp(previous.saturating_add(amount)))
    }

    fn revoke(&self, amount: u64) -> Result<u64> {
        let previous = self
            .balance
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                Some(current.saturating_sub(amount))
            })
            .unwrap_or_else(|current| current);
        Ok(previous.saturating_sub(amount))
    }

    fn balance(&self) -> u64 {
        self.balance.load(Ordering::SeqCst)
    }
}

/// Catalog backed by a map of [`VirtualItem`]s.
///
/// # Thread Safety
///
/// Items are shared through `Arc`; balances use atomics and the item map
/// sits behind an `RwLock`.
#[derive(Default)]
pub struct InMemoryCatalog {
    items: RwLock<BTreeMap<ProductId, Arc<VirtualItem>>>,
}

impl InMemoryCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog from item definitions.
    pub fn from_definitions(definitions: impl IntoIterator<Item = ItemDefinition>) -> Self {
        let catalog = Self::new();
        for def in definitions {
            catalog.insert(def.into());
        }
        catalog
    }

    /// Parse a JSON array of [`ItemDefinition`]s.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let definitions: Vec<ItemDefinition> = serde_json::from_str(json)?;
        Ok(Self::from_definitions(definitions))
    }

    /// Add or replace an item.
    pub fn insert(&self, item: VirtualItem) -> Arc<VirtualItem> {
        let item = Arc::new(item);
        let mut items = self.items.write().unwrap_or_else(|e| e.into_inner());
        items.insert(item.product_id.clone(), item.clone());
        item
    }

    /// Get the concrete item for a product.
    pub fn item(&self, product_id: &ProductId) -> Option<Arc<VirtualItem>> {
        let items = self.items.read().unwrap_or_else(|e| e.into_inner());
        items.get(product_id).cloned()
    }

    /// All items ordered by product id.
    pub fn items(&self) -> Vec<Arc<VirtualItem>> {
        let items = self.items.read().unwrap_or_else(|e| e.into_inner());
        items.values().cloned().collect()
    }

    /// Current balance of every item, keyed by item id.
    pub fn balances(&self) -> BTreeMap<String, u64> {
        self.items()
            .iter()
            .map(|item| (item.item_id.clone(), item.balance()))
            .collect()
    }
}

impl Catalog for InMemoryCatalog {
    fn get_purchasable_item(&self, product_id: &ProductId) -> Option<Arc<dyn PurchasableItem>> {
        self.item(product_id)
            .map(|item| item as Arc<dyn PurchasableItem>)
    }

    fn market_product_ids(&self) -> Vec<ProductId> {
        let items = self.items.read().unwrap_or_else(|e| e.into_inner());
        items.keys().cloned().collect()
    }
}
