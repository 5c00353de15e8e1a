//! Shopkit library.
//!
//! A virtual-goods purchasing facade. It sits between an application's
//! virtual economy and a platform billing service: purchase receipts are
//! verified, and purchase lifecycle updates are turned into grants and
//! revocations on economy items.
//!
//! The platform billing transport is not part of this crate. Everything the
//! facade talks to is injected through traits:
//!
//! - [`billing::BillingService`]: the platform billing helper
//! - [`catalog::Catalog`]: item lookup by product id
//! - [`storage::KeyValueStore`]: persistent flags
//! - [`events::EventBus`]: lifecycle notifications for the rest of the app
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use shopkit_lib::prelude::*;
//!
//! let controller = StoreController::new(
//!     StoreConfig::default(),
//!     Arc::new(catalog),
//!     Arc::new(InMemoryKeyValueStore::new()),
//!     Arc::new(platform_billing_factory),
//!     EventBus::new(),
//! );
//!
//! controller.initialize(Some(PUBLIC_KEY), Some(SECRET), 1).await?;
//! controller.store_opening().await?;
//! let result = controller.buy(&"coins_100".into(), "payload").await?;
//! ```

pub mod billing;
pub mod catalog;
pub mod config;
pub mod controller;
pub mod errors;
pub mod events;
pub mod metrics;
pub mod payload;
pub mod prelude;
pub mod reconcile;
pub mod security;
pub mod storage;

/// Test utilities for store testing.
///
/// This module is only available with the `test-utils` feature or in test builds.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use errors::{ShopkitError, ShopkitErrorCode};

/// Common result alias for Shopkit operations.
pub type Result<T> = std::result::Result<T, ShopkitError>;

/// Identifier of a product as registered with the platform store.
///
/// # Example
///
/// ```
/// use shopkit_lib::ProductId;
///
/// let product: ProductId = "coins_100".into();
/// assert_eq!(product.as_str(), "coins_100");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub String);

impl ProductId {
    /// Create a new ProductId from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the product ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ProductId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ProductId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for ProductId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProductId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
