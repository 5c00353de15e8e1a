//! Platform billing abstraction.
//!
//! The billing helper of a platform SDK is modeled as [`BillingService`].
//! Host applications implement it over their SDK; the crate never talks to a
//! billing transport directly. Asynchronous SDK callbacks are expressed as
//! futures: `launch_purchase_flow` resolves once the platform purchase flow
//! has finished.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ProductId, ShopkitError};

/// Response codes reported by the platform billing service.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingResponse {
    /// Success.
    Ok,
    /// User pressed back or cancelled the purchase dialog.
    UserCanceled,
    /// Billing service is temporarily unreachable.
    ServiceUnavailable,
    /// Billing API version not supported for the requested type.
    BillingUnavailable,
    /// Requested product is not available for purchase.
    ItemUnavailable,
    /// Invalid arguments provided to the API.
    DeveloperError,
    /// Fatal error during the API action.
    Error,
    /// Purchase failed because the item is already owned.
    ItemAlreadyOwned,
    /// Consumption failed because the item is not owned.
    ItemNotOwned,
}

impl BillingResponse {
    /// Numeric code as used by the platform.
    pub fn code(&self) -> i32 {
        match self {
            Self::Ok => 0,
            Self::UserCanceled => 1,
            Self::ServiceUnavailable => 2,
            Self::BillingUnavailable => 3,
            Self::ItemUnavailable => 4,
            Self::DeveloperError => 5,
            Self::Error => 6,
            Self::ItemAlreadyOwned => 7,
            Self::ItemNotOwned => 8,
        }
    }

    /// Parse a platform code. Unknown codes map to [`BillingResponse::Error`].
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Self::Ok,
            1 => Self::UserCanceled,
            2 => Self::ServiceUnavailable,
            3 => Self::BillingUnavailable,
            4 => Self::ItemUnavailable,
            5 => Self::DeveloperError,
            7 => Self::ItemAlreadyOwned,
            8 => Self::ItemNotOwned,
            _ => Self::Error,
        }
    }

    /// Whether the response is a success.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Ok)
    }

    /// Whether retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ServiceUnavailable | Self::Error)
    }
}

impl fmt::Display for BillingResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Ok => "ok",
            Self::UserCanceled => "user canceled",
            Self::ServiceUnavailable => "service unavailable",
            Self::BillingUnavailable => "billing unavailable",
            Self::ItemUnavailable => "item unavailable",
            Self::DeveloperError => "developer error",
            Self::Error => "error",
            Self::ItemAlreadyOwned => "item already owned",
            Self::ItemNotOwned => "item not owned",
        };
        write!(f, "{} ({})", label, self.code())
    }
}

/// Purchase state reported for a product.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseState {
    /// The product was bought.
    Purchased,
    /// The purchase was canceled before completion.
    Canceled,
    /// The purchase was refunded.
    Refunded,
}

impl PurchaseState {
    /// Platform code for the state.
    pub fn code(&self) -> i32 {
        match self {
            Self::Purchased => 0,
            Self::Canceled => 1,
            Self::Refunded => 2,
        }
    }

    /// Parse a platform code.
    pub fn from_code(code: i32) -> crate::Result<Self> {
        match code {
            0 => Ok(Self::Purchased),
            1 => Ok(Self::Canceled),
            2 => Ok(Self::Refunded),
            other => Err(ShopkitError::Serialization(format!(
                "unknown purchase state code {}",
                other
            ))),
        }
    }
}

impl fmt::Display for PurchaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Purchased => write!(f, "purchased"),
            Self::Canceled => write!(f, "canceled"),
            Self::Refunded => write!(f, "refunded"),
        }
    }
}

/// A purchase as reported by the platform. Immutable once received.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseRecord {
    /// Product the purchase is for.
    pub product_id: ProductId,
    /// Reported state.
    pub state: PurchaseState,
    /// When the purchase was made.
    pub purchase_time: DateTime<Utc>,
    /// Opaque string round-tripped through the purchase flow.
    #[serde(default)]
    pub developer_payload: String,
}

impl PurchaseRecord {
    /// Create a new record.
    pub fn new(
        product_id: impl Into<ProductId>,
        state: PurchaseState,
        purchase_time: DateTime<Utc>,
        developer_payload: impl Into<String>,
    ) -> Self {
        Self {
            product_id: product_id.into(),
            state,
            purchase_time,
            developer_payload: developer_payload.into(),
        }
    }
}

/// A purchase record together with the platform's signed receipt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Purchase {
    /// The decoded purchase.
    pub record: PurchaseRecord,
    /// Platform order identifier, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    /// The exact data string the platform signed.
    pub signed_data: String,
    /// Base64 signature over `signed_data`.
    pub signature: String,
}

impl Purchase {
    /// Product the purchase is for.
    pub fn product_id(&self) -> &ProductId {
        &self.record.product_id
    }
}

/// Products currently owned, as returned by an inventory query.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    purchases: HashMap<ProductId, Purchase>,
}

impl Inventory {
    /// Create an empty inventory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the purchase for its product.
    pub fn add_purchase(&mut self, purchase: Purchase) {
        self.purchases
            .insert(purchase.record.product_id.clone(), purchase);
    }

    /// Builder-style variant of [`Inventory::add_purchase`].
    pub fn with_purchase(mut self, purchase: Purchase) -> Self {
        self.add_purchase(purchase);
        self
    }

    /// Get the purchase for a product, if owned.
    pub fn get_purchase(&self, product_id: &ProductId) -> Option<&Purchase> {
        self.purchases.get(product_id)
    }

    /// Whether the product is owned.
    pub fn has_purchase(&self, product_id: &ProductId) -> bool {
        self.purchases.contains_key(product_id)
    }

    /// All owned product ids.
    pub fn owned_products(&self) -> Vec<ProductId> {
        let mut ids: Vec<_> = self.purchases.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of owned products.
    pub fn len(&self) -> usize {
        self.purchases.len()
    }

    /// Whether nothing is owned.
    pub fn is_empty(&self) -> bool {
        self.purchases.is_empty()
    }
}

/// Result type for billing calls.
pub type BillingResult<T> = std::result::Result<T, BillingFailure>;

/// A failed billing call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BillingFailure {
    /// Platform response code.
    pub response: BillingResponse,
    /// Human-readable description.
    pub message: String,
}

impl BillingFailure {
    /// Create a new failure.
    pub fn new(response: BillingResponse, message: impl Into<String>) -> Self {
        Self {
            response,
            message: message.into(),
        }
    }

    /// The user cancelled the flow.
    pub fn user_canceled() -> Self {
        Self::new(BillingResponse::UserCanceled, "user canceled")
    }
}

impl fmt::Display for BillingFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.response, self.message)
    }
}

impl From<BillingFailure> for ShopkitError {
    fn from(failure: BillingFailure) -> Self {
        ShopkitError::billing(failure.response, failure.message)
    }
}

/// Platform billing helper bound to one store session.
///
/// Implementations wrap the platform SDK. A helper is created per session by
/// a [`BillingServiceFactory`] and disposed when the session closes.
#[async_trait::async_trait]
pub trait BillingService: Send + Sync {
    /// Connect to the platform billing service.
    ///
    /// An error means billing is not supported in this session.
    async fn start_setup(&self) -> BillingResult<()>;

    /// Run the platform purchase flow for a product.
    ///
    /// Resolves when the flow has finished. A user cancellation is reported
    /// as a failure with [`BillingResponse::UserCanceled`].
    async fn launch_purchase_flow(
        &self,
        product_id: &ProductId,
        developer_payload: &str,
    ) -> BillingResult<Purchase>;

    /// Query the products currently owned by the user.
    async fn query_inventory(&self) -> BillingResult<Inventory>;

    /// Release the platform connection. Further calls are not expected.
    async fn dispose(&self);
}

/// Creates billing helpers for store sessions.
pub trait BillingServiceFactory: Send + Sync {
    /// Create a helper that verifies against `public_key`.
    ///
    /// `debug_logging` is set when the store runs in test mode.
    fn create(&self, public_key: &str, debug_logging: bool) -> Arc<dyn BillingService>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn purchase(product: &str) -> Purchase {
        Purchase {
            record: PurchaseRecord::new(product, PurchaseState::Purchased, Utc::now(), "p"),
            order_id: None,
            signed_data: "data".to_string(),
            signature: "sig".to_string(),
        }
    }

    #[test]
    fn test_response_codes() {
        for code in 0..=8 {
            assert_eq!(BillingResponse::from_code(code).code(), code);
        }
        assert_eq!(BillingResponse::from_code(42), BillingResponse::Error);
        assert!(BillingResponse::Ok.is_success());
        assert!(!BillingResponse::UserCanceled.is_success());
    }

    #[test]
    fn test_purchase_state_codes() {
        assert_eq!(PurchaseState::from_code(0).unwrap(), PurchaseState::Purchased);
        assert_eq!(PurchaseState::from_code(1).unwrap(), PurchaseState::Canceled);
        assert_eq!(PurchaseState::from_code(2).unwrap(), PurchaseState::Refunded);
        assert!(PurchaseState::from_code(3).is_err());
    }

    #[test]
    fn test_inventory() {
        let inventory = Inventory::new()
            .with_purchase(purchase("no_ads"))
            .with_purchase(purchase("coins_100"));

        assert_eq!(inventory.len(), 2);
        assert!(inventory.has_purchase(&"no_ads".into()));
        assert!(!inventory.has_purchase(&"gems".into()));
        assert_eq!(
            inventory.owned_products(),
            vec![ProductId::from("coins_100"), ProductId::from("no_ads")]
        );
    }

    #[test]
    fn test_failure_into_error() {
        let err: ShopkitError = BillingFailure::user_canceled().into();
        assert!(matches!(
            err,
            ShopkitError::Billing {
                response: BillingResponse::UserCanceled,
                ..
            }
        ));
    }
}
