//! Prelude module for convenient imports.
//!
//! ```rust,ignore
//! use shopkit_lib::prelude::*;
//! ```
//!
//! ## What's Included
//!
//! - Core types: `ProductId`, `ShopkitError`, `ShopkitErrorCode`, `Result`
//! - Billing: `BillingService`, `BillingServiceFactory`, `Purchase`, `PurchaseRecord`
//! - Economy: `Catalog`, `PurchasableItem`, `InMemoryCatalog`
//! - Controller: `StoreController`, `StoreConfig`, `PurchaseResult`
//! - Events and storage

// Core types
pub use crate::ProductId;

// Error handling
pub use crate::errors::{ShopkitError, ShopkitErrorCode};
pub use crate::Result;

// Billing
pub use crate::billing::{
    BillingFailure, BillingResponse, BillingResult, BillingService, BillingServiceFactory,
    Inventory, Purchase, PurchaseRecord, PurchaseState,
};

// Economy
pub use crate::catalog::{Catalog, InMemoryCatalog, ItemKind, PurchasableItem, VirtualItem};

// Controller
pub use crate::config::StoreConfig;
pub use crate::controller::{PurchaseResult, RejectReason, StoreController};
pub use crate::payload::{AcceptAnyPayload, PayloadVerifier};
pub use crate::reconcile::{OwnershipState, PurchaseReconciler, ReconcileOutcome};

// Events, storage and metrics
pub use crate::events::{EventBus, StoreEvent};
pub use crate::metrics::{MetricsSnapshot, StoreMetrics};
pub use crate::storage::{
    InMemoryKeyValueStore, JsonFileStore, KeyValueStore, ObscuredKeyValueStore,
};

// Verification
pub use crate::security::{PublicKey, ReceiptVerifier, VerificationMode};
