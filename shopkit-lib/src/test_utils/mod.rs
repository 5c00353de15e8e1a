//! Test utilities for Shopkit.
//!
//! This module provides testing infrastructure including:
//! - A scripted billing service and factory with call counters
//! - An RSA test signer that produces platform-style signed receipts
//! - Fixtures for common catalogs and purchase records
//!
//! ## Usage
//!
//! ```rust,ignore
//! use shopkit_lib::test_utils::{MockBillingService, MockBillingFactory, TestSigner};
//!
//! let billing = Arc::new(MockBillingService::new());
//! let factory = Arc::new(MockBillingFactory::new(billing.clone()));
//!
//! controller.initialize(Some(TestSigner::shared().public_key_base64()), Some("secret"), 1).await?;
//! controller.store_opening().await?;
//! controller.buy(&"coins_100".into(), "payload").await?;
//! assert_eq!(billing.purchase_calls(), 1);
//! ```

mod fixtures;
mod mock_billing;
mod signer;

pub use fixtures::{purchase_record, sample_catalog, sample_definitions, TestFixtures};
pub use mock_billing::{MockBillingFactory, MockBillingService};
pub use signer::TestSigner;
