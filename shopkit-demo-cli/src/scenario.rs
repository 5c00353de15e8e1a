//! Scripted store sessions for `simulate`.
//!
//! A scenario is a JSON document describing the platform side (which
//! products are already owned, whether billing works) and a list of steps
//! to run against the store controller.
//!
//! ```json
//! {
//!   "owned": ["no_ads"],
//!   "steps": [
//!     { "action": "open" },
//!     { "action": "buy", "product_id": "coins_100", "payload": "order-1" },
//!     { "action": "cancel_next" },
//!     { "action": "buy", "product_id": "sword" },
//!     { "action": "refund", "product_id": "coins_100" },
//!     { "action": "restore" },
//!     { "action": "close" }
//!   ]
//! }
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use shopkit_lib::billing::BillingResponse;
use shopkit_lib::ProductId;
use std::path::Path;

/// A scripted session
#[derive(Debug, Deserialize)]
pub struct Scenario {
    /// Public key for `initialize`; defaults to the simulated platform key
    #[serde(default)]
    pub public_key: Option<String>,

    #[serde(default = "default_secret")]
    pub custom_secret: String,

    #[serde(default = "default_assets_version")]
    pub assets_version: u32,

    /// Whether billing setup succeeds
    #[serde(default = "default_true")]
    pub billing_supported: bool,

    /// Products the user already owns on the platform
    #[serde(default)]
    pub owned: Vec<ProductId>,

    pub steps: Vec<Step>,
}

fn default_secret() -> String {
    "shopkit-demo".to_string()
}

fn default_assets_version() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

/// One scenario step
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// Open the store
    Open,
    /// Close the store
    Close,
    /// Restore transactions
    Restore,
    /// Buy a product
    Buy {
        product_id: ProductId,
        #[serde(default)]
        payload: String,
    },
    /// The next purchase flow is cancelled by the user
    CancelNext,
    /// The next purchase flow fails with a billing response
    FailNext { response: BillingResponse },
    /// The next purchase flow returns a receipt signed with a foreign key
    ForgeNext { product_id: ProductId },
    /// The platform reports a refund
    Refund { product_id: ProductId },
    /// The product becomes owned on the platform outside the app
    Own { product_id: ProductId },
}

impl Step {
    /// Short description for output
    pub fn describe(&self) -> String {
        match self {
            Self::Open => "open store".to_string(),
            Self::Close => "close store".to_string(),
            Self::Restore => "restore transactions".to_string(),
            Self::Buy { product_id, .. } => format!("buy {}", product_id),
            Self::CancelNext => "user cancels next purchase".to_string(),
            Self::FailNext { response } => format!("next purchase fails ({})", response),
            Self::ForgeNext { product_id } => format!("next purchase is a forged {}", product_id),
            Self::Refund { product_id } => format!("refund {}", product_id),
            Self::Own { product_id } => format!("platform grants {}", product_id),
        }
    }
}

impl Scenario {
    /// Parse a scenario document
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Invalid scenario")
    }

    /// Read a scenario file
    pub fn from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario {}", path.display()))?;
        Self::from_json_str(&json)
    }
}
