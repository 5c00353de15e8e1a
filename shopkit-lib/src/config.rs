//! Store configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Result, ShopkitError};

/// Configuration for a [`StoreController`](crate::controller::StoreController).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Keep granted items when a purchase is refunded.
    #[serde(default)]
    pub friendly_refunds: bool,

    /// Accept receipts without verification and enable billing debug logs.
    ///
    /// Only honored when the crate is built with the `test-mode` feature.
    #[serde(default)]
    pub test_mode: bool,

    /// Bound on billing setup and inventory queries, in seconds.
    #[serde(default = "default_billing_timeout")]
    pub billing_timeout_secs: u64,

    /// Check receipt signatures of purchases found while restoring.
    #[serde(default = "default_true")]
    pub verify_signatures_on_restore: bool,
}

fn default_billing_timeout() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            friendly_refunds: false,
            test_mode: false,
            billing_timeout_secs: default_billing_timeout(),
            verify_signatures_on_restore: true,
        }
    }
}

impl StoreConfig {
    /// Create a configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the friendly refunds policy.
    pub fn with_friendly_refunds(mut self, enabled: bool) -> Self {
        self.friendly_refunds = enabled;
        self
    }

    /// Set test mode.
    pub fn with_test_mode(mut self, enabled: bool) -> Self {
        self.test_mode = enabled;
        self
    }

    /// Set the billing timeout.
    pub fn with_billing_timeout(mut self, secs: u64) -> Self {
        self.billing_timeout_secs = secs;
        self
    }

    /// Set whether restored purchases are verified.
    pub fn with_verify_signatures_on_restore(mut self, enabled: bool) -> Self {
        self.verify_signatures_on_restore = enabled;
        self
    }

    /// Billing timeout as a duration.
    pub fn billing_timeout(&self) -> Duration {
        Duration::from_secs(self.billing_timeout_secs)
    }

    /// Check that values are usable.
    pub fn validate(&self) -> Result<()> {
        if self.billing_timeout_secs == 0 {
            return Err(ShopkitError::Config(
                "billing_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Parse and validate a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| ShopkitError::Config(format!("invalid store config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            ShopkitError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&json)
    }
}
