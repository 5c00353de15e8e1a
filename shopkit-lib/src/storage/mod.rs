//! Persistent key/value flags.
//!
//! The controller keeps a handful of values across restarts: the public
//! key given at initialization, the assets version, the `restored` flag
//! and the reconciler's ownership ledger. The controller writes them
//! through [`ObscuredKeyValueStore`], keyed from the custom secret; the
//! secret itself is never stored.

mod file;
mod memory;
mod obscured;

pub use file::JsonFileStore;
pub use memory::InMemoryKeyValueStore;
pub use obscured::ObscuredKeyValueStore;

use crate::Result;

/// Well-known flag keys.
pub mod keys {
    /// Base64 public key used to verify receipts.
    pub const PUBLIC_KEY: &str = "public_key";
    /// Sealed marker proving which custom secret the values use.
    pub const SECRET_CHECK: &str = "secret_check";
    /// Version of the economy assets the store was initialized with.
    pub const ASSETS_VERSION: &str = "assets_version";
    /// Set once transactions have been restored.
    pub const RESTORED: &str = "restored";
    /// JSON snapshot of the purchase ownership ledger.
    pub const PURCHASE_LEDGER: &str = "purchase_ledger";

    /// Every key the store writes.
    pub const ALL: &[&str] = &[
        PUBLIC_KEY,
        SECRET_CHECK,
        ASSETS_VERSION,
        RESTORED,
        PURCHASE_LEDGER,
    ];
}

/// Async key/value storage for store flags.
///
/// Implementations must be safe to share between tasks.
#[async_trait::async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value.
    async fn get_string(&self, key: &str) -> Result<Option<String>>;

    /// Write a value, replacing any previous one.
    async fn set_string(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a value. Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<()>;

    /// Read a boolean flag. Missing or unparsable values read as `false`.
    async fn get_bool(&self, key: &str) -> Result<bool> {
        Ok(self
            .get_string(key)
            .await?
            .map(|v| v == "true")
            .unwrap_or(false))
    }

    /// Write a boolean flag.
    async fn set_bool(&self, key: &str, value: bool) -> Result<()> {
        self.set_string(key, if value { "true" } else { "false" })
            .await
    }

    /// Remove every well-known store key.
    async fn clear_flags(&self) -> Result<()> {
        for key in keys::ALL {
            self.remove(key).await?;
        }
        Ok(())
    }
}
