//! In-memory flag storage.
//!
//! Values are lost when the process exits. Used by tests and by hosts that
//! persist flags some other way.

use std::collections::HashMap;
use std::sync::RwLock;

use super::KeyValueStore;
use crate::{Result, ShopkitError};

/// In-memory implementation of [`KeyValueStore`].
#[derive(Default)]
pub struct InMemoryKeyValueStore {
    values: RwLock<HashMap<String, String>>,
}

fn lock_error(context: &str) -> ShopkitError {
    ShopkitError::Storage(format!(
        "InMemoryKeyValueStore: lock poisoned during {}",
        context
    ))
}

impl InMemoryKeyValueStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored values. Returns 0 if the lock is poisoned.
    pub fn len(&self) -> usize {
        self.values.read().map(|v| v.len()).unwrap_or(0)
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn get_string(&self, key: &str) -> Result<Option<String>> {
        let values = self.values.read().map_err(|_| lock_error("get"))?;
        Ok(values.get(key).cloned())
    }

    async fn set_string(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self.values.write().map_err(|_| lock_error("set"))?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut values = self.values.write().map_err(|_| lock_error("remove"))?;
        values.remove(key);
        Ok(())
    }
}
