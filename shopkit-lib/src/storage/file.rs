//! JSON file flag storage.
//!
//! All flags live in one `flags.json` file inside a directory. Every write
//! rewrites the whole file. There is no locking between processes.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tokio::sync::Mutex;

use super::KeyValueStore;
use crate::{Result, ShopkitError};

const FILE_NAME: &str = "flags.json";

/// File-backed implementation of [`KeyValueStore`].
pub struct JsonFileStore {
    storage_dir: PathBuf,
    // Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Create a store rooted at `storage_dir`. The directory is created on
    /// first write.
    pub fn new(storage_dir: impl AsRef<Path>) -> Self {
        Self {
            storage_dir: storage_dir.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    /// Path of the backing file.
    pub fn path(&self) -> PathBuf {
        self.storage_dir.join(FILE_NAME)
    }

    /// Every stored key and value.
    pub fn entries(&self) -> Result<BTreeMap<String, String>> {
        self.load()
    }

    fn load(&self) -> Result<BTreeMap<String, String>> {
        let path = self.path();
        if !path.exists() {
            return Ok(BTreeMap::new());
        }

        let json = std::fs::read_to_string(&path).map_err(ShopkitError::storage)?;
        if json.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        let data = serde_json::from_str(&json)
            .map_err(|e| ShopkitError::Storage(format!("corrupt {}: {}", path.display(), e)))?;
        Ok(data)
    }

    fn save(&self, data: &BTreeMap<String, String>) -> Result<()> {
        std::fs::create_dir_all(&self.storage_dir).map_err(ShopkitError::storage)?;
        let json = serde_json::to_string_pretty(data)?;
        std::fs::write(self.path(), json).map_err(ShopkitError::storage)?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl KeyValueStore for JsonFileStore {
    async fn get_string(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.write_lock.lock().await;
        Ok(self.load()?.remove(key))
    }

    async fn set_string(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut data = self.load()?;
        data.insert(key.to_string(), value.to_string());
        self.save(&data)
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut data = self.load()?;
        if data.remove(key).is_some() {
            self.save(&data)?;
        }
        Ok(())
    }
}
