//! CLI command implementations

pub mod catalog;
pub mod reset;
pub mod simulate;
pub mod status;
pub mod verify;

use anyhow::{Context, Result};
use shopkit_lib::catalog::InMemoryCatalog;
use shopkit_lib::config::StoreConfig;
use std::path::Path;

/// Load a catalog file
pub fn load_catalog(path: &Path) -> Result<InMemoryCatalog> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read catalog {}", path.display()))?;
    InMemoryCatalog::from_json_str(&json)
        .with_context(|| format!("Invalid catalog {}", path.display()))
}

/// Load the store configuration, or defaults when no file is given
pub fn load_config(path: Option<&Path>) -> Result<StoreConfig> {
    match path {
        Some(path) => StoreConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(StoreConfig::default()),
    }
}
