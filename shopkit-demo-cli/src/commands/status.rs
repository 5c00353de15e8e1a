//! Status command - show persisted store flags

use anyhow::{Context, Result};
use shopkit_lib::reconcile::OwnershipLedger;
use shopkit_lib::storage::{keys, JsonFileStore, KeyValueStore, ObscuredKeyValueStore};
use std::path::Path;
use std::sync::Arc;

use crate::ui;

pub async fn run(storage_dir: &Path, secret: Option<&str>, verbose: bool) -> Result<()> {
    let store = Arc::new(JsonFileStore::new(storage_dir));
    if verbose {
        ui::key_value("Flags file", &store.path().display().to_string());
    }

    let entries = store.entries().context("Failed to read store flags")?;
    if entries.is_empty() {
        ui::info(&format!("No store state in {}", storage_dir.display()));
        return Ok(());
    }

    ui::header("Store Status");
    let Some(secret) = secret else {
        let names: Vec<&str> = entries.keys().map(String::as_str).collect();
        ui::key_value("Stored flags", &names.join(", "));
        ui::info("Values are obscured, pass --secret to read them");
        return Ok(());
    };

    let obscured = ObscuredKeyValueStore::new(store.clone(), secret)?;
    obscured
        .check_secret()
        .await
        .context("Secret does not match the stored flags")?;

    let restored = obscured.get_bool(keys::RESTORED).await?;
    ui::key_value("Restored", &restored.to_string());
    ui::key_value(
        "Assets version",
        &obscured
            .get_string(keys::ASSETS_VERSION)
            .await?
            .unwrap_or_else(|| "-".to_string()),
    );
    ui::key_value(
        "Public key",
        &obscured
            .get_string(keys::PUBLIC_KEY)
            .await?
            .map(|key| ui::truncate(&key, 24))
            .unwrap_or_else(|| "-".to_string()),
    );

    let ledger = match obscured.get_string(keys::PURCHASE_LEDGER).await? {
        Some(json) => OwnershipLedger::from_json(&json).context("Corrupt purchase ledger")?,
        None => OwnershipLedger::new(),
    };

    ui::header("Purchases");
    if ledger.is_empty() {
        ui::info("No purchases reconciled yet");
        return Ok(());
    }
    for (product_id, entry) in ledger.iter() {
        let held = match entry.latest_grant() {
            Some(latest) => format!(
                " ({} held, latest {})",
                entry.outstanding(),
                latest.format("%Y-%m-%d %H:%M:%S")
            ),
            None => String::new(),
        };
        ui::key_value(product_id.as_str(), &format!("{:?}{}", entry.state, held));
    }

    Ok(())
}
