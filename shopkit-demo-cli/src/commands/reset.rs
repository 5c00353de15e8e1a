//! Reset command - clear persisted store flags

use anyhow::{Context, Result};
use shopkit_lib::storage::{JsonFileStore, KeyValueStore};
use std::path::Path;

use crate::ui;

pub async fn run(storage_dir: &Path, yes: bool, verbose: bool) -> Result<()> {
    let store = JsonFileStore::new(storage_dir);

    if !yes && !ui::confirm("Clear all persisted store flags?", false)? {
        ui::info("Reset cancelled");
        return Ok(());
    }

    store
        .clear_flags()
        .await
        .context("Failed to clear store flags")?;

    if verbose {
        ui::key_value("Flags file", &store.path().display().to_string());
    }
    ui::success("Store flags cleared");
    Ok(())
}
