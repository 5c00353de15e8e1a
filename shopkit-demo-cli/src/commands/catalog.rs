//! Catalog command - list catalog items

use anyhow::Result;
use shopkit_lib::catalog::PurchasableItem;
use std::path::Path;

use crate::ui;

pub async fn run(path: &Path, json: bool, _verbose: bool) -> Result<()> {
    let catalog = super::load_catalog(path)?;
    let items = catalog.items();

    if json {
        let value: Vec<_> = items
            .iter()
            .map(|item| {
                serde_json::json!({
                    "item_id": item.item_id(),
                    "product_id": item.product_id(),
                    "name": item.name(),
                    "kind": item.kind(),
                    "balance": item.balance(),
                })
            })
            .collect();
        ui::json(&serde_json::Value::Array(value));
        return Ok(());
    }

    if items.is_empty() {
        ui::info("Catalog is empty");
        return Ok(());
    }

    ui::header(&format!("Catalog ({} items)", items.len()));
    for item in &items {
        ui::separator();
        ui::key_value("Item", item.item_id());
        ui::key_value("Product", item.product_id().as_str());
        if !item.name().is_empty() {
            ui::key_value("Name", item.name());
        }
        ui::key_value("Kind", &format!("{:?}", item.kind()));
        ui::key_value("Balance", &item.balance().to_string());
    }

    Ok(())
}
