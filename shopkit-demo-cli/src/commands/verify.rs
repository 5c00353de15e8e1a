//! Verify command - check a receipt signature

use anyhow::{bail, Context, Result};
use std::io::Read;

use crate::ui;

pub async fn run(key: &str, data: &str, signature: &str, verbose: bool) -> Result<()> {
    let key = read_key(key)?;
    let signed_data = read_data(data)?;

    if verbose {
        ui::key_value("Public key", &ui::truncate(&key, 48));
        ui::key_value("Data bytes", &signed_data.len().to_string());
    }

    if shopkit_lib::security::verify_purchase(&key, &signed_data, signature) {
        ui::success("Signature is valid");
        Ok(())
    } else {
        ui::error("Signature is NOT valid");
        bail!("signature verification failed")
    }
}

fn read_key(key: &str) -> Result<String> {
    match key.strip_prefix('@') {
        Some(path) => {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read key file {}", path))?;
            Ok(contents.trim().to_string())
        }
        None => Ok(key.to_string()),
    }
}

fn read_data(data: &str) -> Result<String> {
    if data == "-" {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read signed data from stdin")?;
        return Ok(buffer);
    }
    std::fs::read_to_string(data).with_context(|| format!("Failed to read data file {}", data))
}
