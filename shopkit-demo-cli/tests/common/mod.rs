//! Common test utilities for shopkit-demo-cli integration tests

use shopkit_lib::test_utils::sample_definitions;
use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;

/// Test context with temporary storage and a sample catalog file
#[allow(dead_code)]
pub struct TestContext {
    pub temp_dir: TempDir,
    pub storage_dir: PathBuf,
    pub catalog_path: PathBuf,
}

#[allow(dead_code)]
impl TestContext {
    /// Create a new test context
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let storage_dir = temp_dir.path().join("store");

        let catalog_path = temp_dir.path().join("catalog.json");
        std::fs::write(
            &catalog_path,
            serde_json::to_string_pretty(&sample_definitions()).unwrap(),
        )
        .unwrap();

        Self {
            temp_dir,
            storage_dir,
            catalog_path,
        }
    }

    /// Write a file next to the catalog and return its path
    pub fn write_file(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    /// Run the CLI with this context's storage directory
    pub fn run(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_shopkit-demo"))
            .args(args)
            .env("SHOPKIT_DEMO_DIR", &self.storage_dir)
            .env("NO_COLOR", "1")
            .output()
            .expect("Failed to execute shopkit-demo")
    }

    /// Run `simulate --json` with the sample catalog and return the report
    pub fn simulate(&self, scenario: &str) -> serde_json::Value {
        let scenario_path = self.write_file("scenario.json", scenario);
        let output = self.run(&[
            "simulate",
            "--catalog",
            self.catalog_path.to_str().unwrap(),
            "--scenario",
            scenario_path.to_str().unwrap(),
            "--json",
        ]);
        assert_success(&output);
        serde_json::from_slice(&output.stdout).expect("simulate --json prints a JSON report")
    }
}

/// Assert the command exited successfully, printing its output otherwise
#[allow(dead_code)]
pub fn assert_success(output: &Output) {
    if !output.status.success() {
        eprintln!("stdout: {}", String::from_utf8_lossy(&output.stdout));
        eprintln!("stderr: {}", String::from_utf8_lossy(&output.stderr));
    }
    assert!(output.status.success(), "command failed");
}

/// Stdout as a string
#[allow(dead_code)]
pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}
