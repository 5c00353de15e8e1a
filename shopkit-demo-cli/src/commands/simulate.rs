//! Simulate command - replay a scripted store session

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use shopkit_lib::billing::{BillingResponse, PurchaseRecord, PurchaseState};
use shopkit_lib::controller::{PurchaseResult, StoreController};
use shopkit_lib::events::{EventBus, EventRecorder, StoreEvent};
use shopkit_lib::metrics::MetricsSnapshot;
use shopkit_lib::storage::JsonFileStore;
use shopkit_lib::test_utils::{MockBillingFactory, MockBillingService, TestSigner};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use crate::scenario::{Scenario, Step};
use crate::ui;

/// Outcome of one step
#[derive(Debug, Serialize)]
struct StepReport {
    step: String,
    ok: bool,
    detail: String,
}

/// Final simulation report
#[derive(Debug, Serialize)]
struct Report {
    steps: Vec<StepReport>,
    balances: BTreeMap<String, u64>,
    events: Vec<StoreEvent>,
    metrics: MetricsSnapshot,
}

pub async fn run(
    storage_dir: &Path,
    config_path: Option<&Path>,
    catalog_path: &Path,
    scenario_path: &Path,
    json: bool,
    verbose: bool,
) -> Result<()> {
    let config = super::load_config(config_path)?;
    let catalog = Arc::new(super::load_catalog(catalog_path)?);
    let scenario = Scenario::from_file(scenario_path)?;

    let billing = Arc::new(MockBillingService::new());
    if !scenario.billing_supported {
        billing.fail_setup(BillingResponse::BillingUnavailable);
    }
    for product_id in &scenario.owned {
        billing.add_owned(product_id.clone(), "");
    }

    let events = EventBus::new();
    let recorder = EventRecorder::attach(&events);
    if !json {
        events.on_event(Arc::new(|event: &StoreEvent| {
            ui::event(event.name(), &event_detail(event));
        }));
    }

    let controller = StoreController::new(
        config,
        catalog.clone(),
        Arc::new(JsonFileStore::new(storage_dir)),
        Arc::new(MockBillingFactory::new(billing.clone())),
        events,
    );

    let public_key = scenario
        .public_key
        .clone()
        .unwrap_or_else(|| billing.signer().public_key_base64().to_string());
    controller
        .initialize(
            Some(public_key.as_str()),
            Some(scenario.custom_secret.as_str()),
            scenario.assets_version,
        )
        .await
        .context("Failed to initialize store")?;
    tracing::debug!(steps = scenario.steps.len(), "store initialized, running scenario");

    let mut steps = Vec::with_capacity(scenario.steps.len());
    for (index, step) in scenario.steps.iter().enumerate() {
        if !json {
            ui::header(&format!("Step {}: {}", index + 1, step.describe()));
        }
        let report = match run_step(&controller, &billing, step).await {
            Ok(detail) => {
                if !json {
                    ui::success(&detail);
                }
                StepReport {
                    step: step.describe(),
                    ok: true,
                    detail,
                }
            }
            Err(e) => {
                if !json {
                    ui::warning(&format!("{:#}", e));
                }
                StepReport {
                    step: step.describe(),
                    ok: false,
                    detail: format!("{:#}", e),
                }
            }
        };
        steps.push(report);
    }

    let report = Report {
        steps,
        balances: catalog.balances(),
        events: recorder.events(),
        metrics: controller.metrics().snapshot(),
    };

    if json {
        ui::json(&serde_json::to_value(&report)?);
        return Ok(());
    }

    ui::header("Balances");
    for (item_id, balance) in &report.balances {
        ui::key_value(item_id, &balance.to_string());
    }

    if verbose {
        ui::header("Metrics");
        ui::json(&serde_json::to_value(&report.metrics)?);
    }

    let failed = report.steps.iter().filter(|s| !s.ok).count();
    if failed > 0 {
        ui::info(&format!("{} of {} steps failed", failed, report.steps.len()));
    }

    Ok(())
}

async fn run_step(
    controller: &StoreController,
    billing: &MockBillingService,
    step: &Step,
) -> Result<String> {
    let detail = match step {
        Step::Open => {
            controller.store_opening().await?;
            "store opened".to_string()
        }
        Step::Close => {
            controller.store_closing().await?;
            "store closed".to_string()
        }
        Step::Restore => {
            if controller.restore_transactions().await? {
                "transactions restored".to_string()
            } else {
                "restore failed".to_string()
            }
        }
        Step::Buy {
            product_id,
            payload,
        } => describe_result(&controller.buy(product_id, payload).await?),
        Step::CancelNext => {
            billing.cancel_next_purchase();
            "scripted cancellation".to_string()
        }
        Step::FailNext { response } => {
            billing.fail_next_purchase(*response);
            format!("scripted failure ({})", response)
        }
        Step::ForgeNext { product_id } => {
            let record = PurchaseRecord::new(
                product_id.clone(),
                PurchaseState::Purchased,
                Utc::now(),
                "",
            );
            billing.push_purchase_outcome(Ok(TestSigner::other().signed_purchase(record)));
            "scripted forged receipt".to_string()
        }
        Step::Refund { product_id } => {
            // Refund the most recent purchase still credited.
            let purchase_time = controller
                .ledger()
                .entry(product_id)
                .and_then(|entry| entry.latest_grant())
                .unwrap_or_else(Utc::now);
            let record = PurchaseRecord::new(
                product_id.clone(),
                PurchaseState::Refunded,
                purchase_time,
                "",
            );
            let purchase = billing.signer().signed_purchase(record);
            describe_result(&controller.handle_purchase_update(&purchase).await?)
        }
        Step::Own { product_id } => {
            billing.add_owned(product_id.clone(), "");
            format!("{} is now owned on the platform", product_id)
        }
    };
    Ok(detail)
}

fn describe_result(result: &PurchaseResult) -> String {
    match result {
        PurchaseResult::Completed(outcome) => format!("completed: {:?}", outcome),
        PurchaseResult::Cancelled => "cancelled by user".to_string(),
        PurchaseResult::Failed(response) => format!("billing failed: {}", response),
        PurchaseResult::Rejected(reason) => format!("rejected: {:?}", reason),
    }
}

fn event_detail(event: &StoreEvent) -> String {
    match event {
        StoreEvent::PurchaseStarted {
            product_id,
            item_id,
        } => format!("{} ({})", item_id, product_id),
        StoreEvent::PurchaseCompleted {
            item_id,
            developer_payload,
        } if !developer_payload.is_empty() => format!("{} payload={}", item_id, developer_payload),
        StoreEvent::PurchaseCompleted { item_id, .. }
        | StoreEvent::ItemPurchased { item_id }
        | StoreEvent::PurchaseCancelled { item_id } => item_id.clone(),
        StoreEvent::RestoreTransactions { success } => format!("success={}", success),
        StoreEvent::UnexpectedError { reason } => reason.clone(),
        _ => String::new(),
    }
}
