//! Apply command: runs the synthesis through the stage applier.

use super::{load, load_state, save_state};
use anyhow::{Context, Result};
use rigging_applier::{
    ApplyEvent, ApplyOptions, DryRunProvisioner, OperationState, StageApplier, StageState,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub async fn apply(
    path: &str,
    state_path: Option<&str>,
    concurrency: usize,
    timeout_secs: Option<u64>,
) -> Result<()> {
    let app = load(path)?;
    let prior = load_state(state_path)?;
    let synthesis = app
        .synth(prior.as_ref())
        .with_context(|| format!("Failed to synthesize {}", app.name()))?;

    if synthesis.is_noop() {
        println!("Nothing to apply for {}", synthesis.app);
        return Ok(());
    }

    println!("Applying {} ({})", synthesis.app, synthesis.id);
    let synthesis = Arc::new(synthesis);
    let options = ApplyOptions {
        concurrency,
        operation_timeout: timeout_secs.map(Duration::from_secs),
    };
    let applier = StageApplier::with_options(Arc::new(DryRunProvisioner), options);

    let (mut rx, result_handle) = applier.apply(synthesis.clone());

    while let Some(event) = rx.recv().await {
        match event {
            ApplyEvent::StageStarted { stage } => {
                println!("▶ Stage '{}' started", stage);
            }
            ApplyEvent::OperationStarted {
                stage,
                node_id,
                operation,
            } => {
                println!("  [{}] {} {}", stage, operation, node_id);
            }
            ApplyEvent::OperationCompleted {
                stage,
                node_id,
                success,
                message,
            } => {
                if !success {
                    println!(
                        "  [{}] ✗ {}: {}",
                        stage,
                        node_id,
                        message.unwrap_or_default()
                    );
                }
            }
            ApplyEvent::StageCompleted { stage, success } => {
                if success {
                    println!("✓ Stage '{}' completed successfully\n", stage);
                } else {
                    println!("✗ Stage '{}' failed\n", stage);
                }
            }
            ApplyEvent::ApplyCompleted { success } => {
                if success {
                    println!("--- Apply completed successfully ---");
                } else {
                    println!("--- Apply failed ---");
                }
            }
        }
    }

    let result = result_handle.await.context("Apply task failed")?;

    println!("\n--- Stage Summary ---");
    for (stage_name, state) in &result.stage_states {
        let status = match state {
            StageState::Succeeded => "✓ succeeded".to_string(),
            StageState::Failed { message } => format!("✗ failed: {}", message),
            StageState::Skipped { reason } => format!("⊘ skipped: {}", reason),
        };
        println!("  {} - {}", stage_name, status);
    }

    let failed = result
        .operation_states
        .values()
        .filter(|s| !matches!(s, OperationState::Succeeded))
        .count();

    // Partial progress is still recorded so the next plan only retries what failed.
    if let Some(state_path) = state_path {
        let mut merged = prior.unwrap_or_default();
        merged.merge(&result.state);
        save_state(state_path, &merged)?;
        info!(path = state_path, resources = merged.len(), "Deployed state saved");
    }

    if result.success {
        println!("\n✓ Apply succeeded!");
        Ok(())
    } else {
        anyhow::bail!("Apply failed: {} operation(s) not applied", failed);
    }
}
