//! Synthesis and plan commands.

use super::{load, load_state};
use anyhow::{Context, Result};
use rigging_core::{OperationKind, Synthesis};

fn synthesize(path: &str, state_path: Option<&str>) -> Result<Synthesis> {
    let app = load(path)?;
    let prior = load_state(state_path)?;
    app.synth(prior.as_ref())
        .with_context(|| format!("Failed to synthesize {}", app.name()))
}

/// Print or write the staged operation list as JSON.
pub fn synth(path: &str, state_path: Option<&str>, out: Option<&str>) -> Result<()> {
    let synthesis = synthesize(path, state_path)?;
    let json = serde_json::to_string_pretty(&synthesis)?;

    match out {
        Some(out) => {
            std::fs::write(out, json)
                .with_context(|| format!("Failed to write synthesis: {}", out))?;
            println!("Wrote synthesis {} to {}", synthesis.id, out);
        }
        None => println!("{}", json),
    }
    Ok(())
}

/// Print a human-readable summary of the synthesis.
pub fn plan(path: &str, state_path: Option<&str>) -> Result<()> {
    let synthesis = synthesize(path, state_path)?;

    println!("Plan for {} ({})", synthesis.app, synthesis.id);
    let mut creates = 0;
    let mut updates = 0;
    for stage in &synthesis.stages {
        match &stage.predecessor {
            Some(prev) => println!("\nStage '{}' (after '{}')", stage.name, prev),
            None => println!("\nStage '{}'", stage.name),
        }
        for op in &stage.operations {
            let marker = match op.operation {
                OperationKind::Create => {
                    creates += 1;
                    "+"
                }
                OperationKind::Update => {
                    updates += 1;
                    "~"
                }
            };
            if op.depends_on.is_empty() {
                println!("  {} {} [{}]", marker, op.node_id, op.resource_type);
            } else {
                println!(
                    "  {} {} [{}] <- {}",
                    marker,
                    op.node_id,
                    op.resource_type,
                    op.depends_on.join(", ")
                );
            }
        }
        for id in &stage.unchanged {
            println!("  = {}", id);
        }
    }

    for id in &synthesis.orphaned {
        println!("\n  ! {} is deployed but no longer declared", id);
    }

    if synthesis.is_noop() {
        println!("\nNo changes.");
    } else {
        println!("\n{} to create, {} to update", creates, updates);
    }
    Ok(())
}
