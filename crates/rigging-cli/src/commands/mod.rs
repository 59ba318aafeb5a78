//! CLI command implementations.

pub mod apply;
pub mod synth;

use anyhow::{Context, Result};
use rigging_config::{VariableContext, load_application};
use rigging_core::{Application, DeployedState, GraphResult};
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, warn};

/// Variables available to every command: process environment and CI git metadata.
fn variable_context() -> VariableContext {
    let mut vars = VariableContext::new();
    vars.populate_env();
    vars.populate_git_from_env();
    vars
}

fn load(path: &str) -> Result<Application> {
    load_application(path, &variable_context())
        .with_context(|| format!("Failed to load application config: {}", path))
}

/// Read deployed state, treating a missing file as empty.
fn load_state(path: Option<&str>) -> Result<Option<DeployedState>> {
    let Some(path) = path else {
        return Ok(None);
    };
    if !Path::new(path).exists() {
        debug!(path, "No deployed state yet");
        return Ok(Some(DeployedState::new()));
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read state file: {}", path))?;
    let state = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse state file: {}", path))?;
    Ok(Some(state))
}

fn save_state(path: &str, state: &DeployedState) -> Result<()> {
    let json = serde_json::to_string_pretty(state)?;
    std::fs::write(path, json).with_context(|| format!("Failed to write state file: {}", path))
}

/// Outcome of validating an application.
#[derive(Debug)]
struct ValidationReport {
    resources: usize,
    stages: usize,
    /// (node id, variable) pairs left uninterpolated.
    unresolved: Vec<(String, String)>,
    /// Secrets the external secret service must provide.
    secrets: BTreeSet<String>,
}

/// Run the same graph and pipeline checks as `synth`, then scan property values
/// for leftover variables.
fn check(app: &Application, vars: &VariableContext) -> GraphResult<ValidationReport> {
    let assembled = app.validate()?;

    let mut unresolved = Vec::new();
    let mut secrets = BTreeSet::new();
    for node in assembled.nodes() {
        let mut strings = Vec::new();
        for value in node.properties.values() {
            collect_strings(value, &mut strings);
        }
        for s in strings {
            for var in vars.find_unresolved(s) {
                unresolved.push((node.id.clone(), var));
            }
            secrets.extend(vars.find_secrets_in_string(s));
        }
    }

    Ok(ValidationReport {
        resources: assembled.len(),
        stages: app.pipeline().stages().len(),
        unresolved,
        secrets,
    })
}

pub fn validate(path: &str) -> Result<()> {
    let app = match load(path) {
        Ok(app) => app,
        Err(e) => {
            println!("Configuration error: {:#}", e);
            std::process::exit(1);
        }
    };
    let report = match check(&app, &variable_context()) {
        Ok(report) => report,
        Err(e) => {
            println!("Graph error: {}", e);
            std::process::exit(1);
        }
    };

    for (node, var) in &report.unresolved {
        warn!(node = %node, variable = %var, "Unresolved variable");
        println!("warning: {} references unresolved variable ${{{}}}", node, var);
    }

    println!(
        "Configuration is valid: {} resources, {} stages",
        report.resources, report.stages
    );
    if !report.secrets.is_empty() {
        let names: Vec<&str> = report.secrets.iter().map(String::as_str).collect();
        println!("Secrets required: {}", names.join(", "));
    }
    if !report.unresolved.is_empty() {
        println!("{} warning(s)", report.unresolved.len());
    }
    Ok(())
}

fn collect_strings<'a>(value: &'a Value, out: &mut Vec<&'a str>) {
    match value {
        Value::String(s) => out.push(s),
        Value::Array(items) => items.iter().for_each(|v| collect_strings(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_strings(v, out)),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rigging_config::parse_application;
    use rigging_core::GraphError;

    const STAGED: &str = r#"
        app "staged"
        resource "builder" type="build_project" {
            property "token" "${secrets.GITHUB_TOKEN}"
            property "tag" "${git.sha}"
            depends_on "service"
        }
        resource "service" type="compute_service" {
            property "name" "svc-${env.STAGE}"
        }
        stage "build" {
            node "builder"
        }
        stage "deploy" {
            node "service"
        }
    "#;

    #[test]
    fn test_check_rejects_dependency_on_later_stage() {
        let app = parse_application(STAGED, &VariableContext::new()).unwrap();

        match check(&app, &VariableContext::new()) {
            Err(GraphError::StageOrderViolation {
                consumer, producer, ..
            }) => {
                assert_eq!(consumer, "builder");
                assert_eq!(producer, "service");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_check_reports_unresolved_and_secrets() {
        let kdl = STAGED.replace("depends_on \"service\"", "");
        let app = parse_application(&kdl, &VariableContext::new()).unwrap();

        let report = check(&app, &VariableContext::new()).unwrap();

        assert_eq!(report.resources, 2);
        assert_eq!(report.stages, 2);
        assert_eq!(
            report.unresolved,
            vec![
                ("builder".to_string(), "git.sha".to_string()),
                ("service".to_string(), "env.STAGE".to_string()),
            ]
        );
        assert_eq!(
            report.secrets.into_iter().collect::<Vec<_>>(),
            vec!["secrets.GITHUB_TOKEN"]
        );
    }
}
