//! Stage applier - provisions a synthesis stage by stage.

use futures::StreamExt;
use rigging_core::{
    DeployedState, Error, Operation, OperationKind, ProvisionOutcome, Provisioner, StagePlan,
    Synthesis,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Final state of a stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageState {
    Succeeded,
    Failed { message: String },
    Skipped { reason: String },
}

impl StageState {
    pub fn is_success(&self) -> bool {
        matches!(self, StageState::Succeeded)
    }
}

/// Final state of one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationState {
    Succeeded,
    Failed { message: String },
    Skipped { reason: String },
}

/// Event emitted during an apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyEvent {
    StageStarted {
        stage: String,
    },
    OperationStarted {
        stage: String,
        node_id: String,
        operation: OperationKind,
    },
    OperationCompleted {
        stage: String,
        node_id: String,
        success: bool,
        message: Option<String>,
    },
    StageCompleted {
        stage: String,
        success: bool,
    },
    ApplyCompleted {
        success: bool,
    },
}

/// Result of an apply.
#[derive(Debug)]
pub struct ApplyResult {
    pub success: bool,
    /// Stage states in pipeline order.
    pub stage_states: Vec<(String, StageState)>,
    pub operation_states: HashMap<String, OperationState>,
    /// Nodes applied during this run.
    pub state: DeployedState,
}

impl ApplyResult {
    pub fn stage_state(&self, stage: &str) -> Option<&StageState> {
        self.stage_states
            .iter()
            .find(|(name, _)| name == stage)
            .map(|(_, state)| state)
    }
}

#[derive(Debug, Clone)]
pub struct ApplyOptions {
    /// Maximum operations provisioned at once within a stage.
    pub concurrency: usize,
    /// Per-operation time limit.
    pub operation_timeout: Option<Duration>,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            operation_timeout: None,
        }
    }
}

/// Feeds the operations of a synthesis to a provisioner.
pub struct StageApplier {
    provisioner: Arc<dyn Provisioner>,
    options: ApplyOptions,
}

impl StageApplier {
    pub fn new(provisioner: Arc<dyn Provisioner>) -> Self {
        Self {
            provisioner,
            options: ApplyOptions::default(),
        }
    }

    pub fn with_options(provisioner: Arc<dyn Provisioner>, options: ApplyOptions) -> Self {
        Self {
            provisioner,
            options,
        }
    }

    /// Apply a synthesis, returning a channel of events and a handle to get the final result.
    ///
    /// The synthesis is only read, so the same `Arc` can be handed to other
    /// consumers while the apply runs.
    pub fn apply(
        &self,
        synthesis: Arc<Synthesis>,
    ) -> (
        mpsc::Receiver<ApplyEvent>,
        tokio::task::JoinHandle<ApplyResult>,
    ) {
        let (tx, rx) = mpsc::channel(100);
        let provisioner = self.provisioner.clone();
        let options = self.options.clone();

        let handle = tokio::spawn(async move {
            Self::apply_inner(provisioner, options, synthesis, tx).await
        });

        (rx, handle)
    }

    async fn apply_inner(
        provisioner: Arc<dyn Provisioner>,
        options: ApplyOptions,
        synthesis: Arc<Synthesis>,
        tx: mpsc::Sender<ApplyEvent>,
    ) -> ApplyResult {
        info!(
            synthesis = %synthesis.id,
            app = %synthesis.app,
            provisioner = provisioner.name(),
            stages = synthesis.stages.len(),
            "Applying synthesis"
        );

        let mut state = DeployedState::new();
        let mut operation_states = HashMap::new();
        let mut stage_states = Vec::with_capacity(synthesis.stages.len());
        let mut failed_stage: Option<String> = None;

        for stage in &synthesis.stages {
            if let Some(failed) = &failed_stage {
                let reason = format!("stage '{}' failed", failed);
                info!(stage = %stage.name, %reason, "Skipping stage");
                for op in &stage.operations {
                    operation_states.insert(
                        op.node_id.clone(),
                        OperationState::Skipped {
                            reason: reason.clone(),
                        },
                    );
                }
                stage_states.push((stage.name.clone(), StageState::Skipped { reason }));
                continue;
            }

            let _ = tx
                .send(ApplyEvent::StageStarted {
                    stage: stage.name.clone(),
                })
                .await;
            info!(
                stage = %stage.name,
                operations = stage.operations.len(),
                unchanged = stage.unchanged.len(),
                "Stage started"
            );

            match Self::apply_stage(
                &provisioner,
                &options,
                stage,
                &tx,
                &mut state,
                &mut operation_states,
            )
            .await
            {
                Ok(()) => {
                    info!(stage = %stage.name, "Stage completed successfully");
                    stage_states.push((stage.name.clone(), StageState::Succeeded));
                    let _ = tx
                        .send(ApplyEvent::StageCompleted {
                            stage: stage.name.clone(),
                            success: true,
                        })
                        .await;
                }
                Err(message) => {
                    error!(stage = %stage.name, error = %message, "Stage failed");
                    failed_stage = Some(stage.name.clone());
                    stage_states.push((stage.name.clone(), StageState::Failed { message }));
                    let _ = tx
                        .send(ApplyEvent::StageCompleted {
                            stage: stage.name.clone(),
                            success: false,
                        })
                        .await;
                }
            }
        }

        let success = failed_stage.is_none();
        let _ = tx.send(ApplyEvent::ApplyCompleted { success }).await;

        ApplyResult {
            success,
            stage_states,
            operation_states,
            state,
        }
    }

    /// Apply one stage in dependency waves.
    ///
    /// Dependencies outside the stage are already satisfied: earlier stages
    /// succeeded or the node was unchanged.
    async fn apply_stage(
        provisioner: &Arc<dyn Provisioner>,
        options: &ApplyOptions,
        stage: &StagePlan,
        tx: &mpsc::Sender<ApplyEvent>,
        state: &mut DeployedState,
        operation_states: &mut HashMap<String, OperationState>,
    ) -> Result<(), String> {
        let in_stage: HashSet<&str> = stage
            .operations
            .iter()
            .map(|op| op.node_id.as_str())
            .collect();
        let mut done: HashSet<String> = HashSet::new();
        let mut blocked: HashSet<String> = HashSet::new();
        let mut failures: Vec<String> = Vec::new();
        let mut remaining: Vec<&Operation> = stage.operations.iter().collect();

        while !remaining.is_empty() {
            let mut ready = Vec::new();
            let mut waiting = Vec::new();
            let mut skipped_any = false;

            // Operations are in dependency order, so a skip propagates within one pass.
            for op in remaining {
                if let Some(dep) = op.depends_on.iter().find(|d| blocked.contains(*d)) {
                    let reason = format!("dependency '{}' was not applied", dep);
                    warn!(stage = %stage.name, node = %op.node_id, %reason, "Skipping operation");
                    let _ = tx
                        .send(ApplyEvent::OperationCompleted {
                            stage: stage.name.clone(),
                            node_id: op.node_id.clone(),
                            success: false,
                            message: Some(reason.clone()),
                        })
                        .await;
                    operation_states.insert(op.node_id.clone(), OperationState::Skipped { reason });
                    blocked.insert(op.node_id.clone());
                    failures.push(op.node_id.clone());
                    skipped_any = true;
                } else if op
                    .depends_on
                    .iter()
                    .all(|d| !in_stage.contains(d.as_str()) || done.contains(d))
                {
                    ready.push(op);
                } else {
                    waiting.push(op);
                }
            }

            if ready.is_empty() {
                if !skipped_any {
                    let stuck: Vec<&str> = waiting.iter().map(|op| op.node_id.as_str()).collect();
                    return Err(format!("unsatisfiable dependencies for {:?}", stuck));
                }
                remaining = waiting;
                continue;
            }

            let stage_name = stage.name.clone();
            let timeout = options.operation_timeout;
            let results: Vec<(Operation, rigging_core::Result<ProvisionOutcome>)> =
                futures::stream::iter(ready.into_iter().cloned())
                    .map(move |op| {
                        let provisioner = provisioner.clone();
                        let stage = stage_name.clone();
                        let tx = tx.clone();
                        async move {
                            let _ = tx
                                .send(ApplyEvent::OperationStarted {
                                    stage: stage.clone(),
                                    node_id: op.node_id.clone(),
                                    operation: op.operation,
                                })
                                .await;
                            info!(
                                %stage,
                                node = %op.node_id,
                                operation = %op.operation,
                                "Provisioning"
                            );
                            let result = Self::provision_one(provisioner, timeout, &op).await;
                            (op, result)
                        }
                    })
                    .buffer_unordered(options.concurrency.max(1))
                    .collect()
                    .await;

            for (op, result) in results {
                match result {
                    Ok(outcome) => {
                        info!(stage = %stage.name, node = %op.node_id, "Provisioned");
                        state.record(&op, &outcome);
                        done.insert(op.node_id.clone());
                        operation_states.insert(op.node_id.clone(), OperationState::Succeeded);
                        let _ = tx
                            .send(ApplyEvent::OperationCompleted {
                                stage: stage.name.clone(),
                                node_id: op.node_id.clone(),
                                success: true,
                                message: None,
                            })
                            .await;
                    }
                    Err(e) => {
                        error!(stage = %stage.name, node = %op.node_id, error = %e, "Provisioning failed");
                        blocked.insert(op.node_id.clone());
                        failures.push(op.node_id.clone());
                        operation_states.insert(
                            op.node_id.clone(),
                            OperationState::Failed {
                                message: e.to_string(),
                            },
                        );
                        let _ = tx
                            .send(ApplyEvent::OperationCompleted {
                                stage: stage.name.clone(),
                                node_id: op.node_id.clone(),
                                success: false,
                                message: Some(e.to_string()),
                            })
                            .await;
                    }
                }
            }

            remaining = waiting;
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(format!(
                "{} operation(s) not applied: {}",
                failures.len(),
                failures.join(", ")
            ))
        }
    }

    async fn provision_one(
        provisioner: Arc<dyn Provisioner>,
        timeout: Option<Duration>,
        op: &Operation,
    ) -> rigging_core::Result<ProvisionOutcome> {
        match timeout {
            Some(limit) => tokio::time::timeout(limit, provisioner.provision(op))
                .await
                .map_err(|_| Error::Timeout(format!("'{}' exceeded {:?}", op.node_id, limit)))?,
            None => provisioner.provision(op).await,
        }
    }
}
