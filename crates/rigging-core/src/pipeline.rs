//! Promotion pipeline stages.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::graph::{AssembledGraph, ResourceGraph, validate_identifier};
use crate::{GraphError, GraphResult};

/// Name of the implicit stage holding nodes not assigned to any declared stage.
pub const BOOTSTRAP_STAGE: &str = "bootstrap";

/// An ordered step of the promotion pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStage {
    /// Stage name (e.g., "build", "deploy").
    pub name: String,
    /// Ids of the nodes applied in this stage.
    pub nodes: Vec<String>,
    /// Stage that must complete before this one starts.
    pub predecessor: Option<String>,
}

/// Stages in declared order.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    stages: Vec<PipelineStage>,
    /// node_id -> stage name.
    assignments: HashMap<String, String>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage. Its predecessor is the previously added stage.
    pub fn add_stage<I, S>(&mut self, name: &str, nodes: I) -> GraphResult<&PipelineStage>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        validate_identifier(name)?;
        if name == BOOTSTRAP_STAGE || self.stage(name).is_some() {
            return Err(GraphError::DuplicateIdentifier(name.to_string()));
        }

        let mut stage_nodes: Vec<String> = Vec::new();
        for node in nodes {
            let node = node.into();
            if let Some(stage) = self.assignments.get(&node) {
                return Err(GraphError::NodeAlreadyStaged {
                    node,
                    stage: stage.clone(),
                });
            }
            if stage_nodes.contains(&node) {
                return Err(GraphError::NodeAlreadyStaged {
                    node,
                    stage: name.to_string(),
                });
            }
            stage_nodes.push(node);
        }

        for node in &stage_nodes {
            self.assignments.insert(node.clone(), name.to_string());
        }
        let predecessor = self.stages.last().map(|s| s.name.clone());
        self.stages.push(PipelineStage {
            name: name.to_string(),
            nodes: stage_nodes,
            predecessor,
        });
        Ok(&self.stages[self.stages.len() - 1])
    }

    pub fn stages(&self) -> &[PipelineStage] {
        &self.stages
    }

    pub fn stage(&self, name: &str) -> Option<&PipelineStage> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Stage a node is assigned to, if any.
    pub fn stage_of(&self, node_id: &str) -> Option<&str> {
        self.assignments.get(node_id).map(|s| s.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Check every staged node is declared in `graph`.
    pub fn validate(&self, graph: &ResourceGraph) -> GraphResult<()> {
        for stage in &self.stages {
            for node in &stage.nodes {
                if !graph.contains(node) {
                    return Err(GraphError::UnknownNode(node.clone()));
                }
            }
        }
        Ok(())
    }

    /// Split an assembled graph into stages, keeping assembled order inside each.
    ///
    /// Unassigned nodes go into a leading [`BOOTSTRAP_STAGE`] when there are any.
    /// Fails if a node depends on a node in a later stage.
    pub fn partition(&self, assembled: &AssembledGraph) -> GraphResult<Vec<PipelineStage>> {
        let has_bootstrap = assembled
            .nodes()
            .iter()
            .any(|n| !self.assignments.contains_key(&n.id));

        let mut planned: Vec<PipelineStage> = Vec::with_capacity(self.stages.len() + 1);
        if has_bootstrap {
            planned.push(PipelineStage {
                name: BOOTSTRAP_STAGE.to_string(),
                nodes: Vec::new(),
                predecessor: None,
            });
        }
        for stage in &self.stages {
            planned.push(PipelineStage {
                name: stage.name.clone(),
                nodes: Vec::new(),
                predecessor: planned.last().map(|s| s.name.clone()),
            });
        }

        let offset = usize::from(has_bootstrap);
        let stage_index: HashMap<&str, usize> = self
            .stages
            .iter()
            .enumerate()
            .map(|(i, s)| (s.name.as_str(), i + offset))
            .collect();
        let index_of = |node_id: &str| -> usize {
            self.stage_of(node_id)
                .and_then(|s| stage_index.get(s).copied())
                .unwrap_or(0)
        };

        for node in assembled.nodes() {
            let consumer_idx = index_of(&node.id);
            for producer in assembled.dependencies(&node.id) {
                let producer_idx = index_of(producer);
                if producer_idx > consumer_idx {
                    return Err(GraphError::StageOrderViolation {
                        consumer: node.id.clone(),
                        consumer_stage: planned[consumer_idx].name.clone(),
                        producer: producer.clone(),
                        producer_stage: planned[producer_idx].name.clone(),
                    });
                }
            }
            planned[consumer_idx].nodes.push(node.id.clone());
        }

        Ok(planned)
    }
}
