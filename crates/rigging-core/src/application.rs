//! Application: the explicit owner of a graph and its pipeline.
//!
//! Builder calls go through an `Application` value instead of an ambient
//! provider context. `synth` validates everything and emits the staged
//! operation list in one pass.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::graph::{AssembledGraph, ResourceGraph};
use crate::node::{ReferenceEdge, ResourceNode};
use crate::operation::{Operation, OperationKind};
use crate::pipeline::{Pipeline, PipelineStage};
use crate::state::DeployedState;
use crate::{GraphResult, SynthesisId};

/// Target account and region.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

/// A declared application.
#[derive(Debug, Clone)]
pub struct Application {
    name: String,
    environment: Environment,
    graph: ResourceGraph,
    pipeline: Pipeline,
}

impl Application {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            environment: Environment::default(),
            graph: ResourceGraph::new(),
            pipeline: Pipeline::new(),
        }
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn graph(&self) -> &ResourceGraph {
        &self.graph
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn declare(&mut self, node: ResourceNode) -> GraphResult<()> {
        self.graph.declare(node)
    }

    pub fn reference(&mut self, consumer: &str, producer: &str, field: &str) -> GraphResult<()> {
        self.graph.reference(consumer, producer, field)
    }

    pub fn reference_attribute(
        &mut self,
        consumer: &str,
        producer: &str,
        field: &str,
        attribute: &str,
    ) -> GraphResult<()> {
        self.graph
            .reference_attribute(consumer, producer, field, attribute)
    }

    pub fn depends_on(&mut self, consumer: &str, producer: &str) -> GraphResult<()> {
        self.graph.depends_on(consumer, producer)
    }

    pub fn add_edge(&mut self, edge: ReferenceEdge) -> GraphResult<()> {
        self.graph.add_edge(edge)
    }

    pub fn add_stage<I, S>(&mut self, name: &str, nodes: I) -> GraphResult<&PipelineStage>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pipeline.add_stage(name, nodes)
    }

    /// Run every check `synth` runs without producing operations.
    pub fn validate(&self) -> GraphResult<AssembledGraph> {
        let (assembled, _) = self.stage_nodes()?;
        Ok(assembled)
    }

    fn stage_nodes(&self) -> GraphResult<(AssembledGraph, Vec<PipelineStage>)> {
        let assembled = self.graph.assemble()?;
        self.pipeline.validate(&self.graph)?;
        let planned = self.pipeline.partition(&assembled)?;
        Ok((assembled, planned))
    }

    /// Turn declarations into a staged, ordered operation list.
    ///
    /// Nodes missing from `prior` become creates, nodes whose fingerprint
    /// changed become updates, and unchanged nodes are listed per stage
    /// without an operation. Nothing is emitted if any validation fails.
    pub fn synth(&self, prior: Option<&DeployedState>) -> GraphResult<Synthesis> {
        let (assembled, planned) = self.stage_nodes()?;

        let mut stages = Vec::with_capacity(planned.len());
        for stage in planned {
            let mut operations = Vec::new();
            let mut unchanged = Vec::new();

            for node_id in &stage.nodes {
                let Some(node) = self.graph.node(node_id) else {
                    continue;
                };
                let references = assembled.references(node_id);
                let depends_on = assembled.dependencies(node_id);
                let op = Operation::for_node(OperationKind::Create, node, references, depends_on);

                match prior.and_then(|p| p.fingerprint(node_id)) {
                    None => operations.push(op),
                    Some(fp) if fp == op.fingerprint => unchanged.push(node_id.clone()),
                    Some(_) => operations.push(Operation {
                        operation: OperationKind::Update,
                        ..op
                    }),
                }
            }

            stages.push(StagePlan {
                name: stage.name,
                predecessor: stage.predecessor,
                operations,
                unchanged,
            });
        }

        let orphaned = prior
            .map(|p| {
                p.resources
                    .keys()
                    .filter(|id| !self.graph.contains(id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        Ok(Synthesis {
            id: SynthesisId::new(),
            app: self.name.clone(),
            environment: self.environment.clone(),
            created_at: Utc::now(),
            stages,
            orphaned,
        })
    }
}

/// Operations for one pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagePlan {
    pub name: String,
    pub predecessor: Option<String>,
    /// Operations in dependency order.
    pub operations: Vec<Operation>,
    /// Nodes of this stage already deployed with the same fingerprint.
    #[serde(default)]
    pub unchanged: Vec<String>,
}

/// Output of one synthesis pass. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Synthesis {
    pub id: SynthesisId,
    pub app: String,
    pub environment: Environment,
    pub created_at: DateTime<Utc>,
    pub stages: Vec<StagePlan>,
    /// Previously deployed nodes that are no longer declared.
    #[serde(default)]
    pub orphaned: Vec<String>,
}

impl Synthesis {
    /// All operations across stages, in apply order.
    pub fn operations(&self) -> impl Iterator<Item = &Operation> {
        self.stages.iter().flat_map(|s| s.operations.iter())
    }

    pub fn operation(&self, node_id: &str) -> Option<&Operation> {
        self.operations().find(|op| op.node_id == node_id)
    }

    pub fn stage(&self, name: &str) -> Option<&StagePlan> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// True when nothing needs to be applied.
    pub fn is_noop(&self) -> bool {
        self.stages.iter().all(|s| s.operations.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GraphError;
    use crate::node::NodeKind;
    use crate::pipeline::BOOTSTRAP_STAGE;
    use crate::provisioner::ProvisionOutcome;
    use crate::resources::{build_project, compute_service, container_registry};
    use serde_json::json;

    fn hello_world() -> Application {
        let mut app = Application::new("HelloWorld").with_environment(Environment {
            account: Some("123456789012".to_string()),
            region: Some("eu-west-1".to_string()),
        });
        app.declare(container_registry("registry", "hello", Some(10)))
            .unwrap();
        app.declare(build_project("builder", "standard-5.0", "small", true))
            .unwrap();
        app.declare(compute_service("service", 2, 8080)).unwrap();
        app.reference("builder", "registry", "repository").unwrap();
        app.reference_attribute("service", "registry", "image", "repository_uri")
            .unwrap();
        app.depends_on("service", "builder").unwrap();
        app.add_stage("build", ["builder"]).unwrap();
        app.add_stage("deploy", ["service"]).unwrap();
        app
    }

    fn deployed(synthesis: &Synthesis) -> DeployedState {
        let mut state = DeployedState::new();
        for op in synthesis.operations() {
            state.record(op, &ProvisionOutcome::new(&op.node_id));
        }
        state
    }

    #[test]
    fn test_fresh_synth_creates_everything_in_order() {
        let synthesis = hello_world().synth(None).unwrap();

        let ids: Vec<&str> = synthesis.operations().map(|o| o.node_id.as_str()).collect();
        assert_eq!(ids, vec!["registry", "builder", "service"]);
        assert!(
            synthesis
                .operations()
                .all(|o| o.operation == OperationKind::Create)
        );

        let names: Vec<&str> = synthesis.stages.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec![BOOTSTRAP_STAGE, "build", "deploy"]);

        let service = synthesis.operation("service").unwrap();
        assert_eq!(service.depends_on, vec!["registry", "builder"]);
        assert_eq!(
            service.properties["image"],
            json!({"ref": "registry", "attribute": "repository_uri"})
        );
    }

    #[test]
    fn test_resynth_against_deployed_state_is_noop() {
        let app = hello_world();
        let first = app.synth(None).unwrap();
        let state = deployed(&first);

        let second = app.synth(Some(&state)).unwrap();
        assert!(second.is_noop());
        assert_eq!(second.stage("deploy").unwrap().unchanged, vec!["service"]);
        assert!(second.orphaned.is_empty());
    }

    #[test]
    fn test_changed_node_becomes_update() {
        let state = deployed(&hello_world().synth(None).unwrap());

        let mut app = Application::new("HelloWorld");
        app.declare(container_registry("registry", "hello", Some(5)))
            .unwrap();
        app.declare(compute_service("service", 2, 8080)).unwrap();
        app.declare(compute_service("worker", 1, 9090)).unwrap();
        app.reference_attribute("service", "registry", "image", "repository_uri")
            .unwrap();

        let synthesis = app.synth(Some(&state)).unwrap();
        let registry = synthesis.operation("registry").unwrap();
        assert_eq!(registry.operation, OperationKind::Update);
        // service lost its dependency on builder, so its fingerprint changed too
        assert_eq!(
            synthesis.operation("service").unwrap().operation,
            OperationKind::Update
        );
        assert_eq!(
            synthesis.operation("worker").unwrap().operation,
            OperationKind::Create
        );
        assert_eq!(synthesis.orphaned, vec!["builder"]);
    }

    #[test]
    fn test_reordered_independent_producers_stay_unchanged() {
        let mut app = Application::new("reorder");
        for id in ["left", "right", "svc"] {
            app.declare(ResourceNode::new(id, NodeKind::Role)).unwrap();
        }
        app.depends_on("svc", "left").unwrap();
        app.depends_on("svc", "right").unwrap();
        let prior = deployed(&app.synth(None).unwrap());

        let mut swapped = Application::new("reorder");
        for id in ["right", "left", "svc"] {
            swapped.declare(ResourceNode::new(id, NodeKind::Role)).unwrap();
        }
        swapped.depends_on("svc", "right").unwrap();
        swapped.depends_on("svc", "left").unwrap();
        let resynth = swapped.synth(Some(&prior)).unwrap();

        assert!(resynth.is_noop());
        assert_eq!(resynth.stages[0].unchanged, vec!["right", "left", "svc"]);
    }

    #[test]
    fn test_validate_rejects_dependency_on_later_stage() {
        let mut app = hello_world();
        app.declare(ResourceNode::new("smoke", NodeKind::Function))
            .unwrap();
        app.depends_on("builder", "smoke").unwrap();
        app.add_stage("verify", ["smoke"]).unwrap();

        let expected = GraphError::StageOrderViolation {
            consumer: "builder".to_string(),
            consumer_stage: "build".to_string(),
            producer: "smoke".to_string(),
            producer_stage: "verify".to_string(),
        };
        assert_eq!(app.validate().unwrap_err(), expected);
        assert_eq!(app.synth(None).unwrap_err(), expected);
    }

    #[test]
    fn test_validate_returns_assembled_order() {
        let assembled = hello_world().validate().unwrap();
        assert_eq!(assembled.ids(), vec!["registry", "builder", "service"]);
    }

    #[test]
    fn test_cycle_aborts_synthesis() {
        let mut app = Application::new("cyclic");
        app.declare(ResourceNode::new("a", crate::NodeKind::Role))
            .unwrap();
        app.declare(ResourceNode::new("b", crate::NodeKind::Role))
            .unwrap();
        app.reference("a", "b", "x").unwrap();
        app.reference("b", "a", "y").unwrap();

        assert!(matches!(app.synth(None), Err(GraphError::CycleDetected(_))));
    }

    #[test]
    fn test_synthesis_serializes() {
        let synthesis = hello_world().synth(None).unwrap();
        let value = serde_json::to_value(&synthesis).unwrap();

        assert_eq!(value["app"], json!("HelloWorld"));
        assert_eq!(value["environment"]["region"], json!("eu-west-1"));
        assert_eq!(value["stages"][1]["operations"][0]["operation"], json!("create"));
        assert_eq!(value["stages"][2]["predecessor"], json!("build"));
    }
}
