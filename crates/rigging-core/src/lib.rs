//! Core types for the Rigging resource graph assembler.
//!
//! This crate contains:
//! - Resource nodes, reference edges and the resource graph
//! - Topological assembly with cycle detection
//! - Promotion pipeline stages
//! - Operations, fingerprints and deployed state
//! - The provisioner trait implemented by external engines

pub mod application;
pub mod error;
pub mod graph;
pub mod id;
pub mod node;
pub mod operation;
pub mod pipeline;
pub mod provisioner;
pub mod resources;
pub mod state;

pub use application::{Application, Environment, StagePlan, Synthesis};
pub use error::{Error, GraphError, GraphResult, Result};
pub use graph::{AssembledGraph, ResourceGraph};
pub use id::SynthesisId;
pub use node::{NodeKind, Properties, ReferenceEdge, ResourceNode};
pub use operation::{Operation, OperationKind};
pub use pipeline::{BOOTSTRAP_STAGE, Pipeline, PipelineStage};
pub use provisioner::{ProvisionOutcome, Provisioner};
pub use state::{DeployedResource, DeployedState};
