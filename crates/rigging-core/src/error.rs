//! Error types for Rigging.

use thiserror::Error;

/// Validation errors raised while building or assembling a resource graph.
///
/// Every variant is fatal to the synthesis pass.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("duplicate identifier: {0}")]
    DuplicateIdentifier(String),

    #[error("unknown node: {0}")]
    UnknownNode(String),

    #[error("cycle detected in dependencies: {0}")]
    CycleDetected(String),

    #[error("invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("node '{node}' is already assigned to stage '{stage}'")]
    NodeAlreadyStaged { node: String, stage: String },

    #[error(
        "node '{consumer}' in stage '{consumer_stage}' depends on '{producer}' in later stage '{producer_stage}'"
    )]
    StageOrderViolation {
        consumer: String,
        consumer_stage: String,
        producer: String,
        producer_stage: String,
    },
}

pub type GraphResult<T> = std::result::Result<T, GraphError>;

/// Errors reported by provisioners while applying operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("provisioning failed: {0}")]
    ProvisionFailed(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
