//! Provisioner trait: the seam to an external provisioning engine.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Result;
use crate::node::Properties;
use crate::operation::Operation;

/// Result of a successfully provisioned operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisionOutcome {
    pub node_id: String,
    /// Provider-reported values such as ARNs or endpoints.
    pub outputs: Properties,
    pub completed_at: DateTime<Utc>,
}

impl ProvisionOutcome {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            outputs: Properties::new(),
            completed_at: Utc::now(),
        }
    }

    pub fn with_output(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.outputs.insert(key.into(), value.into());
        self
    }
}

/// Applies single operations against a provider.
///
/// Implementations must be safe to call concurrently: the stage applier
/// provisions independent operations in parallel.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Provisioner name (e.g., "dry-run").
    fn name(&self) -> &'static str;

    /// Create or update the node described by `operation`.
    async fn provision(&self, operation: &Operation) -> Result<ProvisionOutcome>;
}
