//! Provisioner that only logs what it would do.

use async_trait::async_trait;
use rigging_core::{Operation, ProvisionOutcome, Provisioner, Result};
use tracing::info;

/// Accepts every operation without calling a provider.
///
/// Outputs carry a synthetic `id` so later reads of the deployed state
/// look like a real apply.
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunProvisioner;

impl DryRunProvisioner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Provisioner for DryRunProvisioner {
    fn name(&self) -> &'static str {
        "dry-run"
    }

    async fn provision(&self, operation: &Operation) -> Result<ProvisionOutcome> {
        info!(
            node = %operation.node_id,
            resource_type = %operation.resource_type,
            operation = %operation.operation,
            depends_on = ?operation.depends_on,
            "Would provision"
        );
        Ok(ProvisionOutcome::new(operation.node_id.clone())
            .with_output("id", format!("dry-run/{}", operation.node_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rigging_core::{NodeKind, OperationKind, ResourceNode};
    use serde_json::json;

    #[tokio::test]
    async fn test_dry_run_outcome() {
        let node = ResourceNode::new("repo", NodeKind::ContainerRegistry);
        let op = Operation::for_node(OperationKind::Create, &node, &[], &[]);

        let outcome = DryRunProvisioner::new().provision(&op).await.unwrap();
        assert_eq!(outcome.node_id, "repo");
        assert_eq!(outcome.outputs["id"], json!("dry-run/repo"));
    }
}
