//! Deployed state: what the provisioning engine last applied.
//!
//! Synthesis compares against this snapshot to choose between create and
//! update and to skip unchanged nodes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::node::{NodeKind, Properties};
use crate::operation::Operation;
use crate::provisioner::ProvisionOutcome;

/// Record of one applied node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployedResource {
    pub resource_type: NodeKind,
    pub fingerprint: String,
    /// Values reported by the provider (ids, URIs, ...).
    #[serde(default)]
    pub outputs: Properties,
    pub updated_at: DateTime<Utc>,
}

/// Snapshot of applied nodes keyed by node id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeployedState {
    #[serde(default)]
    pub resources: BTreeMap<String, DeployedResource>,
}

impl DeployedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, node_id: &str) -> Option<&DeployedResource> {
        self.resources.get(node_id)
    }

    pub fn fingerprint(&self, node_id: &str) -> Option<&str> {
        self.resources.get(node_id).map(|r| r.fingerprint.as_str())
    }

    /// Record a successfully applied operation.
    pub fn record(&mut self, operation: &Operation, outcome: &ProvisionOutcome) {
        self.resources.insert(
            operation.node_id.clone(),
            DeployedResource {
                resource_type: operation.resource_type.clone(),
                fingerprint: operation.fingerprint.clone(),
                outputs: outcome.outputs.clone(),
                updated_at: outcome.completed_at,
            },
        );
    }

    /// Overlay entries from `other`, replacing existing ones.
    pub fn merge(&mut self, other: &DeployedState) {
        for (id, resource) in &other.resources {
            self.resources.insert(id.clone(), resource.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::ResourceNode;
    use crate::operation::OperationKind;
    use serde_json::json;

    fn applied(node_id: &str, memory: u64) -> (Operation, ProvisionOutcome) {
        let node = ResourceNode::new(node_id, NodeKind::Function).with_property("memory", memory);
        let op = Operation::for_node(OperationKind::Create, &node, &[], &[]);
        let outcome = ProvisionOutcome::new(node_id).with_output("arn", format!("arn:{node_id}"));
        (op, outcome)
    }

    #[test]
    fn test_record_and_lookup() {
        let mut state = DeployedState::new();
        let (op, outcome) = applied("handler", 128);
        state.record(&op, &outcome);

        assert_eq!(state.fingerprint("handler"), Some(op.fingerprint.as_str()));
        assert_eq!(
            state.get("handler").unwrap().outputs["arn"],
            json!("arn:handler")
        );
        assert!(state.fingerprint("missing").is_none());
    }

    #[test]
    fn test_merge_overrides() {
        let mut base = DeployedState::new();
        let (old, outcome) = applied("handler", 128);
        base.record(&old, &outcome);
        let (keep, outcome) = applied("other", 64);
        base.record(&keep, &outcome);

        let mut newer = DeployedState::new();
        let (new, outcome) = applied("handler", 256);
        newer.record(&new, &outcome);

        base.merge(&newer);
        assert_eq!(base.len(), 2);
        assert_eq!(base.fingerprint("handler"), Some(new.fingerprint.as_str()));
    }

    #[test]
    fn test_state_json_roundtrip() {
        let mut state = DeployedState::new();
        let (op, outcome) = applied("handler", 128);
        state.record(&op, &outcome);

        let text = serde_json::to_string(&state).unwrap();
        let back: DeployedState = serde_json::from_str(&text).unwrap();
        assert_eq!(back, state);
    }
}
