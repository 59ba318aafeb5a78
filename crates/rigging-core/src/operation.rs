//! Operations emitted by a synthesis pass.

use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

use crate::node::{NodeKind, Properties, ReferenceEdge, ResourceNode};

/// What the provisioning engine should do with a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Create,
    Update,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationKind::Create => write!(f, "create"),
            OperationKind::Update => write!(f, "update"),
        }
    }
}

/// One entry of the ordered operation list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub operation: OperationKind,
    pub node_id: String,
    pub resource_type: NodeKind,
    /// Declared properties with reference tokens filled in.
    pub properties: Properties,
    /// Producers that must be applied first.
    pub depends_on: Vec<String>,
    /// Hex SHA-256 of type, properties and dependencies.
    pub fingerprint: String,
}

impl Operation {
    /// Build the operation for `node`, writing a token for each referenced field.
    ///
    /// A reference token replaces any literal value declared for the same field.
    pub fn for_node(
        kind: OperationKind,
        node: &ResourceNode,
        references: &[ReferenceEdge],
        depends_on: &[String],
    ) -> Self {
        let mut properties = node.properties.clone();
        for edge in references {
            if let Some(field) = &edge.field {
                properties.insert(field.clone(), edge.token());
            }
        }

        let fingerprint = fingerprint(&node.kind, &properties, depends_on);
        Self {
            operation: kind,
            node_id: node.id.clone(),
            resource_type: node.kind.clone(),
            properties,
            depends_on: depends_on.to_vec(),
            fingerprint,
        }
    }
}

/// Content hash of everything that affects how a node is provisioned.
///
/// Dependencies are hashed as a set: the apply order of independent
/// producers follows declaration order and must not change the hash.
pub fn fingerprint(kind: &NodeKind, properties: &Properties, depends_on: &[String]) -> String {
    let depends_on: BTreeSet<&str> = depends_on.iter().map(String::as_str).collect();
    // serde_json objects are BTreeMap-backed, so this rendering is canonical.
    let canonical = json!({
        "kind": kind.as_str(),
        "properties": properties,
        "depends_on": depends_on,
    })
    .to_string();
    hex::encode(Sha256::digest(canonical.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(field: &str, producer: &str) -> ReferenceEdge {
        ReferenceEdge {
            consumer: "svc".to_string(),
            producer: producer.to_string(),
            field: Some(field.to_string()),
            attribute: None,
        }
    }

    #[test]
    fn test_reference_token_overrides_literal() {
        let node = ResourceNode::new("svc", NodeKind::ComputeService)
            .with_property("image", "placeholder")
            .with_property("port", 8080);
        let op = Operation::for_node(
            OperationKind::Create,
            &node,
            &[edge("image", "repo")],
            &["repo".to_string()],
        );

        assert_eq!(op.properties["image"], json!({"ref": "repo"}));
        assert_eq!(op.properties["port"], json!(8080));
        assert_eq!(op.depends_on, vec!["repo"]);
    }

    #[test]
    fn test_fingerprint_is_stable_and_sensitive() {
        let a = ResourceNode::new("svc", NodeKind::Function).with_property("memory", 128);
        let b = ResourceNode::new("svc", NodeKind::Function).with_property("memory", 256);

        let fa = Operation::for_node(OperationKind::Create, &a, &[], &[]).fingerprint;
        let fa_again = Operation::for_node(OperationKind::Update, &a, &[], &[]).fingerprint;
        let fb = Operation::for_node(OperationKind::Create, &b, &[], &[]).fingerprint;

        assert_eq!(fa, fa_again);
        assert_ne!(fa, fb);
        assert_eq!(fa.len(), 64);
    }

    #[test]
    fn test_fingerprint_ignores_dependency_order() {
        let node = ResourceNode::new("svc", NodeKind::ComputeService);
        let deps = ["left".to_string(), "right".to_string()];
        let swapped = ["right".to_string(), "left".to_string()];

        let a = Operation::for_node(OperationKind::Create, &node, &[], &deps);
        let b = Operation::for_node(OperationKind::Create, &node, &[], &swapped);

        assert_eq!(a.fingerprint, b.fingerprint);
        assert_eq!(b.depends_on, vec!["right", "left"]);
        assert_ne!(
            a.fingerprint,
            Operation::for_node(OperationKind::Create, &node, &[], &deps[..1]).fingerprint
        );
    }

    #[test]
    fn test_operation_json_shape() {
        let node = ResourceNode::new("repo", NodeKind::ContainerRegistry);
        let op = Operation::for_node(OperationKind::Update, &node, &[], &[]);
        let value = serde_json::to_value(&op).unwrap();

        assert_eq!(value["operation"], json!("update"));
        assert_eq!(value["node_id"], json!("repo"));
        assert_eq!(value["resource_type"], json!("container_registry"));
        assert_eq!(value["depends_on"], json!([]));
    }
}
