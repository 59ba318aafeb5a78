//! Resource nodes and reference edges.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Property mapping of a node. Ordered so serialized output is stable.
pub type Properties = BTreeMap<String, Value>;

/// Type tag of a declared resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum NodeKind {
    SourceRepository,
    ContainerRegistry,
    BuildProject,
    LoadBalancer,
    Cluster,
    ComputeService,
    Function,
    HttpApi,
    Role,
    Parameter,
    Secret,
    /// Any provider type Rigging has no dedicated tag for.
    Custom(String),
}

impl NodeKind {
    pub fn as_str(&self) -> &str {
        match self {
            NodeKind::SourceRepository => "source_repository",
            NodeKind::ContainerRegistry => "container_registry",
            NodeKind::BuildProject => "build_project",
            NodeKind::LoadBalancer => "load_balancer",
            NodeKind::Cluster => "cluster",
            NodeKind::ComputeService => "compute_service",
            NodeKind::Function => "function",
            NodeKind::HttpApi => "http_api",
            NodeKind::Role => "role",
            NodeKind::Parameter => "parameter",
            NodeKind::Secret => "secret",
            NodeKind::Custom(name) => name,
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for NodeKind {
    fn from(s: &str) -> Self {
        match s {
            "source_repository" => NodeKind::SourceRepository,
            "container_registry" => NodeKind::ContainerRegistry,
            "build_project" => NodeKind::BuildProject,
            "load_balancer" => NodeKind::LoadBalancer,
            "cluster" => NodeKind::Cluster,
            "compute_service" => NodeKind::ComputeService,
            "function" => NodeKind::Function,
            "http_api" => NodeKind::HttpApi,
            "role" => NodeKind::Role,
            "parameter" => NodeKind::Parameter,
            "secret" => NodeKind::Secret,
            other => NodeKind::Custom(other.to_string()),
        }
    }
}

impl From<String> for NodeKind {
    fn from(s: String) -> Self {
        NodeKind::from(s.as_str())
    }
}

impl From<NodeKind> for String {
    fn from(kind: NodeKind) -> Self {
        kind.as_str().to_string()
    }
}

/// A declared infrastructure unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceNode {
    /// Logical identifier, unique within a graph.
    pub id: String,
    /// Resource type tag.
    pub kind: NodeKind,
    /// Declared properties.
    #[serde(default)]
    pub properties: Properties,
}

impl ResourceNode {
    pub fn new(id: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            kind,
            properties: Properties::new(),
        }
    }

    /// Set a property, replacing any previous value.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Set a property only when a value is present.
    pub fn with_optional_property(
        self,
        key: impl Into<String>,
        value: Option<impl Into<Value>>,
    ) -> Self {
        match value {
            Some(v) => self.with_property(key, v),
            None => self,
        }
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }
}

/// A directed dependency from a consuming node to a producing node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReferenceEdge {
    /// Node that reads from the producer.
    pub consumer: String,
    /// Node that must exist first.
    pub producer: String,
    /// Consumer property that receives the producer value.
    /// `None` for pure ordering dependencies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// Producer attribute being read (e.g. `repository_uri`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
}

impl ReferenceEdge {
    /// The placeholder written into the consumer's properties.
    ///
    /// The provisioning engine replaces it with the producer's live value.
    pub fn token(&self) -> Value {
        let mut token = serde_json::Map::new();
        token.insert("ref".to_string(), Value::String(self.producer.clone()));
        if let Some(attribute) = &self.attribute {
            token.insert("attribute".to_string(), Value::String(attribute.clone()));
        }
        Value::Object(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_parse_and_display() {
        assert_eq!(NodeKind::from("function"), NodeKind::Function);
        assert_eq!(NodeKind::HttpApi.to_string(), "http_api");
        assert_eq!(
            NodeKind::from("dns_record"),
            NodeKind::Custom("dns_record".to_string())
        );
    }

    #[test]
    fn test_kind_serializes_as_tag() {
        let node = ResourceNode::new("repo", NodeKind::ContainerRegistry);
        let value = serde_json::to_value(&node).unwrap();
        assert_eq!(value["kind"], json!("container_registry"));

        let back: ResourceNode = serde_json::from_value(value).unwrap();
        assert_eq!(back.kind, NodeKind::ContainerRegistry);
    }

    #[test]
    fn test_reference_token() {
        let edge = ReferenceEdge {
            consumer: "handler".to_string(),
            producer: "repo".to_string(),
            field: Some("image".to_string()),
            attribute: Some("repository_uri".to_string()),
        };
        assert_eq!(
            edge.token(),
            json!({"ref": "repo", "attribute": "repository_uri"})
        );
    }

    #[test]
    fn test_optional_property() {
        let node = ResourceNode::new("fn", NodeKind::Function)
            .with_optional_property("memory", Some(512))
            .with_optional_property("timeout", None::<u64>);
        assert_eq!(node.property("memory"), Some(&json!(512)));
        assert!(node.property("timeout").is_none());
    }
}
