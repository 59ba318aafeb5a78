//! Constructors for the common resource kinds.
//!
//! Each function returns a plain [`ResourceNode`]; wiring between nodes is
//! done on the graph with `reference`/`depends_on`.

use serde_json::{Value, json};

use crate::node::{NodeKind, ResourceNode};

/// A hosted git repository used as pipeline source.
pub fn source_repository(id: &str, owner: &str, repo: &str, branch: &str) -> ResourceNode {
    ResourceNode::new(id, NodeKind::SourceRepository)
        .with_property("owner", owner)
        .with_property("repo", repo)
        .with_property("branch", branch)
}

/// A container image registry.
///
/// `max_image_count` adds a lifecycle rule expiring older images.
pub fn container_registry(
    id: &str,
    repository_name: &str,
    max_image_count: Option<u32>,
) -> ResourceNode {
    ResourceNode::new(id, NodeKind::ContainerRegistry)
        .with_property("repository_name", repository_name)
        .with_optional_property(
            "lifecycle_rules",
            max_image_count.map(|count| json!([{ "max_image_count": count }])),
        )
}

/// A build runner project.
pub fn build_project(id: &str, build_image: &str, compute_type: &str, privileged: bool) -> ResourceNode {
    ResourceNode::new(id, NodeKind::BuildProject)
        .with_property("build_image", build_image)
        .with_property("compute_type", compute_type)
        .with_property("privileged", privileged)
}

pub fn load_balancer(id: &str, internet_facing: bool) -> ResourceNode {
    ResourceNode::new(id, NodeKind::LoadBalancer).with_property("internet_facing", internet_facing)
}

pub fn cluster(id: &str, cluster_name: &str) -> ResourceNode {
    ResourceNode::new(id, NodeKind::Cluster).with_property("cluster_name", cluster_name)
}

/// A long-running container service.
pub fn compute_service(id: &str, desired_count: u32, container_port: u16) -> ResourceNode {
    ResourceNode::new(id, NodeKind::ComputeService)
        .with_property("desired_count", desired_count)
        .with_property("container_port", container_port)
}

/// A container-image function.
pub fn function(id: &str, function_name: &str, architecture: &str) -> ResourceNode {
    ResourceNode::new(id, NodeKind::Function)
        .with_property("function_name", function_name)
        .with_property("architecture", architecture)
}

/// An HTTP API with `(method, path)` routes.
pub fn http_api(id: &str, routes: &[(&str, &str)]) -> ResourceNode {
    let routes: Vec<Value> = routes
        .iter()
        .map(|(method, path)| json!({ "method": method, "path": path }))
        .collect();
    ResourceNode::new(id, NodeKind::HttpApi).with_property("routes", routes)
}

/// An identity role assumed by a service principal.
pub fn role(id: &str, assumed_by: &str, managed_policies: &[&str]) -> ResourceNode {
    ResourceNode::new(id, NodeKind::Role)
        .with_property("assumed_by", assumed_by)
        .with_property("managed_policies", managed_policies.to_vec())
}

/// A named configuration parameter (e.g. the latest image tag).
pub fn parameter(id: &str, parameter_name: &str) -> ResourceNode {
    ResourceNode::new(id, NodeKind::Parameter).with_property("parameter_name", parameter_name)
}

/// A reference to a secret held by the external secret service.
pub fn secret(id: &str, secret_name: &str) -> ResourceNode {
    ResourceNode::new(id, NodeKind::Secret).with_property("secret_name", secret_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_lifecycle_rule() {
        let with_rule = container_registry("repo", "hello", Some(10));
        assert_eq!(
            with_rule.property("lifecycle_rules"),
            Some(&json!([{ "max_image_count": 10 }]))
        );

        let without = container_registry("repo", "hello", None);
        assert!(without.property("lifecycle_rules").is_none());
    }

    #[test]
    fn test_http_api_routes() {
        let api = http_api("api", &[("GET", "/"), ("POST", "/items")]);
        assert_eq!(api.kind, NodeKind::HttpApi);
        assert_eq!(
            api.property("routes"),
            Some(&json!([
                { "method": "GET", "path": "/" },
                { "method": "POST", "path": "/items" }
            ]))
        );
    }

    #[test]
    fn test_role_policies() {
        let role = role("build-role", "build.service", &["RegistryPowerUser"]);
        assert_eq!(
            role.property("managed_policies"),
            Some(&json!(["RegistryPowerUser"]))
        );
    }
}
