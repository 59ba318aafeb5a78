//! Application configuration parsing.

use crate::variables::{AppContext, VariableContext};
use crate::{ConfigError, ConfigResult};
use kdl::{KdlDocument, KdlNode, KdlValue};
use rigging_core::application::{Application, Environment};
use rigging_core::node::{NodeKind, ReferenceEdge, ResourceNode};
use serde_json::{Map, Number, Value};
use std::path::Path;

/// Read and parse an application definition file.
pub fn load_application(path: impl AsRef<Path>, vars: &VariableContext) -> ConfigResult<Application> {
    let content = std::fs::read_to_string(path)?;
    parse_application(&content, vars)
}

/// Parse an application definition from KDL text.
///
/// `vars` supplies environment and git variables; the `app` and `variables`
/// nodes of the document are layered on top before resources are read.
pub fn parse_application(kdl: &str, vars: &VariableContext) -> ConfigResult<Application> {
    let doc: KdlDocument = kdl.parse()?;
    let mut vars = vars.clone();

    let app_node = doc
        .nodes()
        .iter()
        .find(|n| n.name().value() == "app")
        .ok_or_else(|| ConfigError::MissingField("app".to_string()))?;
    let (name, environment) = parse_app(app_node, &vars)?;
    vars.app = AppContext {
        name: name.clone(),
        account: environment.account.clone(),
        region: environment.region.clone(),
    };

    for node in doc.nodes() {
        if node.name().value() == "variables" {
            if let Some(children) = node.children() {
                for child in children.nodes() {
                    let name = child.name().value();
                    let val = match positional_args(child).next().map(kdl_to_json) {
                        Some(Value::String(s)) => vars.interpolate(&s),
                        Some(Value::Null) | None => {
                            return Err(ConfigError::InvalidValue {
                                field: format!("variables.{}", name),
                                message: "expected a string, number or boolean".to_string(),
                            });
                        }
                        Some(other) => other.to_string(),
                    };
                    vars.set(name, val);
                }
            }
        }
    }

    let mut app = Application::new(name).with_environment(environment);

    // References may point at resources declared further down the file.
    let mut edges = Vec::new();
    for node in doc.nodes() {
        if node.name().value() == "resource" {
            let (resource, resource_edges) = parse_resource(node, &vars)?;
            app.declare(resource)?;
            edges.extend(resource_edges);
        }
    }
    for edge in edges {
        app.add_edge(edge)?;
    }

    for node in doc.nodes() {
        if node.name().value() == "stage" {
            let (stage, nodes) = parse_stage(node)?;
            app.add_stage(&stage, nodes)?;
        }
    }
    app.pipeline().validate(app.graph())?;

    Ok(app)
}

fn parse_app(node: &KdlNode, vars: &VariableContext) -> ConfigResult<(String, Environment)> {
    let name = get_first_string_arg(node)
        .ok_or_else(|| ConfigError::MissingField("app name".to_string()))?;

    let mut account = get_string_prop(node, "account");
    let mut region = get_string_prop(node, "region");

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "account" => account = get_first_string_arg(child),
                "region" => region = get_first_string_arg(child),
                _ => {}
            }
        }
    }

    Ok((
        name,
        Environment {
            account: account.map(|a| vars.interpolate(&a)),
            region: region.map(|r| vars.interpolate(&r)),
        },
    ))
}

fn parse_resource(
    node: &KdlNode,
    vars: &VariableContext,
) -> ConfigResult<(ResourceNode, Vec<ReferenceEdge>)> {
    let id = get_first_string_arg(node)
        .ok_or_else(|| ConfigError::MissingField("resource name".to_string()))?;

    let kind = get_string_prop(node, "type")
        .ok_or_else(|| ConfigError::MissingField(format!("type for resource '{}'", id)))?;
    if kind.trim().is_empty() {
        return Err(ConfigError::InvalidValue {
            field: format!("type for resource '{}'", id),
            message: "resource type cannot be empty".to_string(),
        });
    }

    let mut resource = ResourceNode::new(id.clone(), NodeKind::from(kind.as_str()));
    let mut edges = Vec::new();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "property" => {
                    let key = get_first_string_arg(child).ok_or_else(|| {
                        ConfigError::MissingField(format!("property name in resource '{}'", id))
                    })?;
                    let value = property_value(child);
                    resource = resource.with_property(key, vars.interpolate_value(&value));
                }
                "ref" => {
                    let args = get_all_string_args(child);
                    let [field, producer] = args.as_slice() else {
                        return Err(ConfigError::InvalidValue {
                            field: format!("ref in resource '{}'", id),
                            message: "expected: ref \"<field>\" \"<producer>\"".to_string(),
                        });
                    };
                    edges.push(ReferenceEdge {
                        consumer: id.clone(),
                        producer: producer.clone(),
                        field: Some(field.clone()),
                        attribute: get_string_prop(child, "attr"),
                    });
                }
                "depends_on" | "depends-on" => {
                    for producer in get_all_string_args(child) {
                        edges.push(ReferenceEdge {
                            consumer: id.clone(),
                            producer,
                            field: None,
                            attribute: None,
                        });
                    }
                }
                _ => {}
            }
        }
    }

    Ok((resource, edges))
}

fn parse_stage(node: &KdlNode) -> ConfigResult<(String, Vec<String>)> {
    let name = get_first_string_arg(node)
        .ok_or_else(|| ConfigError::MissingField("stage name".to_string()))?;

    let mut nodes = Vec::new();
    if let Some(children) = node.children() {
        for child in children.nodes() {
            if child.name().value() == "node" {
                nodes.extend(get_all_string_args(child));
            }
        }
    }

    if nodes.is_empty() {
        return Err(ConfigError::MissingField(format!(
            "nodes for stage '{}'",
            name
        )));
    }

    Ok((name, nodes))
}

/// Value of a `property "<key>" ...` node: the arguments after the key, or
/// an object built from its child block.
fn property_value(node: &KdlNode) -> Value {
    if let Some(children) = node.children() {
        return block_value(children);
    }
    args_value(positional_args(node).skip(1).map(kdl_to_json).collect())
}

fn block_value(block: &KdlDocument) -> Value {
    let mut map = Map::new();
    for child in block.nodes() {
        let value = match child.children() {
            Some(grandchildren) => block_value(grandchildren),
            None => args_value(positional_args(child).map(kdl_to_json).collect()),
        };
        map.insert(child.name().value().to_string(), value);
    }
    Value::Object(map)
}

fn args_value(mut args: Vec<Value>) -> Value {
    match args.len() {
        0 => Value::Null,
        1 => args.remove(0),
        _ => Value::Array(args),
    }
}

fn kdl_to_json(value: &KdlValue) -> Value {
    if let Some(s) = value.as_string() {
        Value::String(s.to_string())
    } else if let Some(i) = value.as_integer() {
        i64::try_from(i)
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(i.to_string()))
    } else if let Some(f) = value.as_float() {
        Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
    } else if let Some(b) = value.as_bool() {
        Value::Bool(b)
    } else {
        Value::Null
    }
}

// Helper functions for extracting values from KDL nodes

fn positional_args(node: &KdlNode) -> impl Iterator<Item = &KdlValue> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .map(|e| e.value())
}

fn get_first_string_arg(node: &KdlNode) -> Option<String> {
    positional_args(node)
        .next()
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
}

fn get_all_string_args(node: &KdlNode) -> Vec<String> {
    positional_args(node)
        .filter_map(|v| v.as_string())
        .map(|s| s.to_string())
        .collect()
}

fn get_string_prop(node: &KdlNode, name: &str) -> Option<String> {
    node.get(name)
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
}
