//! Resource graph construction and topological assembly.

use regex::Regex;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::LazyLock;

use crate::node::{ReferenceEdge, ResourceNode};
use crate::{GraphError, GraphResult};

static IDENTIFIER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_-]*$").unwrap());

/// Check that a node or stage identifier is well formed.
pub(crate) fn validate_identifier(id: &str) -> GraphResult<()> {
    if IDENTIFIER_REGEX.is_match(id) {
        Ok(())
    } else {
        Err(GraphError::InvalidIdentifier(id.to_string()))
    }
}

/// A mutable graph of declared resources and the references between them.
///
/// Mutation takes `&mut self`, so a writer always has exclusive access.
#[derive(Debug, Clone, Default)]
pub struct ResourceGraph {
    /// Nodes in declaration order.
    nodes: Vec<ResourceNode>,
    /// node_id -> position in `nodes`.
    index: HashMap<String, usize>,
    edges: Vec<ReferenceEdge>,
}

impl ResourceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node.
    pub fn declare(&mut self, node: ResourceNode) -> GraphResult<()> {
        validate_identifier(&node.id)?;
        if self.index.contains_key(&node.id) {
            return Err(GraphError::DuplicateIdentifier(node.id));
        }
        self.index.insert(node.id.clone(), self.nodes.len());
        self.nodes.push(node);
        Ok(())
    }

    /// Record that `consumer.field` reads a value produced by `producer`.
    pub fn reference(&mut self, consumer: &str, producer: &str, field: &str) -> GraphResult<()> {
        self.add_edge(ReferenceEdge {
            consumer: consumer.to_string(),
            producer: producer.to_string(),
            field: Some(field.to_string()),
            attribute: None,
        })
    }

    /// Like [`reference`](Self::reference), reading a named producer attribute.
    pub fn reference_attribute(
        &mut self,
        consumer: &str,
        producer: &str,
        field: &str,
        attribute: &str,
    ) -> GraphResult<()> {
        self.add_edge(ReferenceEdge {
            consumer: consumer.to_string(),
            producer: producer.to_string(),
            field: Some(field.to_string()),
            attribute: Some(attribute.to_string()),
        })
    }

    /// Ordering-only dependency: `consumer` is applied after `producer`.
    pub fn depends_on(&mut self, consumer: &str, producer: &str) -> GraphResult<()> {
        self.add_edge(ReferenceEdge {
            consumer: consumer.to_string(),
            producer: producer.to_string(),
            field: None,
            attribute: None,
        })
    }

    /// Add an edge. Both endpoints must be declared; identical edges are ignored.
    pub fn add_edge(&mut self, edge: ReferenceEdge) -> GraphResult<()> {
        for endpoint in [&edge.consumer, &edge.producer] {
            if !self.index.contains_key(endpoint) {
                return Err(GraphError::UnknownNode(endpoint.clone()));
            }
        }
        if !self.edges.contains(&edge) {
            self.edges.push(edge);
        }
        Ok(())
    }

    pub fn node(&self, id: &str) -> Option<&ResourceNode> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Nodes in declaration order.
    pub fn nodes(&self) -> &[ResourceNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[ReferenceEdge] {
        &self.edges
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Order the graph so every producer precedes its consumers.
    ///
    /// Uses Kahn's algorithm. Among nodes that are ready at the same time the
    /// one declared first wins, so the result is deterministic.
    pub fn assemble(&self) -> GraphResult<AssembledGraph> {
        let n = self.nodes.len();
        let mut in_degree = vec![0usize; n];
        // producer index -> consumer indices
        let mut consumers: Vec<Vec<usize>> = vec![Vec::new(); n];
        // consumer index -> producer indices
        let mut producers: Vec<Vec<usize>> = vec![Vec::new(); n];

        for edge in &self.edges {
            let c = self.index[&edge.consumer];
            let p = self.index[&edge.producer];
            if producers[c].contains(&p) {
                continue;
            }
            producers[c].push(p);
            consumers[p].push(c);
            in_degree[c] += 1;
        }

        let mut ready: BinaryHeap<Reverse<usize>> = (0..n)
            .filter(|&i| in_degree[i] == 0)
            .map(Reverse)
            .collect();
        let mut order = Vec::with_capacity(n);

        while let Some(Reverse(i)) = ready.pop() {
            order.push(i);
            for &c in &consumers[i] {
                in_degree[c] -= 1;
                if in_degree[c] == 0 {
                    ready.push(Reverse(c));
                }
            }
        }

        if order.len() < n {
            let stuck: HashSet<usize> = (0..n).filter(|&i| in_degree[i] > 0).collect();
            return Err(GraphError::CycleDetected(self.describe_cycle(&stuck, &producers)));
        }

        let mut references: HashMap<String, Vec<ReferenceEdge>> = HashMap::new();
        for edge in &self.edges {
            references
                .entry(edge.consumer.clone())
                .or_default()
                .push(edge.clone());
        }

        let mut depends_on: HashMap<String, Vec<String>> = HashMap::new();
        let position: HashMap<usize, usize> =
            order.iter().enumerate().map(|(pos, &i)| (i, pos)).collect();
        for (c, ps) in producers.iter().enumerate() {
            let mut ps = ps.clone();
            ps.sort_by_key(|p| position[p]);
            depends_on.insert(
                self.nodes[c].id.clone(),
                ps.into_iter().map(|p| self.nodes[p].id.clone()).collect(),
            );
        }

        Ok(AssembledGraph {
            order: order.into_iter().map(|i| self.nodes[i].clone()).collect(),
            depends_on,
            references,
        })
    }

    /// Walk producer links inside the unsortable remainder until a node repeats.
    ///
    /// Every node left over by Kahn's algorithm still has a producer in the
    /// remainder, so the walk always closes a loop.
    fn describe_cycle(&self, stuck: &HashSet<usize>, producers: &[Vec<usize>]) -> String {
        let Some(&start) = stuck.iter().min() else {
            return String::new();
        };

        let mut path = vec![start];
        let mut seen: HashMap<usize, usize> = HashMap::from([(start, 0)]);
        let mut current = start;

        loop {
            let Some(&next) = producers[current].iter().filter(|p| stuck.contains(p)).min()
            else {
                break;
            };
            if let Some(&pos) = seen.get(&next) {
                let mut cycle: Vec<&str> = path[pos..]
                    .iter()
                    .map(|&i| self.nodes[i].id.as_str())
                    .collect();
                cycle.push(self.nodes[next].id.as_str());
                return cycle.join(" -> ");
            }
            seen.insert(next, path.len());
            path.push(next);
            current = next;
        }

        path.iter()
            .map(|&i| self.nodes[i].id.as_str())
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}

/// The immutable, topologically ordered result of [`ResourceGraph::assemble`].
#[derive(Debug, Clone)]
pub struct AssembledGraph {
    order: Vec<ResourceNode>,
    /// node_id -> producers it depends on, in assembled order.
    depends_on: HashMap<String, Vec<String>>,
    /// node_id -> edges where it is the consumer.
    references: HashMap<String, Vec<ReferenceEdge>>,
}

impl AssembledGraph {
    /// Nodes with every producer ahead of its consumers.
    pub fn nodes(&self) -> &[ResourceNode] {
        &self.order
    }

    pub fn ids(&self) -> Vec<&str> {
        self.order.iter().map(|n| n.id.as_str()).collect()
    }

    /// Direct producers of a node.
    pub fn dependencies(&self, node_id: &str) -> &[String] {
        self.depends_on
            .get(node_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Edges consumed by a node.
    pub fn references(&self, node_id: &str) -> &[ReferenceEdge] {
        self.references
            .get(node_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn position(&self, node_id: &str) -> Option<usize> {
        self.order.iter().position(|n| n.id == node_id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
