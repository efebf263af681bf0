//! Resource dependency graph.
//!
//! Built from a synthesized template. An edge `A -> B` means B needs A to
//! exist first, either because B references A (`Ref`, `Fn::GetAtt`) or
//! because B lists A in `DependsOn`. This enables:
//!
//! - Reference validation (every target must be a declared resource)
//! - Cycle detection
//! - Deployment ordering
//! - Dependency visualization

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::template::{collect_references, Template};

/// A node in the graph representing one resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceNode {
    /// Logical id
    pub id: String,
    /// Resource type
    pub resource_type: String,
    /// Declaration position in the template
    pub sequence: usize,
}

/// Why one resource depends on another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DependencyType {
    /// The dependent reads an attribute or the id of the dependency
    Reference,
    /// The dependent lists the dependency in `DependsOn`
    Explicit,
}

/// An edge of the graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDependency {
    /// Logical id that must exist first
    pub from_id: String,
    /// Logical id that needs it
    pub to_id: String,
    /// Type of dependency
    pub dependency_type: DependencyType,
}

/// The dependency graph of a template's resources.
#[derive(Debug, Clone)]
pub struct ResourceGraph {
    graph: DiGraph<ResourceNode, ResourceDependency>,
    node_indices: HashMap<String, NodeIndex>,
}

impl ResourceGraph {
    /// Build the graph, failing on references to undeclared resources.
    ///
    /// Outputs are checked too, although they do not become nodes.
    pub fn from_template(template: &Template) -> Result<Self> {
        let mut graph = DiGraph::new();
        let mut node_indices = HashMap::new();

        for (sequence, (id, resource)) in template.resources.iter().enumerate() {
            let idx = graph.add_node(ResourceNode {
                id: id.clone(),
                resource_type: resource.resource_type.clone(),
                sequence,
            });
            node_indices.insert(id.clone(), idx);
        }

        for (id, resource) in &template.resources {
            let to_idx = node_indices[id];

            let mut referenced = BTreeSet::new();
            for value in resource.properties.values() {
                collect_references(value, &mut referenced);
            }

            let explicit: BTreeSet<&String> = resource.depends_on.iter().collect();

            for target in referenced.iter().chain(explicit.iter().copied()) {
                let from_idx =
                    *node_indices
                        .get(target)
                        .ok_or_else(|| Error::UnresolvedReference {
                            from: id.clone(),
                            target: target.clone(),
                        })?;
                if from_idx == to_idx {
                    return Err(Error::DependencyCycle(format!("{} -> {}", id, id)));
                }
                let dependency_type = if explicit.contains(target) {
                    DependencyType::Explicit
                } else {
                    DependencyType::Reference
                };
                if graph.find_edge(from_idx, to_idx).is_none() {
                    graph.add_edge(
                        from_idx,
                        to_idx,
                        ResourceDependency {
                            from_id: target.clone(),
                            to_id: id.clone(),
                            dependency_type,
                        },
                    );
                }
            }
        }

        for (output_id, output) in &template.outputs {
            let mut referenced = BTreeSet::new();
            collect_references(&output.value, &mut referenced);
            if let Some(missing) = referenced.iter().find(|t| !node_indices.contains_key(*t)) {
                return Err(Error::UnresolvedReference {
                    from: output_id.clone(),
                    target: missing.clone(),
                });
            }
        }

        Ok(Self {
            graph,
            node_indices,
        })
    }

    /// Check for dependency cycles.
    pub fn has_cycles(&self) -> bool {
        tarjan_scc(&self.graph).iter().any(|scc| scc.len() > 1)
    }

    /// Get all cycles in the graph.
    pub fn get_cycles(&self) -> Vec<Vec<String>> {
        tarjan_scc(&self.graph)
            .into_iter()
            .filter(|scc| scc.len() > 1)
            .map(|scc| {
                let mut ids: Vec<String> = scc
                    .into_iter()
                    .filter_map(|idx| self.graph.node_weight(idx).map(|n| n.id.clone()))
                    .collect();
                ids.sort();
                ids
            })
            .collect()
    }

    /// Order in which the engine could create the resources.
    ///
    /// Ties are broken by declaration order so the result is deterministic.
    pub fn deployment_order(&self) -> Result<Vec<String>> {
        if toposort(&self.graph, None).is_err() {
            let cycles: Vec<String> = self
                .get_cycles()
                .into_iter()
                .map(|c| c.join(" -> "))
                .collect();
            return Err(Error::DependencyCycle(cycles.join("; ")));
        }

        let mut in_degree: HashMap<NodeIndex, usize> = self
            .graph
            .node_indices()
            .map(|idx| {
                (
                    idx,
                    self.graph.edges_directed(idx, Direction::Incoming).count(),
                )
            })
            .collect();

        let mut ready: BTreeSet<(usize, NodeIndex)> = in_degree
            .iter()
            .filter(|(_, deg)| **deg == 0)
            .map(|(idx, _)| (self.graph[*idx].sequence, *idx))
            .collect();

        let mut order = Vec::with_capacity(self.graph.node_count());
        while let Some(next) = ready.iter().next().copied() {
            ready.remove(&next);
            let (_, idx) = next;
            order.push(self.graph[idx].id.clone());
            for neighbor in self.graph.neighbors_directed(idx, Direction::Outgoing) {
                if let Some(deg) = in_degree.get_mut(&neighbor) {
                    *deg -= 1;
                    if *deg == 0 {
                        ready.insert((self.graph[neighbor].sequence, neighbor));
                    }
                }
            }
        }

        Ok(order)
    }

    /// Everything that must exist before `id` (direct and transitive).
    pub fn get_dependencies(&self, id: &str) -> Vec<String> {
        self.walk(id, Direction::Incoming)
    }

    /// Everything that needs `id` (direct and transitive).
    pub fn get_dependents(&self, id: &str) -> Vec<String> {
        self.walk(id, Direction::Outgoing)
    }

    fn walk(&self, id: &str, direction: Direction) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::new();

        if let Some(&start_idx) = self.node_indices.get(id) {
            queue.push_back(start_idx);

            while let Some(current) = queue.pop_front() {
                for neighbor in self.graph.neighbors_directed(current, direction) {
                    if let Some(node) = self.graph.node_weight(neighbor) {
                        if seen.insert(node.id.clone()) {
                            queue.push_back(neighbor);
                        }
                    }
                }
            }
        }

        let mut out: Vec<String> = seen.into_iter().collect();
        out.sort();
        out
    }

    /// Direct dependencies of a resource.
    pub fn get_direct_dependencies(&self, id: &str) -> Vec<ResourceDependency> {
        self.node_indices
            .get(id)
            .map(|idx| {
                self.graph
                    .edges_directed(*idx, Direction::Incoming)
                    .map(|e| e.weight().clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether `dependent` transitively depends on `dependency`.
    pub fn depends_on(&self, dependent: &str, dependency: &str) -> bool {
        self.get_dependencies(dependent)
            .iter()
            .any(|d| d == dependency)
    }

    /// Get the number of nodes.
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Get the number of edges.
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Generate a DOT format representation for visualization.
    pub fn to_dot(&self) -> String {
        let mut output = String::new();
        output.push_str("digraph resources {\n");
        output.push_str("  rankdir=LR;\n");
        output.push_str("  node [shape=box];\n\n");

        let mut nodes: Vec<&ResourceNode> = self
            .graph
            .node_indices()
            .filter_map(|idx| self.graph.node_weight(idx))
            .collect();
        nodes.sort_by_key(|n| n.sequence);
        for node in nodes {
            output.push_str(&format!(
                "  \"{}\" [label=\"{}\\n{}\"];\n",
                node.id, node.id, node.resource_type
            ));
        }

        output.push('\n');

        let mut edges: Vec<&ResourceDependency> =
            self.graph.edge_references().map(|e| e.weight()).collect();
        edges.sort_by(|a, b| (&a.from_id, &a.to_id).cmp(&(&b.from_id, &b.to_id)));
        for edge in edges {
            let style = match edge.dependency_type {
                DependencyType::Reference => "solid",
                DependencyType::Explicit => "dashed",
            };
            output.push_str(&format!(
                "  \"{}\" -> \"{}\" [style={}];\n",
                edge.from_id, edge.to_id, style
            ));
        }

        output.push_str("}\n");
        output
    }
}
