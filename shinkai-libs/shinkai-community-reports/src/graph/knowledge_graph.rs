use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub description: String,
    /// Node degree, refreshed by `assign_degree_ranks` before extraction starts.
    pub rank: u64,
    /// Titles of every community report this node took part in, in insertion order.
    #[serde(default)]
    pub communities: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub description: String,
}

/// Undirected entity graph. Nodes are keyed by entity name.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeGraph {
    nodes: HashMap<String, GraphNode>,
    edges: HashMap<(String, String), GraphEdge>,
    adjacency: HashMap<String, HashSet<String>>,
}

fn edge_key(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

impl KnowledgeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a node, or replaces the description of an existing one.
    pub fn add_node(&mut self, name: &str, description: &str) {
        self.nodes.entry(name.to_string()).or_default().description = description.to_string();
        self.adjacency.entry(name.to_string()).or_default();
    }

    /// Inserts or replaces an edge. Missing endpoints are created with an empty description.
    pub fn add_edge(&mut self, source: &str, target: &str, description: &str) {
        for endpoint in [source, target] {
            if !self.nodes.contains_key(endpoint) {
                self.add_node(endpoint, "");
            }
        }
        self.adjacency.entry(source.to_string()).or_default().insert(target.to_string());
        self.adjacency.entry(target.to_string()).or_default().insert(source.to_string());
        self.edges.insert(
            edge_key(source, target),
            GraphEdge {
                description: description.to_string(),
            },
        );
    }

    pub fn node(&self, name: &str) -> Option<&GraphNode> {
        self.nodes.get(name)
    }

    pub fn edge(&self, a: &str, b: &str) -> Option<&GraphEdge> {
        self.edges.get(&edge_key(a, b))
    }

    pub fn assign_degree_ranks(&mut self) {
        for (name, node) in self.nodes.iter_mut() {
            node.rank = self.adjacency.get(name).map_or(0, |neighbors| neighbors.len()) as u64;
        }
    }

    /// Records `title` on every listed entity that exists in the graph. A title is stored once
    /// per node even if several reports share it.
    pub fn add_community_title(&mut self, entities: &[String], title: &str) {
        for entity in entities {
            if let Some(node) = self.nodes.get_mut(entity) {
                if !node.communities.iter().any(|existing| existing == title) {
                    node.communities.push(title.to_string());
                }
            }
        }
    }
}
