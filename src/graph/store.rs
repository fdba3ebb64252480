//! In-memory graph storage
//!
//! Backs [`crate::store::memory::MemoryStore`]. Nodes can be merged by an
//! integer key property (create if absent, reuse if present); relationships
//! are always created fresh.

use super::edge::Edge;
use super::node::Node;
use super::property::{PropertyMap, PropertyValue};
use rustc_hash::{FxHashMap, FxHashSet};
use std::fmt;
use thiserror::Error;

macro_rules! arena_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u64);

        impl $name {
            /// Arena slot; ids start at 1
            fn slot(self) -> Option<usize> {
                (self.0 as usize).checked_sub(1)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

macro_rules! name_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(String);

        impl $name {
            pub fn new(name: impl Into<String>) -> Self {
                $name(name.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(name: &str) -> Self {
                $name(name.to_string())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

arena_id!(
    /// Identifier of a node, assigned by the store
    NodeId
);
arena_id!(
    /// Identifier of a relationship, assigned by the store
    EdgeId
);
name_type!(
    /// Node label, e.g. `Location`
    Label
);
name_type!(
    /// Relationship type, e.g. `TRIP`
    EdgeType
);

#[derive(Error, Debug, PartialEq)]
pub enum GraphError {
    #[error("Invalid edge: source node {0} does not exist")]
    InvalidEdgeSource(NodeId),

    #[error("Invalid edge: target node {0} does not exist")]
    InvalidEdgeTarget(NodeId),

    #[error("Unable to create constraint: nodes {first} and {second} both have :{label}({key}) = {value}")]
    ConstraintViolation {
        label: Label,
        key: String,
        value: i64,
        first: NodeId,
        second: NodeId,
    },
}

pub type GraphResult<T> = Result<T, GraphError>;

/// In-memory property graph.
///
/// - nodes / edges: arenas indexed by `id - 1`
/// - outgoing: adjacency list per node
/// - label_index / edge_type_index: lookups by label and type
/// - merge_index: (label, key, value) -> node, for merge-by-key
#[derive(Debug, Default)]
pub struct GraphStore {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    outgoing: Vec<Vec<EdgeId>>,
    label_index: FxHashMap<Label, Vec<NodeId>>,
    edge_type_index: FxHashMap<EdgeType, Vec<EdgeId>>,
    merge_index: FxHashMap<(Label, String, i64), NodeId>,
    unique_constraints: FxHashSet<(Label, String)>,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn create_node(&mut self, label: Label) -> NodeId {
        let node_id = NodeId(self.nodes.len() as u64 + 1);
        self.label_index.entry(label.clone()).or_default().push(node_id);
        self.nodes.push(Node::new(node_id, label));
        self.outgoing.push(Vec::new());
        node_id
    }

    /// Return the node whose `key` property equals `value`, creating it if absent.
    ///
    /// The boolean is true when a node was created.
    pub fn merge_node(&mut self, label: impl Into<Label>, key: &str, value: i64) -> (NodeId, bool) {
        let label = label.into();
        let index_key = (label.clone(), key.to_string(), value);
        if let Some(&existing) = self.merge_index.get(&index_key) {
            return (existing, false);
        }

        let node_id = self.create_node(label);
        if let Some(node) = node_id.slot().and_then(|idx| self.nodes.get_mut(idx)) {
            node.set_property(key, value);
        }
        self.merge_index.insert(index_key, node_id);
        (node_id, true)
    }

    /// Look up a node previously created through [`GraphStore::merge_node`]
    pub fn find_node(&self, label: &Label, key: &str, value: i64) -> Option<&Node> {
        self.merge_index
            .get(&(label.clone(), key.to_string(), value))
            .and_then(|&id| self.get_node(id))
    }

    pub fn get_node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.slot()?)
    }

    /// Create a directed relationship; parallel relationships are allowed
    pub fn create_edge(
        &mut self,
        source: NodeId,
        target: NodeId,
        edge_type: impl Into<EdgeType>,
        properties: PropertyMap,
    ) -> GraphResult<EdgeId> {
        let source_slot = source
            .slot()
            .filter(|&idx| idx < self.nodes.len())
            .ok_or(GraphError::InvalidEdgeSource(source))?;
        if self.get_node(target).is_none() {
            return Err(GraphError::InvalidEdgeTarget(target));
        }

        let edge_id = EdgeId(self.edges.len() as u64 + 1);
        let edge_type = edge_type.into();

        self.outgoing[source_slot].push(edge_id);
        self.edge_type_index.entry(edge_type.clone()).or_default().push(edge_id);
        self.edges.push(Edge {
            id: edge_id,
            source,
            target,
            edge_type,
            properties,
        });
        Ok(edge_id)
    }

    pub fn get_edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(id.slot()?)
    }

    /// All relationships from `source` to `target`
    pub fn edges_between(&self, source: NodeId, target: NodeId) -> Vec<&Edge> {
        source
            .slot()
            .and_then(|idx| self.outgoing.get(idx))
            .map(|edge_ids| {
                edge_ids
                    .iter()
                    .filter_map(|&id| self.get_edge(id))
                    .filter(|edge| edge.target == target)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn get_nodes_by_label(&self, label: &Label) -> Vec<&Node> {
        self.label_index
            .get(label)
            .map(|ids| ids.iter().filter_map(|&id| self.get_node(id)).collect())
            .unwrap_or_default()
    }

    pub fn get_edges_by_type(&self, edge_type: &EdgeType) -> Vec<&Edge> {
        self.edge_type_index
            .get(edge_type)
            .map(|ids| ids.iter().filter_map(|&id| self.get_edge(id)).collect())
            .unwrap_or_default()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Register a uniqueness constraint on `label.key`.
    ///
    /// Existing nodes are checked first; two nodes sharing a value fail the
    /// registration. Returns false if the constraint already existed.
    pub fn add_unique_constraint(&mut self, label: impl Into<Label>, key: &str) -> GraphResult<bool> {
        let label = label.into();
        let constraint = (label.clone(), key.to_string());
        if self.unique_constraints.contains(&constraint) {
            return Ok(false);
        }

        let mut seen: FxHashMap<i64, NodeId> = FxHashMap::default();
        for node in self.get_nodes_by_label(&label) {
            if let Some(PropertyValue::Integer(value)) = node.get_property(key) {
                if let Some(&first) = seen.get(value) {
                    return Err(GraphError::ConstraintViolation {
                        label,
                        key: key.to_string(),
                        value: *value,
                        first,
                        second: node.id,
                    });
                }
                seen.insert(*value, node.id);
            }
        }

        self.unique_constraints.insert(constraint);
        Ok(true)
    }

    pub fn has_unique_constraint(&self, label: &Label, key: &str) -> bool {
        self.unique_constraints.contains(&(label.clone(), key.to_string()))
    }
}
