//! Directed relationship of the in-memory property graph
//!
//! Any number of relationships may connect the same pair of nodes.

use super::property::{PropertyMap, PropertyValue};
use super::store::{EdgeId, EdgeType, NodeId};

#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub id: EdgeId,
    /// Edge goes FROM this node
    pub source: NodeId,
    /// Edge goes TO this node
    pub target: NodeId,
    pub edge_type: EdgeType,
    pub properties: PropertyMap,
}

impl Edge {
    pub fn get_property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }
}
