//! In-process property graph
//!
//! - Nodes with a label and typed properties, mergeable by an integer key
//! - Directed, typed relationships; any number between the same two nodes
//! - Hash-based label and type indices

pub mod edge;
pub mod node;
pub mod property;
pub mod store;

pub use edge::Edge;
pub use node::Node;
pub use property::{PropertyMap, PropertyValue};
pub use store::{EdgeId, EdgeType, GraphError, GraphResult, GraphStore, Label, NodeId};
