//! Graph store connectivity
//!
//! [`GraphConnector`] opens sessions, [`GraphSession`] executes parameterized
//! statements. Two implementations:
//!
//! - [`http::HttpConnector`] talks to a running store over its transactional
//!   HTTP endpoint.
//! - [`memory::MemoryStore`] runs in-process against a [`crate::graph::GraphStore`]
//!   and a local import directory. Used by tests and dry runs.

pub mod http;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::StoreEndpoint;

pub use http::HttpConnector;
pub use memory::MemoryStore;

/// Errors raised by store adapters
#[derive(Error, Debug)]
pub enum StoreError {
    /// The store could not be reached or refused the session
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// The store rejected a statement
    #[error("Query error [{code}]: {message}")]
    Query { code: String, message: String },

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A statement with named parameters (`$name` in the text)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statement {
    #[serde(rename = "statement")]
    pub text: String,
    pub parameters: serde_json::Map<String, serde_json::Value>,
}

impl Statement {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            parameters: serde_json::Map::new(),
        }
    }

    pub fn param(mut self, name: &str, value: impl Into<serde_json::Value>) -> Self {
        self.parameters.insert(name.to_string(), value.into());
        self
    }

    pub fn get_param(&self, name: &str) -> Option<&serde_json::Value> {
        self.parameters.get(name)
    }
}

/// Write counters reported by the store for one statement
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryStats {
    pub nodes_created: u64,
    pub relationships_created: u64,
    pub properties_set: u64,
}

/// Result of executing one statement
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
    pub stats: QueryStats,
}

impl QueryResult {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// First column of the first row
    pub fn single_value(&self) -> Option<&serde_json::Value> {
        self.rows.first().and_then(|row| row.first())
    }
}

/// A live, authenticated handle to the graph store
#[async_trait]
pub trait GraphSession: Send + Sync {
    /// Execute one statement in its own transaction
    async fn run(&self, statement: &Statement) -> StoreResult<QueryResult>;

    /// Release the session
    async fn close(&self) -> StoreResult<()>;
}

/// Opens sessions against a store endpoint.
///
/// Opening a session does not have to touch the network; reachability is
/// checked separately by [`crate::connection::ConnectionManager`].
#[async_trait]
pub trait GraphConnector: Send + Sync {
    async fn connect(&self, endpoint: &StoreEndpoint) -> StoreResult<Box<dyn GraphSession>>;
}
