//! Tripgraph
//!
//! Loads taxi trip records into a property graph: trips that start and end
//! inside a geofence become `TRIP` relationships between `Location` nodes.
//!
//! # Pipeline
//!
//! 1. [`reader`]: decode columnar input into [`RawTripRecord`]s
//! 2. [`RecordFilter`]: keep trips inside the zone set with a real distance and fare
//! 3. [`RecordTransformer`]: normalize into [`CanonicalEdge`]s
//! 4. [`StagingWriter`]: write the CSV artifact into the store's import directory
//! 5. [`GraphLoader`]: one bulk import that merges locations and creates trips
//!
//! [`Pipeline`] drives these after [`ConnectionManager`] has produced a
//! verified session, retrying the connection while the store starts up.
//!
//! # Idempotency
//!
//! Re-running a load never duplicates `Location` nodes (they are merged by
//! `zone_id`), but every run appends a fresh `TRIP` per row.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tripgraph::{HttpConnector, Pipeline, PipelineConfig};
//!
//! # async fn run() -> tripgraph::IngestResult<()> {
//! let config = Arc::new(PipelineConfig::from_yaml_file("tripgraph.yaml")?);
//! let records = tripgraph::reader::read_parquet("/data/yellow_tripdata.parquet", &config.columns)?;
//!
//! let pipeline = Pipeline::new(config, Arc::new(HttpConnector::default()));
//! let report = pipeline.run(records).await?;
//! println!("loaded {} trips", report.edges_loaded);
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

pub mod config;
pub mod connection;
pub mod error;
pub mod graph;
pub mod loader;
pub mod pipeline;
pub mod reader;
pub mod record;
pub mod retry;
pub mod staging;
pub mod store;

pub use config::{ColumnMapping, GeofenceConfig, PipelineConfig, RetryPolicy, StagingConfig, StoreEndpoint};
pub use connection::ConnectionManager;
pub use error::{IngestError, IngestResult};
pub use loader::{GraphLoader, LoadOutcome};
pub use pipeline::{LoadReport, Pipeline};
pub use record::{CanonicalEdge, RawTimestamp, RawTripRecord, RecordFilter, RecordTransformer, ZoneSet};
pub use retry::{CancellationToken, Sleeper, TokioSleeper};
pub use staging::StagingWriter;
pub use store::{GraphConnector, GraphSession, HttpConnector, MemoryStore, StoreError};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn version() -> &'static str {
    VERSION
}
