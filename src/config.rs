//! Run configuration
//!
//! One [`PipelineConfig`] is built at start-up (defaults, optionally a YAML
//! file, then CLI overrides) and shared read-only for the rest of the run.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{IngestError, IngestResult};
use crate::record::ZoneSet;

/// Address and credentials of the graph store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreEndpoint {
    /// Base URL, e.g. `http://localhost:7474`
    pub address: String,
    /// Database name on the server
    pub database: String,
    pub username: String,
    pub password: String,
}

impl Default for StoreEndpoint {
    fn default() -> Self {
        Self {
            address: "http://localhost:7474".to_string(),
            database: "neo4j".to_string(),
            username: "neo4j".to_string(),
            password: String::new(),
        }
    }
}

/// Zone set and trip-quality thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeofenceConfig {
    pub zones: ZoneSet,
    /// Trips must be strictly longer than this
    pub min_distance: f64,
    /// Trips must cost strictly more than this
    pub min_fare: f64,
}

impl Default for GeofenceConfig {
    fn default() -> Self {
        Self {
            zones: ZoneSet::bronx(),
            min_distance: 0.1,
            min_fare: 2.5,
        }
    }
}

/// Where the staging artifact is written and how the store refers to it.
///
/// `dir` is the pipeline's view of the store's import root; `import_uri_base`
/// is the prefix the store's import facility resolves against that root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StagingConfig {
    pub dir: PathBuf,
    pub file_name: String,
    pub import_uri_base: String,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("/var/lib/neo4j/import"),
            file_name: "trips.csv".to_string(),
            import_uri_base: "file:///".to_string(),
        }
    }
}

/// Bounded retry for connection establishment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_secs: u64,
    /// Upper bound on one reachability check, so a store that accepts
    /// connections but never answers still counts as a failed attempt
    pub verify_timeout_secs: u64,
}

impl RetryPolicy {
    pub fn backoff(&self) -> Duration {
        Duration::from_secs(self.backoff_secs)
    }

    pub fn verify_timeout(&self) -> Duration {
        Duration::from_secs(self.verify_timeout_secs)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            backoff_secs: 10,
            verify_timeout_secs: 15,
        }
    }
}

/// Names of the input columns the reader projects
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnMapping {
    pub pickup_datetime: String,
    pub dropoff_datetime: String,
    pub pickup_zone: String,
    pub dropoff_zone: String,
    pub trip_distance: String,
    pub fare_amount: String,
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self {
            pickup_datetime: "tpep_pickup_datetime".to_string(),
            dropoff_datetime: "tpep_dropoff_datetime".to_string(),
            pickup_zone: "PULocationID".to_string(),
            dropoff_zone: "DOLocationID".to_string(),
            trip_distance: "trip_distance".to_string(),
            fare_amount: "fare_amount".to_string(),
        }
    }
}

/// Complete configuration for one ingestion run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub store: StoreEndpoint,
    pub geofence: GeofenceConfig,
    pub staging: StagingConfig,
    pub retry: RetryPolicy,
    pub columns: ColumnMapping,
}

impl PipelineConfig {
    /// Parse a YAML document; absent keys keep their defaults
    pub fn from_yaml_str(yaml: &str) -> IngestResult<Self> {
        let config: PipelineConfig =
            serde_yaml::from_str(yaml).map_err(|e| IngestError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> IngestResult<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| IngestError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_yaml_str(&yaml)
    }

    pub fn validate(&self) -> IngestResult<()> {
        if self.geofence.zones.is_empty() {
            return Err(IngestError::Config("geofence zone set is empty".to_string()));
        }
        if self.geofence.min_distance < 0.0 || self.geofence.min_fare < 0.0 {
            return Err(IngestError::Config(
                "distance and fare thresholds must be non-negative".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(IngestError::Config("retry.max_attempts must be at least 1".to_string()));
        }
        if self.retry.verify_timeout_secs == 0 {
            return Err(IngestError::Config(
                "retry.verify_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.staging.file_name.is_empty() {
            return Err(IngestError::Config("staging.file_name is empty".to_string()));
        }
        Ok(())
    }
}
