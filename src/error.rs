//! Error types for the ingestion pipeline

use thiserror::Error;

use crate::store::StoreError;

/// Errors that can terminate an ingestion run
#[derive(Error, Debug)]
pub enum IngestError {
    /// The graph store could not be reached and verified
    #[error("Graph store unavailable after {attempts} attempt(s): {reason}")]
    ConnectionUnavailable { attempts: u32, reason: String },

    /// Every input record was rejected by the filter
    #[error("No records survived filtering; refusing to load an empty result set")]
    EmptyResultSet,

    /// The bulk import was rejected by the store
    #[error("Bulk load failed: {diagnostic}")]
    LoadFailed { diagnostic: String },

    /// A timestamp on an accepted record could not be parsed
    #[error("Malformed {field} timestamp: {value:?}")]
    MalformedTimestamp { field: &'static str, value: String },

    /// Writing the staging artifact failed
    #[error("Staging error: {0}")]
    Staging(String),

    /// Columnar input could not be decoded
    #[error("Read error: {0}")]
    Read(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// The caller cancelled the run between connection attempts
    #[error("Ingestion cancelled after {attempts} connection attempt(s)")]
    Cancelled { attempts: u32 },
}

impl IngestError {
    /// Whether the pipeline's outer loop may retry after this error.
    ///
    /// Only store reachability is transient; data and load failures need a human.
    pub fn is_retryable(&self) -> bool {
        matches!(self, IngestError::ConnectionUnavailable { .. })
    }

    pub(crate) fn load_failed(err: StoreError) -> Self {
        IngestError::LoadFailed {
            diagnostic: err.to_string(),
        }
    }
}

impl From<csv::Error> for IngestError {
    fn from(err: csv::Error) -> Self {
        IngestError::Staging(err.to_string())
    }
}

impl From<parquet::errors::ParquetError> for IngestError {
    fn from(err: parquet::errors::ParquetError) -> Self {
        IngestError::Read(err.to_string())
    }
}

impl From<arrow::error::ArrowError> for IngestError {
    fn from(err: arrow::error::ArrowError) -> Self {
        IngestError::Read(err.to_string())
    }
}

pub type IngestResult<T> = Result<T, IngestError>;
