//! One ingestion run: connect (with retry), then filter, transform, stage and load
//!
//! Connection failures are waited out with a fixed backoff up to
//! `retry.max_attempts`; everything after the session is established fails the
//! run immediately.

use rayon::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::connection::ConnectionManager;
use crate::error::{IngestError, IngestResult};
use crate::loader::GraphLoader;
use crate::record::{CanonicalEdge, RawTripRecord, RecordFilter, RecordTransformer};
use crate::retry::{wait_or_cancel, CancellationToken, Sleeper, TokioSleeper};
use crate::staging::StagingWriter;
use crate::store::{GraphConnector, GraphSession};

/// Summary of a successful run
#[derive(Debug, Clone, PartialEq)]
pub struct LoadReport {
    pub edges_loaded: u64,
    pub nodes_created: u64,
    /// Connection attempts made, including the successful one
    pub attempts: u32,
    pub accepted: usize,
    pub rejected: usize,
    pub staging_path: PathBuf,
}

/// Run states. `Succeeded` and `Exhausted` are terminal.
enum PipelineState {
    Idle,
    Connecting { attempt: u32 },
    Loading { session: Box<dyn GraphSession>, attempts: u32 },
    Succeeded(LoadReport),
    Exhausted { attempts: u32, reason: String },
}

impl PipelineState {
    fn name(&self) -> &'static str {
        match self {
            PipelineState::Idle => "Idle",
            PipelineState::Connecting { .. } => "Connecting",
            PipelineState::Loading { .. } => "Loading",
            PipelineState::Succeeded(_) => "Succeeded",
            PipelineState::Exhausted { .. } => "Exhausted",
        }
    }
}

/// Ingestion pipeline bound to one configuration and one store
pub struct Pipeline {
    config: Arc<PipelineConfig>,
    connections: ConnectionManager,
    sleeper: Arc<dyn Sleeper>,
    cancel: CancellationToken,
    filter: RecordFilter,
    transformer: RecordTransformer,
    writer: StagingWriter,
    loader: GraphLoader,
}

impl Pipeline {
    pub fn new(config: Arc<PipelineConfig>, connector: Arc<dyn GraphConnector>) -> Self {
        Self {
            connections: ConnectionManager::new(connector)
                .with_verify_timeout(config.retry.verify_timeout()),
            sleeper: Arc::new(TokioSleeper),
            cancel: CancellationToken::new(),
            filter: RecordFilter::new(config.geofence.clone()),
            transformer: RecordTransformer::new(),
            writer: StagingWriter::new(config.staging.file_name.clone()),
            loader: GraphLoader::new(config.staging.clone()),
            config,
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Filter and normalize a batch on the calling thread
    pub fn prepare(&self, records: &[RawTripRecord]) -> IngestResult<Vec<CanonicalEdge>> {
        prepare_edges(&self.filter, self.transformer, records)
    }

    /// Execute the whole run against `records`
    pub async fn run(&self, records: Vec<RawTripRecord>) -> IngestResult<LoadReport> {
        let max_attempts = self.config.retry.max_attempts;
        let mut state = PipelineState::Idle;
        let mut pending = Some(records);

        loop {
            debug!("Pipeline state: {}", state.name());
            state = match state {
                PipelineState::Idle => PipelineState::Connecting { attempt: 1 },

                PipelineState::Connecting { attempt } => {
                    if self.cancel.is_cancelled() {
                        return Err(IngestError::Cancelled { attempts: attempt - 1 });
                    }
                    info!(
                        "Connecting to graph store at {} (attempt {}/{})",
                        self.config.store.address, attempt, max_attempts
                    );

                    let outcome = tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => {
                            return Err(IngestError::Cancelled { attempts: attempt });
                        }
                        outcome = self.connections.connect(&self.config.store) => outcome,
                    };

                    match outcome {
                        Ok(session) => PipelineState::Loading { session, attempts: attempt },
                        Err(e) if e.is_retryable() => {
                            let reason = match e {
                                IngestError::ConnectionUnavailable { reason, .. } => reason,
                                other => other.to_string(),
                            };
                            if attempt >= max_attempts {
                                PipelineState::Exhausted { attempts: attempt, reason }
                            } else {
                                let backoff = self.config.retry.backoff();
                                warn!(
                                    "Graph store not ready ({}); retrying in {:?}",
                                    reason, backoff
                                );
                                if !wait_or_cancel(self.sleeper.as_ref(), backoff, &self.cancel).await {
                                    return Err(IngestError::Cancelled { attempts: attempt });
                                }
                                PipelineState::Connecting { attempt: attempt + 1 }
                            }
                        }
                        Err(other) => return Err(other),
                    }
                }

                PipelineState::Loading { session, attempts } => {
                    let records = pending.take().unwrap_or_default();
                    let result = self.load_stage(session.as_ref(), records, attempts).await;
                    if let Err(e) = session.close().await {
                        warn!("Failed to close graph store session: {}", e);
                    }
                    PipelineState::Succeeded(result?)
                }

                PipelineState::Succeeded(report) => {
                    info!(
                        "Ingestion succeeded: {} edge(s) loaded after {} connection attempt(s)",
                        report.edges_loaded, report.attempts
                    );
                    return Ok(report);
                }

                PipelineState::Exhausted { attempts, reason } => {
                    warn!("Giving up on graph store after {} attempt(s)", attempts);
                    return Err(IngestError::ConnectionUnavailable { attempts, reason });
                }
            };
        }
    }

    async fn load_stage(
        &self,
        session: &dyn GraphSession,
        records: Vec<RawTripRecord>,
        attempts: u32,
    ) -> IngestResult<LoadReport> {
        let total = records.len();
        let filter = self.filter.clone();
        let transformer = self.transformer;
        let writer = self.writer.clone();
        let dir = self.config.staging.dir.clone();

        // rayon work and blocking file I/O must not occupy an async worker
        let (accepted, staging_path) = tokio::task::spawn_blocking(move || -> IngestResult<(usize, PathBuf)> {
            let edges = prepare_edges(&filter, transformer, &records)?;
            info!(
                "{} of {} record(s) passed the geofence filter",
                edges.len(),
                records.len()
            );

            let staging_path = writer.write(&edges, &dir)?;
            let staged_bytes = std::fs::metadata(&staging_path).map(|m| m.len()).unwrap_or(0);
            if staged_bytes == 0 {
                return Err(IngestError::Staging(format!(
                    "{} is missing or empty after write",
                    staging_path.display()
                )));
            }
            Ok((edges.len(), staging_path))
        })
        .await
        .map_err(|e| IngestError::Staging(format!("staging task failed: {}", e)))??;

        self.loader.ensure_schema(session).await?;
        let outcome = self.loader.load(session, &staging_path).await?;

        Ok(LoadReport {
            edges_loaded: outcome.edges_loaded,
            nodes_created: outcome.nodes_created,
            attempts,
            accepted,
            rejected: total - accepted,
            staging_path,
        })
    }
}

/// Records are independent, so filtering and normalizing runs on rayon
fn prepare_edges(
    filter: &RecordFilter,
    transformer: RecordTransformer,
    records: &[RawTripRecord],
) -> IngestResult<Vec<CanonicalEdge>> {
    records
        .par_iter()
        .filter(|record| filter.accept(record))
        .map(|record| transformer.transform(record))
        .collect()
}
