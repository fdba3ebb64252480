//! In-process graph store
//!
//! Executes the statements this crate issues against a [`GraphStore`],
//! resolving `LOAD CSV` references against a local import directory the same
//! way a server resolves them against its import root. No network needed;
//! used by tests and by the CLI's dry-run mode.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{GraphConnector, GraphSession, QueryResult, QueryStats, Statement, StoreError, StoreResult};
use crate::config::StoreEndpoint;
use crate::connection::VERIFY_QUERY;
use crate::graph::{GraphStore, PropertyMap, PropertyValue};
use crate::loader::{
    CSV_PATH_PARAM, LOCATION_CONSTRAINT_QUERY, LOCATION_KEY, LOCATION_LABEL, TRIP_IMPORT_QUERY,
    TRIP_TYPE,
};
use crate::record::iso_seconds;

const SEMANTIC_ERROR: &str = "Neo.ClientError.Statement.SemanticError";
const EXTERNAL_RESOURCE_FAILED: &str = "Neo.ClientError.Statement.ExternalResourceFailed";
const CONSTRAINT_CREATION_FAILED: &str = "Neo.ClientError.Schema.ConstraintCreationFailed";

/// Embedded store; clones share the same graph and availability state
#[derive(Clone)]
pub struct MemoryStore {
    graph: Arc<RwLock<GraphStore>>,
    import_root: PathBuf,
    import_uri_base: String,
    /// Remaining verification queries that fail before the store is "up"
    unreachable_for: Arc<AtomicU32>,
    verification_attempts: Arc<AtomicU32>,
    down: Arc<AtomicBool>,
}

impl MemoryStore {
    /// Empty store whose import root is `import_root`, referenced as `file:///`
    pub fn new(import_root: impl AsRef<Path>) -> Self {
        Self {
            graph: Arc::new(RwLock::new(GraphStore::new())),
            import_root: import_root.as_ref().to_path_buf(),
            import_uri_base: "file:///".to_string(),
            unreachable_for: Arc::new(AtomicU32::new(0)),
            verification_attempts: Arc::new(AtomicU32::new(0)),
            down: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_import_uri_base(mut self, base: impl Into<String>) -> Self {
        self.import_uri_base = base.into();
        self
    }

    /// Fail the next `attempts` verification queries, as a store still starting up would
    pub fn unreachable_for(self, attempts: u32) -> Self {
        self.unreachable_for.store(attempts, Ordering::SeqCst);
        self
    }

    /// Make every subsequent statement fail as if the server went away
    pub fn shut_down(&self) {
        self.down.store(true, Ordering::SeqCst);
    }

    /// Number of verification queries received so far
    pub fn verification_attempts(&self) -> u32 {
        self.verification_attempts.load(Ordering::SeqCst)
    }

    /// Read access to the underlying graph
    pub async fn graph(&self) -> tokio::sync::RwLockReadGuard<'_, GraphStore> {
        self.graph.read().await
    }

    fn resolve(&self, reference: &str) -> StoreResult<PathBuf> {
        let relative = reference
            .strip_prefix(self.import_uri_base.as_str())
            .ok_or_else(|| StoreError::Query {
                code: EXTERNAL_RESOURCE_FAILED.to_string(),
                message: format!("Invalid URL '{}': outside the import root", reference),
            })?;
        let relative = relative.trim_start_matches('/');
        if relative.split('/').any(|part| part == "..") {
            return Err(StoreError::Query {
                code: EXTERNAL_RESOURCE_FAILED.to_string(),
                message: format!("Invalid URL '{}': path escapes the import root", reference),
            });
        }
        Ok(self.import_root.join(relative))
    }
}

#[async_trait]
impl GraphConnector for MemoryStore {
    async fn connect(&self, _endpoint: &StoreEndpoint) -> StoreResult<Box<dyn GraphSession>> {
        Ok(Box::new(MemorySession {
            store: self.clone(),
        }))
    }
}

pub struct MemorySession {
    store: MemoryStore,
}

#[async_trait]
impl GraphSession for MemorySession {
    async fn run(&self, statement: &Statement) -> StoreResult<QueryResult> {
        if self.store.down.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection reset by peer".to_string()));
        }

        match statement.text.as_str() {
            VERIFY_QUERY => self.verify(),
            LOCATION_CONSTRAINT_QUERY => {
                let mut graph = self.store.graph.write().await;
                graph
                    .add_unique_constraint(LOCATION_LABEL, LOCATION_KEY)
                    .map_err(|e| StoreError::Query {
                        code: CONSTRAINT_CREATION_FAILED.to_string(),
                        message: e.to_string(),
                    })?;
                Ok(QueryResult::default())
            }
            TRIP_IMPORT_QUERY => self.import_trips(statement).await,
            other => Err(StoreError::Query {
                code: SEMANTIC_ERROR.to_string(),
                message: format!("Unsupported statement: {}", other),
            }),
        }
    }

    async fn close(&self) -> StoreResult<()> {
        Ok(())
    }
}

/// One CSV row after the import query's conversions
struct TripRow {
    pickup_zone: i64,
    dropoff_zone: i64,
    properties: PropertyMap,
}

impl MemorySession {
    fn verify(&self) -> StoreResult<QueryResult> {
        self.store.verification_attempts.fetch_add(1, Ordering::SeqCst);
        let still_starting = self
            .store
            .unreachable_for
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if still_starting {
            return Err(StoreError::Unavailable("connection refused".to_string()));
        }

        Ok(QueryResult {
            columns: vec!["ok".to_string()],
            rows: vec![vec![serde_json::json!(1)]],
            stats: QueryStats::default(),
        })
    }

    /// Every row is converted before any is applied, so a bad row leaves the graph untouched.
    async fn import_trips(&self, statement: &Statement) -> StoreResult<QueryResult> {
        let reference = statement
            .get_param(CSV_PATH_PARAM)
            .and_then(|v| v.as_str())
            .ok_or_else(|| StoreError::Query {
                code: SEMANTIC_ERROR.to_string(),
                message: format!("Expected parameter ${} to be a string", CSV_PATH_PARAM),
            })?;
        let path = self.store.resolve(reference)?;

        let mut reader = csv::Reader::from_path(&path).map_err(|e| StoreError::Query {
            code: EXTERNAL_RESOURCE_FAILED.to_string(),
            message: format!("Couldn't load the external resource at: {} ({})", reference, e),
        })?;

        let mut rows = Vec::new();
        for (line, raw) in reader.deserialize::<HashMap<String, String>>().enumerate() {
            let raw = raw.map_err(|e| StoreError::Query {
                code: EXTERNAL_RESOURCE_FAILED.to_string(),
                message: format!("At {} @ row {}: {}", reference, line + 1, e),
            })?;
            rows.push(convert_row(&raw).map_err(|message| StoreError::Query {
                code: SEMANTIC_ERROR.to_string(),
                message: format!("At {} @ row {}: {}", reference, line + 1, message),
            })?);
        }

        let mut graph = self.store.graph.write().await;
        let mut stats = QueryStats::default();
        for row in rows {
            let (pickup, pickup_created) = graph.merge_node(LOCATION_LABEL, LOCATION_KEY, row.pickup_zone);
            let (dropoff, dropoff_created) =
                graph.merge_node(LOCATION_LABEL, LOCATION_KEY, row.dropoff_zone);
            for created in [pickup_created, dropoff_created] {
                if created {
                    stats.nodes_created += 1;
                    stats.properties_set += 1;
                }
            }

            stats.properties_set += row.properties.len() as u64;
            graph
                .create_edge(pickup, dropoff, TRIP_TYPE, row.properties)
                .map_err(|e| StoreError::Query {
                    code: SEMANTIC_ERROR.to_string(),
                    message: e.to_string(),
                })?;
            stats.relationships_created += 1;
        }

        Ok(QueryResult {
            stats,
            ..Default::default()
        })
    }
}

fn column<'a>(row: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    row.get(name).map(|s| s.trim()).filter(|s| !s.is_empty())
}

/// `toInteger`: integers and decimal strings convert, anything else is null
fn to_integer(value: Option<&str>) -> Option<i64> {
    let value = value?;
    value
        .parse::<i64>()
        .ok()
        .or_else(|| value.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
}

/// `toFloat`: unparsable text is null
fn to_float(value: Option<&str>) -> Option<f64> {
    value?.parse::<f64>().ok()
}

/// `datetime`: null stays null, unparsable text is an error
fn to_datetime(value: Option<&str>) -> Result<Option<NaiveDateTime>, String> {
    match value {
        None => Ok(None),
        Some(text) => iso_seconds::parse(text)
            .map(Some)
            .map_err(|_| format!("Text cannot be parsed to a DateTime \"{}\"", text)),
    }
}

fn convert_row(row: &HashMap<String, String>) -> Result<TripRow, String> {
    let merge_key = |name: &str| {
        to_integer(column(row, name)).ok_or_else(|| {
            format!(
                "Cannot merge the following node because of null property value for '{}': (:{} {{{}: null}})",
                LOCATION_KEY, LOCATION_LABEL, LOCATION_KEY
            )
        })
    };
    let pickup_zone = merge_key("pickup_zone")?;
    let dropoff_zone = merge_key("dropoff_zone")?;

    let mut properties = PropertyMap::new();
    if let Some(distance) = to_float(column(row, "distance")) {
        properties.insert("distance".to_string(), PropertyValue::Float(distance));
    }
    if let Some(fare) = to_float(column(row, "fare")) {
        properties.insert("fare".to_string(), PropertyValue::Float(fare));
    }
    for name in ["pickup_dt", "dropoff_dt"] {
        if let Some(dt) = to_datetime(column(row, name))? {
            properties.insert(name.to_string(), PropertyValue::DateTime(dt));
        }
    }

    Ok(TripRow {
        pickup_zone,
        dropoff_zone,
        properties,
    })
}
