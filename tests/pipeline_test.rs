//! End-to-end ingestion runs against the in-memory store
//!
//! Covers acceptance, rejection, empty result sets, connection retry and
//! exhaustion, cancellation, and atomic failure of a bad load.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tripgraph::graph::{Label, PropertyValue};
use tripgraph::loader::{LOCATION_KEY, LOCATION_LABEL};
use tripgraph::record::iso_seconds;
use tripgraph::store::{QueryResult, Statement, StoreResult};
use tripgraph::*;

/// Records requested delays instead of waiting
#[derive(Default)]
struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    fn total(&self) -> Duration {
        self.slept.lock().unwrap().iter().sum()
    }

    fn count(&self) -> usize {
        self.slept.lock().unwrap().len()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.slept.lock().unwrap().push(duration);
    }
}

/// Cancels the run the first time it is asked to wait
struct CancellingSleeper {
    cancel: CancellationToken,
}

#[async_trait]
impl Sleeper for CancellingSleeper {
    async fn sleep(&self, _duration: Duration) {
        self.cancel.cancel();
        std::future::pending::<()>().await;
    }
}

/// Store that accepts sessions but never answers a statement
struct SilentStore;

struct SilentSession;

#[async_trait]
impl GraphSession for SilentSession {
    async fn run(&self, _statement: &Statement) -> StoreResult<QueryResult> {
        std::future::pending().await
    }

    async fn close(&self) -> StoreResult<()> {
        Ok(())
    }
}

#[async_trait]
impl GraphConnector for SilentStore {
    async fn connect(&self, _endpoint: &StoreEndpoint) -> StoreResult<Box<dyn GraphSession>> {
        Ok(Box::new(SilentSession))
    }
}

fn trip(pickup: i64, dropoff: i64, distance: f64, fare: f64) -> RawTripRecord {
    RawTripRecord {
        pickup_datetime: Some(RawTimestamp::Text("2024-01-05 08:15:30.250".to_string())),
        dropoff_datetime: Some(RawTimestamp::Text("2024-01-05 08:31:02".to_string())),
        pickup_zone: Some(pickup),
        dropoff_zone: Some(dropoff),
        trip_distance: Some(distance),
        fare_amount: Some(fare),
    }
}

fn config_for(dir: &TempDir) -> Arc<PipelineConfig> {
    let mut config = PipelineConfig::default();
    config.staging.dir = dir.path().to_path_buf();
    Arc::new(config)
}

fn pipeline(dir: &TempDir, store: &MemoryStore, sleeper: Arc<RecordingSleeper>) -> Pipeline {
    Pipeline::new(config_for(dir), Arc::new(store.clone())).with_sleeper(sleeper)
}

#[tokio::test]
async fn test_accepted_trip_is_loaded_as_edge_between_locations() {
    let dir = TempDir::new().unwrap();
    let store = MemoryStore::new(dir.path());
    let sleeper = Arc::new(RecordingSleeper::default());

    let report = pipeline(&dir, &store, sleeper.clone())
        .run(vec![trip(3, 18, 1.2, 9.0)])
        .await
        .unwrap();

    assert_eq!(report.edges_loaded, 1);
    assert_eq!(report.nodes_created, 2);
    assert_eq!(report.attempts, 1);
    assert_eq!(report.accepted, 1);
    assert_eq!(report.rejected, 0);
    assert_eq!(report.staging_path, dir.path().join("trips.csv"));
    assert_eq!(sleeper.count(), 0);

    let graph = store.graph().await;
    let location = Label::new(LOCATION_LABEL);
    let pickup = graph.find_node(&location, LOCATION_KEY, 3).expect("Location(3)");
    let dropoff = graph.find_node(&location, LOCATION_KEY, 18).expect("Location(18)");
    let trips = graph.edges_between(pickup.id, dropoff.id);
    assert_eq!(trips.len(), 1);

    let edge = trips[0];
    assert_eq!(edge.edge_type.as_str(), "TRIP");
    assert_eq!(edge.get_property("distance"), Some(&PropertyValue::Float(1.2)));
    assert_eq!(edge.get_property("fare"), Some(&PropertyValue::Float(9.0)));
    assert_eq!(
        edge.get_property("pickup_dt"),
        Some(&PropertyValue::DateTime(iso_seconds::parse("2024-01-05T08:15:30").unwrap()))
    );
    assert_eq!(
        edge.get_property("dropoff_dt"),
        Some(&PropertyValue::DateTime(iso_seconds::parse("2024-01-05T08:31:02").unwrap()))
    );
    assert!(graph.has_unique_constraint(&location, LOCATION_KEY));
}

#[tokio::test]
async fn test_rejected_trip_reaches_neither_artifact_nor_store() {
    let dir = TempDir::new().unwrap();
    let store = MemoryStore::new(dir.path());

    let report = pipeline(&dir, &store, Arc::default())
        .run(vec![trip(3, 18, 1.2, 9.0), trip(999, 18, 1.2, 9.0)])
        .await
        .unwrap();

    assert_eq!(report.accepted, 1);
    assert_eq!(report.rejected, 1);

    let staged = staging::read_edges(&report.staging_path).unwrap();
    assert_eq!(staged.len(), 1);
    assert!(staged.iter().all(|edge| edge.pickup_zone != 999));

    let graph = store.graph().await;
    assert!(graph.find_node(&Label::new(LOCATION_LABEL), LOCATION_KEY, 999).is_none());
    assert_eq!(graph.node_count(), 2);
    assert_eq!(graph.edge_count(), 1);
}

#[tokio::test]
async fn test_all_rejected_fails_with_empty_result_set_and_clears_stale_artifact() {
    let dir = TempDir::new().unwrap();
    let store = MemoryStore::new(dir.path());
    let stale = dir.path().join("trips.csv");
    std::fs::write(
        &stale,
        "pickup_dt,dropoff_dt,pickup_zone,dropoff_zone,distance,fare\n\
         2023-12-31T23:00:00,2023-12-31T23:10:00,3,18,1.0,5.0\n",
    )
    .unwrap();

    let err = pipeline(&dir, &store, Arc::default())
        .run(vec![trip(999, 18, 1.2, 9.0), trip(3, 18, 0.05, 9.0), trip(3, 18, 1.2, 2.0)])
        .await
        .unwrap_err();

    assert!(matches!(err, IngestError::EmptyResultSet));
    assert!(!err.is_retryable());
    assert!(!stale.exists());
    assert_eq!(store.graph().await.edge_count(), 0);
}

#[tokio::test]
async fn test_store_reachable_on_fourth_attempt() {
    let dir = TempDir::new().unwrap();
    let store = MemoryStore::new(dir.path()).unreachable_for(3);
    let sleeper = Arc::new(RecordingSleeper::default());

    let report = pipeline(&dir, &store, sleeper.clone())
        .run(vec![trip(3, 18, 1.2, 9.0)])
        .await
        .unwrap();

    assert_eq!(report.attempts, 4);
    assert_eq!(report.edges_loaded, 1);
    assert_eq!(sleeper.count(), 3);
    assert_eq!(sleeper.total(), Duration::from_secs(30));
    assert_eq!(store.verification_attempts(), 4);
}

#[tokio::test]
async fn test_store_never_reachable_exhausts_retries_without_loading() {
    let dir = TempDir::new().unwrap();
    let store = MemoryStore::new(dir.path()).unreachable_for(u32::MAX);
    let sleeper = Arc::new(RecordingSleeper::default());

    let err = pipeline(&dir, &store, sleeper.clone())
        .run(vec![trip(3, 18, 1.2, 9.0)])
        .await
        .unwrap_err();

    match err {
        IngestError::ConnectionUnavailable { attempts, reason } => {
            assert_eq!(attempts, 10);
            assert!(reason.contains("connection refused"), "reason: {reason}");
        }
        other => panic!("unexpected error: {other}"),
    }
    // no wait after the final attempt
    assert_eq!(sleeper.count(), 9);
    assert_eq!(store.verification_attempts(), 10);
    assert!(!dir.path().join("trips.csv").exists());
    assert_eq!(store.graph().await.edge_count(), 0);
}

#[tokio::test]
async fn test_custom_retry_policy() {
    let dir = TempDir::new().unwrap();
    let store = MemoryStore::new(dir.path()).unreachable_for(u32::MAX);
    let sleeper = Arc::new(RecordingSleeper::default());

    let mut config = PipelineConfig::default();
    config.staging.dir = dir.path().to_path_buf();
    config.retry = RetryPolicy {
        max_attempts: 2,
        backoff_secs: 1,
        ..Default::default()
    };

    let err = Pipeline::new(Arc::new(config), Arc::new(store.clone()))
        .with_sleeper(sleeper.clone())
        .run(vec![trip(3, 18, 1.2, 9.0)])
        .await
        .unwrap_err();

    assert!(matches!(err, IngestError::ConnectionUnavailable { attempts: 2, .. }));
    assert_eq!(sleeper.total(), Duration::from_secs(1));
}

#[tokio::test]
async fn test_cancellation_aborts_backoff() {
    let dir = TempDir::new().unwrap();
    let store = MemoryStore::new(dir.path()).unreachable_for(u32::MAX);
    let cancel = CancellationToken::new();

    let err = Pipeline::new(config_for(&dir), Arc::new(store.clone()))
        .with_sleeper(Arc::new(CancellingSleeper { cancel: cancel.clone() }))
        .with_cancellation(cancel)
        .run(vec![trip(3, 18, 1.2, 9.0)])
        .await
        .unwrap_err();

    assert!(matches!(err, IngestError::Cancelled { attempts: 1 }));
    assert_eq!(store.verification_attempts(), 1);
}

#[tokio::test]
async fn test_cancelled_before_start_makes_no_attempt() {
    let dir = TempDir::new().unwrap();
    let store = MemoryStore::new(dir.path());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = Pipeline::new(config_for(&dir), Arc::new(store.clone()))
        .with_cancellation(cancel)
        .run(vec![trip(3, 18, 1.2, 9.0)])
        .await
        .unwrap_err();

    assert!(matches!(err, IngestError::Cancelled { attempts: 0 }));
    assert_eq!(store.verification_attempts(), 0);
}

#[tokio::test]
async fn test_malformed_timestamp_is_terminal() {
    let dir = TempDir::new().unwrap();
    let store = MemoryStore::new(dir.path());
    let sleeper = Arc::new(RecordingSleeper::default());
    let mut bad = trip(3, 18, 1.2, 9.0);
    bad.dropoff_datetime = Some(RawTimestamp::Text("31/31/2024".to_string()));

    let err = pipeline(&dir, &store, sleeper.clone())
        .run(vec![trip(3, 18, 1.2, 9.0), bad])
        .await
        .unwrap_err();

    assert!(matches!(err, IngestError::MalformedTimestamp { field: "dropoff", .. }));
    assert_eq!(store.verification_attempts(), 1);
    assert_eq!(sleeper.count(), 0);
    assert_eq!(store.graph().await.edge_count(), 0);
}

#[tokio::test]
async fn test_store_failure_during_load_is_not_retried() {
    let dir = TempDir::new().unwrap();
    let store = MemoryStore::new(dir.path()).with_import_uri_base("s3://bucket/");
    let sleeper = Arc::new(RecordingSleeper::default());

    let err = pipeline(&dir, &store, sleeper.clone())
        .run(vec![trip(3, 18, 1.2, 9.0)])
        .await
        .unwrap_err();

    match err {
        IngestError::LoadFailed { diagnostic } => {
            assert!(diagnostic.contains("file:///trips.csv"), "diagnostic: {diagnostic}");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(sleeper.count(), 0);
    assert_eq!(store.verification_attempts(), 1);
    assert_eq!(store.graph().await.node_count(), 0);
}

#[tokio::test]
async fn test_large_batch_is_loaded_completely() {
    let dir = TempDir::new().unwrap();
    let store = MemoryStore::new(dir.path());
    let zones = [3, 18, 20, 31, 32];
    let records: Vec<RawTripRecord> = (0..500)
        .map(|i| trip(zones[i % 5], zones[(i + 1) % 5], 1.0 + i as f64, 10.0))
        .chain((0..100).map(|_| trip(1, 2, 1.0, 10.0)))
        .collect();

    let report = pipeline(&dir, &store, Arc::default()).run(records).await.unwrap();

    assert_eq!(report.accepted, 500);
    assert_eq!(report.rejected, 100);
    assert_eq!(report.edges_loaded, 500);
    assert_eq!(report.nodes_created, 5);

    let graph = store.graph().await;
    assert_eq!(graph.node_count(), 5);
    assert_eq!(graph.edge_count(), 500);
}

#[tokio::test]
async fn test_silent_store_counts_as_failed_attempts() {
    let dir = TempDir::new().unwrap();
    let sleeper = Arc::new(RecordingSleeper::default());
    let mut config = PipelineConfig::default();
    config.staging.dir = dir.path().to_path_buf();
    config.retry = RetryPolicy {
        max_attempts: 2,
        backoff_secs: 10,
        verify_timeout_secs: 1,
    };

    let pipeline = Pipeline::new(Arc::new(config), Arc::new(SilentStore))
        .with_sleeper(sleeper.clone());
    let run = pipeline.run(vec![trip(3, 18, 1.2, 9.0)]);
    let err = tokio::time::timeout(Duration::from_secs(30), run)
        .await
        .expect("each attempt is bounded by the verification timeout")
        .unwrap_err();

    match err {
        IngestError::ConnectionUnavailable { attempts, reason } => {
            assert_eq!(attempts, 2);
            assert!(reason.contains("no answer"), "reason: {reason}");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(sleeper.count(), 1);
}

#[tokio::test]
async fn test_cancellation_interrupts_connection_attempt() {
    let dir = TempDir::new().unwrap();
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let pipeline = Pipeline::new(config_for(&dir), Arc::new(SilentStore))
        .with_cancellation(cancel);
    let run = pipeline.run(vec![trip(3, 18, 1.2, 9.0)]);
    let err = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("cancel must not wait for the verification timeout")
        .unwrap_err();

    assert!(matches!(err, IngestError::Cancelled { attempts: 1 }));
    assert!(!dir.path().join("trips.csv").exists());
}
