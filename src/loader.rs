//! Bulk import of the staging artifact into the graph store
//!
//! One statement per load: stream the artifact, merge a `Location` for each
//! endpoint zone, create one `TRIP` per row. Locations are deduplicated by
//! `zone_id`; trips are not, so loading the same artifact twice doubles the
//! trips but not the locations.

use std::path::{Component, Path};
use tracing::{debug, info};

use crate::config::StagingConfig;
use crate::error::{IngestError, IngestResult};
use crate::store::{GraphSession, Statement};

pub const LOCATION_LABEL: &str = "Location";
pub const LOCATION_KEY: &str = "zone_id";
pub const TRIP_TYPE: &str = "TRIP";

/// Parameter carrying the store-resolvable artifact reference
pub const CSV_PATH_PARAM: &str = "csv_path";

pub const LOCATION_CONSTRAINT_QUERY: &str =
    "CREATE CONSTRAINT location_zone_id IF NOT EXISTS FOR (l:Location) REQUIRE l.zone_id IS UNIQUE";

pub const TRIP_IMPORT_QUERY: &str = "LOAD CSV WITH HEADERS FROM $csv_path AS row
MERGE (pickup:Location {zone_id: toInteger(row.pickup_zone)})
MERGE (dropoff:Location {zone_id: toInteger(row.dropoff_zone)})
CREATE (pickup)-[:TRIP {
    distance: toFloat(row.distance),
    fare: toFloat(row.fare),
    pickup_dt: datetime(row.pickup_dt),
    dropoff_dt: datetime(row.dropoff_dt)
}]->(dropoff)";

/// Counters from one bulk import
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOutcome {
    pub edges_loaded: u64,
    pub nodes_created: u64,
}

/// Issues the import statement for a staged artifact
#[derive(Debug, Clone)]
pub struct GraphLoader {
    staging: StagingConfig,
}

impl GraphLoader {
    pub fn new(staging: StagingConfig) -> Self {
        Self { staging }
    }

    /// Reference the store resolves for `staging_path`.
    ///
    /// The path must sit under the staging dir (the store's import root); the
    /// reference is the import URI base followed by the relative path.
    pub fn import_reference(&self, staging_path: &Path) -> IngestResult<String> {
        let outside = || IngestError::LoadFailed {
            diagnostic: format!(
                "staging artifact {} is not under the import root {}",
                staging_path.display(),
                self.staging.dir.display()
            ),
        };

        let relative = staging_path.strip_prefix(&self.staging.dir).map_err(|_| outside())?;
        let mut parts = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
                _ => return Err(outside()),
            }
        }
        if parts.is_empty() {
            return Err(outside());
        }

        let base = &self.staging.import_uri_base;
        let separator = if base.ends_with('/') { "" } else { "/" };
        Ok(format!("{}{}{}", base, separator, parts.join("/")))
    }

    /// Create the uniqueness constraint backing merge-by-zone. Safe to repeat.
    pub async fn ensure_schema(&self, session: &dyn GraphSession) -> IngestResult<()> {
        session
            .run(&Statement::new(LOCATION_CONSTRAINT_QUERY))
            .await
            .map_err(IngestError::load_failed)?;
        debug!("Location uniqueness constraint in place");
        Ok(())
    }

    /// Run the bulk import for the artifact at `staging_path`.
    ///
    /// Any failing row aborts the whole statement; the error carries the
    /// store's diagnostic.
    pub async fn load(
        &self,
        session: &dyn GraphSession,
        staging_path: &Path,
    ) -> IngestResult<LoadOutcome> {
        let reference = self.import_reference(staging_path)?;
        info!("Importing {} into graph store", reference);

        let statement = Statement::new(TRIP_IMPORT_QUERY).param(CSV_PATH_PARAM, reference);
        let result = session.run(&statement).await.map_err(IngestError::load_failed)?;

        let outcome = LoadOutcome {
            edges_loaded: result.stats.relationships_created,
            nodes_created: result.stats.nodes_created,
        };
        info!(
            "Import created {} TRIP edge(s) and {} Location node(s)",
            outcome.edges_loaded, outcome.nodes_created
        );
        Ok(outcome)
    }
}
