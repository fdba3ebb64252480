//! Session establishment with active reachability verification

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::StoreEndpoint;
use crate::error::{IngestError, IngestResult};
use crate::store::{GraphConnector, GraphSession, Statement};

/// Cheapest statement that proves the store accepts queries
pub const VERIFY_QUERY: &str = "RETURN 1 AS ok";

/// Verification window used when none is configured
pub const DEFAULT_VERIFY_TIMEOUT: Duration = Duration::from_secs(15);

/// Opens sessions and refuses to hand out one that cannot run a query.
///
/// A single call makes a single attempt; retrying is the pipeline's job.
/// The verification query must answer within `verify_timeout`.
#[derive(Clone)]
pub struct ConnectionManager {
    connector: Arc<dyn GraphConnector>,
    verify_timeout: Duration,
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn GraphConnector>) -> Self {
        Self {
            connector,
            verify_timeout: DEFAULT_VERIFY_TIMEOUT,
        }
    }

    pub fn with_verify_timeout(mut self, verify_timeout: Duration) -> Self {
        self.verify_timeout = verify_timeout;
        self
    }

    /// Open a session and verify it round-trips a query.
    ///
    /// Fails with [`IngestError::ConnectionUnavailable`] (one attempt) if the
    /// handle cannot be created or the verification query fails or times out.
    pub async fn connect(&self, endpoint: &StoreEndpoint) -> IngestResult<Box<dyn GraphSession>> {
        let unavailable = |reason: String| IngestError::ConnectionUnavailable {
            attempts: 1,
            reason,
        };

        let session = self
            .connector
            .connect(endpoint)
            .await
            .map_err(|e| unavailable(e.to_string()))?;

        if let Err(reason) = self.check(session.as_ref()).await {
            if let Err(e) = session.close().await {
                debug!("Closing unverified session failed: {}", e);
            }
            return Err(unavailable(reason));
        }

        debug!("Verified session to {}", endpoint.address);
        Ok(session)
    }

    /// Whether the session can currently execute a query
    pub async fn verify(&self, session: &dyn GraphSession) -> bool {
        match self.check(session).await {
            Ok(()) => true,
            Err(reason) => {
                warn!("Session verification failed: {}", reason);
                false
            }
        }
    }

    async fn check(&self, session: &dyn GraphSession) -> Result<(), String> {
        let statement = Statement::new(VERIFY_QUERY);
        let result = tokio::time::timeout(self.verify_timeout, session.run(&statement))
            .await
            .map_err(|_| format!("no answer to verification query within {:?}", self.verify_timeout))?
            .map_err(|e| e.to_string())?;

        match result.single_value().and_then(|v| v.as_i64()) {
            Some(1) => Ok(()),
            other => Err(format!("unexpected verification result: {:?}", other)),
        }
    }
}
