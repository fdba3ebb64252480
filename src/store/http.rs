//! HTTP adapter for the store's transactional endpoint
//!
//! Each statement is sent as its own `POST {address}/db/{database}/tx/commit`,
//! so the server runs it in a single transaction that either commits fully or
//! not at all.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{GraphConnector, GraphSession, QueryResult, QueryStats, Statement, StoreError, StoreResult};
use crate::config::StoreEndpoint;

/// Opens [`HttpSession`]s.
///
/// `request_timeout` bounds every request, including the bulk import; keep it
/// generous for large artifacts. `connect_timeout` bounds only the TCP
/// connect, so an address nobody listens on fails fast.
#[derive(Debug, Clone)]
pub struct HttpConnector {
    request_timeout: Duration,
    connect_timeout: Duration,
}

impl HttpConnector {
    pub fn new(request_timeout: Duration) -> Self {
        Self {
            request_timeout,
            connect_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }
}

impl Default for HttpConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(30 * 60))
    }
}

#[async_trait]
impl GraphConnector for HttpConnector {
    async fn connect(&self, endpoint: &StoreEndpoint) -> StoreResult<Box<dyn GraphSession>> {
        let client = Client::builder()
            .connect_timeout(self.connect_timeout)
            .timeout(self.request_timeout)
            .build()?;
        Ok(Box::new(HttpSession {
            commit_url: commit_url(endpoint),
            username: endpoint.username.clone(),
            password: endpoint.password.clone(),
            client,
        }))
    }
}

/// Session over HTTP; holds no server-side state between statements
pub struct HttpSession {
    commit_url: String,
    username: String,
    password: String,
    client: Client,
}

fn commit_url(endpoint: &StoreEndpoint) -> String {
    format!(
        "{}/db/{}/tx/commit",
        endpoint.address.trim_end_matches('/'),
        endpoint.database
    )
}

#[derive(Serialize)]
struct CommitRequest<'a> {
    statements: [StatementEnvelope<'a>; 1],
}

#[derive(Serialize)]
struct StatementEnvelope<'a> {
    #[serde(flatten)]
    statement: &'a Statement,
    #[serde(rename = "includeStats")]
    include_stats: bool,
}

#[derive(Debug, Deserialize)]
struct CommitResponse {
    #[serde(default)]
    results: Vec<StatementResult>,
    #[serde(default)]
    errors: Vec<ServerError>,
}

#[derive(Debug, Deserialize)]
struct StatementResult {
    #[serde(default)]
    columns: Vec<String>,
    #[serde(default)]
    data: Vec<DataRow>,
    #[serde(default)]
    stats: QueryStats,
}

#[derive(Debug, Deserialize)]
struct DataRow {
    row: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ServerError {
    code: String,
    message: String,
}

/// Errors reported inside a 200 response still mean the transaction rolled back
fn into_query_result(response: CommitResponse) -> StoreResult<QueryResult> {
    if let Some(error) = response.errors.into_iter().next() {
        return Err(StoreError::Query {
            code: error.code,
            message: error.message,
        });
    }

    let result = response.results.into_iter().next().unwrap_or(StatementResult {
        columns: Vec::new(),
        data: Vec::new(),
        stats: QueryStats::default(),
    });

    Ok(QueryResult {
        columns: result.columns,
        rows: result.data.into_iter().map(|d| d.row).collect(),
        stats: result.stats,
    })
}

#[async_trait]
impl GraphSession for HttpSession {
    async fn run(&self, statement: &Statement) -> StoreResult<QueryResult> {
        debug!("POST {} ({} parameter(s))", self.commit_url, statement.parameters.len());

        let body = CommitRequest {
            statements: [StatementEnvelope {
                statement,
                include_stats: true,
            }],
        };

        let response = self
            .client
            .post(&self.commit_url)
            .basic_auth(&self.username, Some(&self.password))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(StoreError::Unavailable(format!(
                "authentication rejected ({})",
                status
            )));
        }
        if status.is_server_error() {
            return Err(StoreError::Unavailable(format!("server returned {}", status)));
        }

        let text = response.text().await?;
        if !status.is_success() {
            return Err(StoreError::Query {
                code: status.to_string(),
                message: text,
            });
        }

        into_query_result(serde_json::from_str(&text)?)
    }

    async fn close(&self) -> StoreResult<()> {
        Ok(())
    }
}
