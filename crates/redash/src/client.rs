//! Redash query execution client.
//!
//! Provides [`RedashClient`] for running saved queries against a Redash
//! instance: submission, job polling with a wall-clock bound, and
//! materialization of the result into a [`DataFrame`]. The batching
//! strategies in [`crate::paginate`] and [`crate::partition`] are built on
//! [`RedashClient::execute`].

use std::fmt;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::{BadGatewayPolicy, ClientConfig, Credential};
use crate::dataframe::DataFrame;
use crate::error::{RedashError, Result};
use crate::materialize::materialize;
use crate::poller::{Completion, JobPoller};
use crate::request::{QueryId, QueryRequest};
use crate::transport::{HttpTransport, Transport};
use crate::uri;

const BAD_GATEWAY: u16 = 502;

/// Client for executing saved queries on a Redash instance.
///
/// Holds only the credential, configuration and a shared transport; every
/// call keeps its job and result on its own stack, so one client can be
/// shared (e.g. behind an `Arc`) by concurrent tasks.
#[derive(Clone)]
pub struct RedashClient {
    credential: Credential,
    config: ClientConfig,
    transport: Arc<dyn Transport>,
}

impl fmt::Debug for RedashClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedashClient")
            .field("credential", &self.credential)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RedashClient {
    /// Create a client with default timeouts.
    pub fn new(credential: Credential) -> Result<Self> {
        Self::with_config(credential, ClientConfig::default())
    }

    /// Create a client whose HTTP transport honours `config`'s timeouts.
    pub fn with_config(credential: Credential, config: ClientConfig) -> Result<Self> {
        let transport = Arc::new(HttpTransport::new(&config)?);
        Ok(Self::with_transport(credential, config, transport))
    }

    /// Create a client on top of an existing transport.
    pub fn with_transport(
        credential: Credential,
        config: ClientConfig,
        transport: Arc<dyn Transport>,
    ) -> Self {
        info!(endpoint = %credential.endpoint(), "RedashClient initialised");
        Self {
            credential,
            config,
            transport,
        }
    }

    /// Build credential and configuration from `REDASH_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::with_config(Credential::from_env()?, ClientConfig::from_env())
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Public API
    // -----------------------------------------------------------------------

    /// Execute a saved query and return its rows.
    ///
    /// This performs the full lifecycle:
    /// 1. Submit the execution request
    /// 2. Poll the job until it is terminal (bounded by `job_timeout`)
    /// 3. Fetch and materialize the result
    ///
    /// A 502 on the result fetch yields an empty frame under
    /// [`BadGatewayPolicy::EmptyFrame`].
    pub async fn execute(&self, request: &QueryRequest) -> Result<DataFrame> {
        let poller = JobPoller {
            transport: self.transport.as_ref(),
            credential: &self.credential,
            config: &self.config,
        };

        let frame = match poller.run(request).await? {
            Completion::Cached(body) => materialize(&body)?,
            Completion::ResultId(result_id) => {
                self.fetch_result(&request.query_id, &result_id).await?
            }
        };

        info!(
            query_id = %request.query_id,
            rows = frame.row_count(),
            columns = frame.column_count(),
            "Fetched query result"
        );
        Ok(frame)
    }

    /// Shorthand for [`execute`](Self::execute) with inline parameters.
    pub async fn query<K, V>(
        &self,
        query_id: impl Into<QueryId>,
        params: impl IntoIterator<Item = (K, V)>,
        max_age: u64,
    ) -> Result<DataFrame>
    where
        K: Into<String>,
        V: fmt::Display,
    {
        let request = QueryRequest::new(query_id).params(params).max_age(max_age);
        self.execute(&request).await
    }

    // -----------------------------------------------------------------------
    // Private helpers
    // -----------------------------------------------------------------------

    async fn fetch_result(&self, query_id: &QueryId, result_id: &str) -> Result<DataFrame> {
        let url = uri::query_result(&self.credential, result_id);
        let response = self.transport.get(&url).await?;

        if response.status == BAD_GATEWAY {
            return match self.config.bad_gateway {
                BadGatewayPolicy::EmptyFrame => {
                    warn!(
                        query_id = %query_id,
                        result_id = %result_id,
                        "Result fetch returned 502, treating as empty"
                    );
                    Ok(DataFrame::empty())
                }
                BadGatewayPolicy::Error => Err(RedashError::Request(format!(
                    "result {result_id} of query {query_id} returned HTTP 502"
                ))),
            };
        }

        if !response.is_success() {
            return Err(RedashError::Request(format!(
                "result {result_id} of query {query_id} returned HTTP {}",
                response.status
            )));
        }

        materialize(&response.body_json()?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::transport::mock::{Method, ScriptedTransport};
    use crate::transport::HttpResponse;

    fn client(transport: Arc<ScriptedTransport>, bad_gateway: BadGatewayPolicy) -> RedashClient {
        let config = ClientConfig {
            poll_interval: Duration::from_millis(10),
            job_timeout: Duration::from_secs(2),
            bad_gateway,
            ..ClientConfig::default()
        };
        RedashClient::with_transport(
            Credential::new("https://redash.example.com", "key").unwrap(),
            config,
            transport,
        )
    }

    fn script(result: HttpResponse) -> Arc<ScriptedTransport> {
        let result = Mutex::new(Some(result));
        Arc::new(ScriptedTransport::from_fn(move |call| {
            Ok(match (call.method, call.path()) {
                (Method::Post, _) => {
                    HttpResponse::ok_json(&json!({"job": {"id": "j", "status": 1}}))
                }
                (Method::Get, p) if p.starts_with("/api/jobs/") => HttpResponse::ok_json(
                    &json!({"job": {"id": "j", "status": 3, "query_result_id": 5}}),
                ),
                (Method::Get, _) => result
                    .lock()
                    .unwrap()
                    .take()
                    .unwrap_or_else(|| HttpResponse::new(404, "{}")),
            })
        }))
    }

    #[tokio::test(start_paused = true)]
    async fn execute_materializes_result() {
        let transport = script(HttpResponse::ok_json(&json!({
            "query_result": {"data": {
                "columns": [{"name": "a"}, {"name": "b"}],
                "rows": [[1, "x"], [2, "y"]]
            }}
        })));
        let client = client(transport.clone(), BadGatewayPolicy::EmptyFrame);

        let df = client.query(7, [("k", "v")], 0).await.unwrap();
        assert_eq!(df.row_count(), 2);
        assert_eq!(df.get(1, "b"), Some(&json!("y")));

        let calls = transport.calls();
        assert_eq!(calls.last().unwrap().path(), "/api/query_results/5");
    }

    #[tokio::test(start_paused = true)]
    async fn bad_gateway_policy() {
        let transport = script(HttpResponse::new(502, "<html>Bad Gateway</html>"));
        let df = client(transport, BadGatewayPolicy::EmptyFrame)
            .execute(&QueryRequest::new(7))
            .await
            .unwrap();
        assert!(df.is_empty());
        assert_eq!(df.column_count(), 0);

        let transport = script(HttpResponse::new(502, "<html>Bad Gateway</html>"));
        let err = client(transport, BadGatewayPolicy::Error)
            .execute(&QueryRequest::new(7))
            .await
            .unwrap_err();
        assert!(matches!(err, RedashError::Request(ref m) if m.contains("502")));
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_result_is_an_error() {
        let transport = script(HttpResponse::ok_json(&json!({"query_result": {"data": {}}})));
        let err = client(transport, BadGatewayPolicy::EmptyFrame)
            .execute(&QueryRequest::new(7))
            .await
            .unwrap_err();
        assert!(matches!(err, RedashError::DataShape(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn other_result_statuses_are_errors() {
        let transport = script(HttpResponse::new(500, "{}"));
        let err = client(transport, BadGatewayPolicy::EmptyFrame)
            .execute(&QueryRequest::new(7))
            .await
            .unwrap_err();
        assert!(matches!(err, RedashError::Request(ref m) if m.contains("500")));
    }

    #[test]
    fn debug_hides_api_key() {
        let transport = Arc::new(ScriptedTransport::sequence(vec![]));
        let client = client(transport, BadGatewayPolicy::EmptyFrame);
        let dbg = format!("{client:?}");
        assert!(!dbg.contains("\"key\""));
        assert!(dbg.contains("redash.example.com"));
    }
}
