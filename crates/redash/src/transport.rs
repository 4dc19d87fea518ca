//! HTTP transport seam.
//!
//! [`RedashClient`](crate::RedashClient) only ever talks to the service
//! through [`Transport`], so one pooled connection can be shared by many
//! concurrent calls and tests can script the service's answers.

use std::fmt;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::{RedashError, Result};

/// Status and body of a completed HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// A 200 response carrying `value` as JSON.
    pub fn ok_json(value: &Value) -> Self {
        Self::new(200, value.to_string())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Parse the body as JSON.
    ///
    /// On failure the error mentions the status so that an HTML error page
    /// from a proxy is recognisable.
    pub fn body_json(&self) -> Result<Value> {
        serde_json::from_str(&self.body).map_err(|e| {
            RedashError::Request(format!(
                "HTTP {} with non-JSON body ({e}): {}",
                self.status,
                truncate(&self.body, 200)
            ))
        })
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Minimal HTTP surface the Redash client needs.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// `POST` a JSON body.
    async fn post_json(&self, url: &str, body: &Value) -> Result<HttpResponse>;

    /// `GET` a resource.
    async fn get(&self, url: &str) -> Result<HttpResponse>;
}

/// [`Transport`] backed by a pooled `reqwest::Client`.
///
/// Connect and per-request timeouts are applied here; they are independent
/// of the job-wait timeout enforced by the poller.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .user_agent(concat!("redash-frame/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                RedashError::Configuration(format!("failed to create HTTP client: {e}"))
            })?;
        Ok(Self { client })
    }

    /// Wrap an already configured client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn read(response: reqwest::Response) -> Result<HttpResponse> {
        let status = response.status().as_u16();
        let body = response.text().await?;
        debug!(status, bytes = body.len(), "HTTP response received");
        Ok(HttpResponse { status, body })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post_json(&self, url: &str, body: &Value) -> Result<HttpResponse> {
        let response = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .json(body)
            .send()
            .await?;
        Self::read(response).await
    }

    async fn get(&self, url: &str) -> Result<HttpResponse> {
        let response = self.client.get(url).send().await?;
        Self::read(response).await
    }
}

/// Scripted transport for exercising the client without a server.
pub mod mock {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Method {
        Get,
        Post,
    }

    /// One request seen by [`ScriptedTransport`].
    #[derive(Debug, Clone)]
    pub struct RecordedCall {
        pub method: Method,
        pub url: String,
        pub body: Option<Value>,
    }

    impl RecordedCall {
        /// URL path with the endpoint and query string removed.
        pub fn path(&self) -> &str {
            let no_query = self.url.split('?').next().unwrap_or(&self.url);
            match no_query.find("/api/") {
                Some(idx) => &no_query[idx..],
                None => no_query,
            }
        }

        /// Value of a submitted template parameter.
        pub fn param(&self, key: &str) -> Option<&str> {
            self.body.as_ref()?.get("parameters")?.get(key)?.as_str()
        }
    }

    type Handler = dyn Fn(&RecordedCall) -> Result<HttpResponse> + Send + Sync;

    /// Answers every request with a caller-provided handler and records it.
    pub struct ScriptedTransport {
        handler: Box<Handler>,
        calls: Mutex<Vec<RecordedCall>>,
    }

    impl fmt::Debug for ScriptedTransport {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("ScriptedTransport")
                .field("calls", &self.call_count())
                .finish()
        }
    }

    impl ScriptedTransport {
        pub fn from_fn(
            handler: impl Fn(&RecordedCall) -> Result<HttpResponse> + Send + Sync + 'static,
        ) -> Self {
            Self {
                handler: Box::new(handler),
                calls: Mutex::new(Vec::new()),
            }
        }

        /// Replay `responses` in order; fails once they run out.
        pub fn sequence(responses: Vec<HttpResponse>) -> Self {
            let queue = Mutex::new(responses.into_iter());
            Self::from_fn(move |call| {
                queue.lock().unwrap().next().ok_or_else(|| {
                    RedashError::Request(format!("script exhausted at {}", call.path()))
                })
            })
        }

        pub fn calls(&self) -> Vec<RecordedCall> {
            self.calls.lock().unwrap().clone()
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        /// Number of recorded calls whose path starts with `prefix`.
        pub fn count_path(&self, prefix: &str) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|c| c.path().starts_with(prefix))
                .count()
        }

        fn record(&self, call: RecordedCall) -> Result<HttpResponse> {
            let response = (self.handler)(&call);
            self.calls.lock().unwrap().push(call);
            response
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn post_json(&self, url: &str, body: &Value) -> Result<HttpResponse> {
            self.record(RecordedCall {
                method: Method::Post,
                url: url.to_string(),
                body: Some(body.clone()),
            })
        }

        async fn get(&self, url: &str) -> Result<HttpResponse> {
            self.record(RecordedCall {
                method: Method::Get,
                url: url.to_string(),
                body: None,
            })
        }
    }
}
