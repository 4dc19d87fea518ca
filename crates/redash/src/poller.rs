//! Submission and job-status polling.
//!
//! A job moves PENDING → STARTED → {SUCCESS | FAILURE | CANCELLED}; the
//! client only observes those transitions. The poll loop is bounded by the
//! job-wait timeout, measured from the start of the loop and independent of
//! the per-request HTTP timeouts.

use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::{ClientConfig, Credential};
use crate::error::{FailureHint, RedashError, Result};
use crate::job::{Job, JobStatus, Submission};
use crate::progress::ProgressTicker;
use crate::request::QueryRequest;
use crate::transport::Transport;
use crate::uri;

/// Where the rows of a finished execution can be found.
#[derive(Debug)]
pub(crate) enum Completion {
    /// Fetch them from `/api/query_results/{id}`.
    ResultId(String),
    /// The submission already carried them (served from cache).
    Cached(Value),
}

/// Drives one execution from submission to a terminal job state.
///
/// Borrowed per call; all per-call state lives on the stack of [`run`](Self::run).
pub(crate) struct JobPoller<'a> {
    pub(crate) transport: &'a dyn Transport,
    pub(crate) credential: &'a Credential,
    pub(crate) config: &'a ClientConfig,
}

impl JobPoller<'_> {
    pub(crate) async fn run(&self, request: &QueryRequest) -> Result<Completion> {
        let query_id = request.query_id.to_string();

        let job = match self.submit(request).await? {
            Submission::Cached(body) => {
                debug!(query_id = %query_id, "Result served from cache");
                return Ok(Completion::Cached(body));
            }
            Submission::Job(job) => job,
        };

        info!(query_id = %query_id, job_id = %job.id, status = %job.status, "Job accepted");

        // Already-terminal failures need no polling.
        match job.status {
            JobStatus::Cancelled => return Err(self.cancelled(&query_id, &job)),
            JobStatus::Failure => return Err(self.failed(&query_id, job.error_text())),
            JobStatus::Pending | JobStatus::Started | JobStatus::Success => {}
        }

        let job = self.wait(&query_id, job).await?;
        self.finish(&query_id, job)
    }

    async fn submit(&self, request: &QueryRequest) -> Result<Submission> {
        let url = uri::query_results(self.credential, &request.query_id);
        let body = serde_json::to_value(request.body())
            .map_err(|e| RedashError::InvalidArgument(format!("unserializable parameters: {e}")))?;

        info!(
            query_id = %request.query_id,
            parameters = request.parameters.len(),
            max_age = request.max_age,
            "Submitting query"
        );

        let response = self
            .transport
            .post_json(&url, &body)
            .await
            .map_err(|e| self.with_endpoint(e))?;
        let value = response.body_json()?;

        if !response.is_success() && value.get("message").is_none() {
            return Err(RedashError::Request(format!(
                "submitting query {} returned HTTP {}: {}",
                request.query_id, response.status, value
            )));
        }

        Submission::from_body(value)
    }

    /// Poll until the job is terminal or the job-wait timeout elapses.
    async fn wait(&self, query_id: &str, job: Job) -> Result<Job> {
        if job.status.is_terminal() {
            return Ok(job);
        }

        let job_id = job.id.clone();
        let started = Instant::now();
        let deadline = started + self.config.job_timeout;

        // Stopped on drop, whichever way this function returns.
        let _progress =
            ProgressTicker::start(self.config.progress, self.config.effective_poll_interval());

        let outcome = tokio::time::timeout_at(deadline, self.poll(query_id, job, deadline)).await;

        match outcome {
            Ok(Ok(job)) => {
                debug!(
                    query_id = %query_id,
                    job_id = %job_id,
                    status = %job.status,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Job reached terminal state"
                );
                Ok(job)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(self.timed_out(query_id, &job_id)),
        }
    }

    async fn poll(&self, query_id: &str, mut job: Job, deadline: Instant) -> Result<Job> {
        let url = uri::job(self.credential, &job.id);

        loop {
            if Instant::now() >= deadline {
                return Err(self.timed_out(query_id, &job.id));
            }

            let response = self.transport.get(&url).await?;
            if !response.is_success() {
                return Err(RedashError::Request(format!(
                    "job {} status returned HTTP {}",
                    job.id, response.status
                )));
            }
            job = Job::from_envelope(&response.body_json()?)?;

            debug!(query_id = %query_id, job_id = %job.id, status = %job.status, "Polled job status");

            if job.status.is_terminal() {
                return Ok(job);
            }

            tokio::time::sleep(self.config.effective_poll_interval()).await;
        }
    }

    fn finish(&self, query_id: &str, job: Job) -> Result<Completion> {
        match job.status {
            JobStatus::Success => match (job.query_result_id, job.error) {
                (Some(result_id), _) => Ok(Completion::ResultId(result_id)),
                (None, Some(reason)) => Err(self.failed(query_id, reason)),
                (None, None) => Err(RedashError::ProtocolViolation(format!(
                    "job {} for query {query_id} succeeded without a result id or error",
                    job.id
                ))),
            },
            JobStatus::Failure => Err(self.failed(query_id, job.error_text())),
            JobStatus::Cancelled => Err(self.cancelled(query_id, &job)),
            JobStatus::Pending | JobStatus::Started => Err(RedashError::ProtocolViolation(
                format!("job {} left polling while {}", job.id, job.status),
            )),
        }
    }

    fn failed(&self, query_id: &str, reason: String) -> RedashError {
        let hint = FailureHint::classify(&reason);
        let url = uri::query_page(self.credential, query_id);
        error!(query_id = %query_id, reason = %reason, hint = ?hint, url = %url, "Query failed");
        RedashError::JobFailed {
            query_id: query_id.to_string(),
            reason,
            hint,
            url,
        }
    }

    fn cancelled(&self, query_id: &str, job: &Job) -> RedashError {
        warn!(query_id = %query_id, job_id = %job.id, "Job was cancelled");
        RedashError::JobCancelled {
            query_id: query_id.to_string(),
            reason: job.error_text(),
        }
    }

    fn timed_out(&self, query_id: &str, job_id: &str) -> RedashError {
        warn!(
            query_id = %query_id,
            job_id = %job_id,
            timeout_ms = self.config.job_timeout.as_millis() as u64,
            "Job wait timed out"
        );
        RedashError::JobTimeout {
            query_id: query_id.to_string(),
            job_id: job_id.to_string(),
            timeout: self.config.job_timeout,
        }
    }

    /// Name the endpoint in submission transport errors; it carries no key.
    fn with_endpoint(&self, err: RedashError) -> RedashError {
        let endpoint = self.credential.endpoint();
        match err {
            RedashError::Request(msg) => {
                RedashError::Request(format!("{msg}; is the endpoint {endpoint} reachable?"))
            }
            RedashError::RequestTimeout(msg) => {
                RedashError::RequestTimeout(format!("{msg}; is the endpoint {endpoint} reachable?"))
            }
            other => other,
        }
    }
}
