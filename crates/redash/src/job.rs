//! Job model and the JSON envelopes the service wraps it in.

use std::fmt;

use serde_json::Value;

use crate::error::{RedashError, Result};

/// Lifecycle state of a server-side job, as reported by `/api/jobs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    Pending,
    Started,
    Success,
    Failure,
    Cancelled,
}

impl JobStatus {
    /// Map the numeric wire code (1..=5).
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(JobStatus::Pending),
            2 => Some(JobStatus::Started),
            3 => Some(JobStatus::Success),
            4 => Some(JobStatus::Failure),
            5 => Some(JobStatus::Cancelled),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            JobStatus::Pending => 1,
            JobStatus::Started => 2,
            JobStatus::Success => 3,
            JobStatus::Failure => 4,
            JobStatus::Cancelled => 5,
        }
    }

    pub fn is_terminal(self) -> bool {
        match self {
            JobStatus::Pending | JobStatus::Started => false,
            JobStatus::Success | JobStatus::Failure | JobStatus::Cancelled => true,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Started => "STARTED",
            JobStatus::Success => "SUCCESS",
            JobStatus::Failure => "FAILURE",
            JobStatus::Cancelled => "CANCELLED",
        };
        f.write_str(name)
    }
}

/// Client-side view of a job. Only ever replaced by fresh poll responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: String,
    pub status: JobStatus,
    pub error: Option<String>,
    pub query_result_id: Option<String>,
}

impl Job {
    /// Parse the object found under the `job` key.
    pub fn from_value(value: &Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| RedashError::ProtocolViolation(format!("job is not an object: {value}")))?;

        let id = obj
            .get("id")
            .and_then(scalar_to_string)
            .ok_or_else(|| RedashError::ProtocolViolation("job has no id".into()))?;

        let code = obj
            .get("status")
            .and_then(Value::as_i64)
            .ok_or_else(|| {
                RedashError::ProtocolViolation(format!("job {id} has no numeric status"))
            })?;
        let status = JobStatus::from_code(code).ok_or_else(|| {
            RedashError::ProtocolViolation(format!("job {id} reported unknown status {code}"))
        })?;

        Ok(Self {
            id,
            status,
            error: obj.get("error").and_then(scalar_to_string),
            query_result_id: obj.get("query_result_id").and_then(scalar_to_string),
        })
    }

    /// Parse a `{ "job": {...} }` status response.
    pub fn from_envelope(body: &Value) -> Result<Self> {
        let job = body.get("job").ok_or_else(|| {
            RedashError::ProtocolViolation("status response has no `job` field".into())
        })?;
        Self::from_value(job)
    }

    /// Error text, or a placeholder when the service gave none.
    pub fn error_text(&self) -> String {
        self.error
            .clone()
            .unwrap_or_else(|| format!("job {} reported no error message", self.id))
    }
}

/// Strings and numbers become strings; null and empty strings become `None`.
fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// What the submission `POST` answered with.
#[derive(Debug)]
pub(crate) enum Submission {
    /// The service queued (or already finished) a job.
    Job(Job),
    /// A cached result was served synchronously; holds the whole body.
    Cached(Value),
}

impl Submission {
    /// Classify a submission response body.
    ///
    /// A top-level `message` signals bad credentials or endpoint and takes
    /// precedence over everything else.
    pub(crate) fn from_body(body: Value) -> Result<Self> {
        if let Some(message) = body.get("message") {
            let message = message
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| message.to_string());
            return Err(RedashError::Configuration(format!(
                "the endpoint or API key was rejected: {message}"
            )));
        }

        if let Some(job) = body.get("job") {
            return Job::from_value(job).map(Submission::Job);
        }

        if body.get("query_result").is_some() {
            return Ok(Submission::Cached(body));
        }

        Err(RedashError::ProtocolViolation(
            "submission response has neither `job` nor `query_result`".into(),
        ))
    }
}
