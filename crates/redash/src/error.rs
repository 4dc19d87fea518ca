use std::fmt;
use std::time::Duration;

/// Convenience alias used across the crate.
pub type Result<T, E = RedashError> = std::result::Result<T, E>;

/// Why a job ended in FAILURE, inferred from the service's error text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureHint {
    /// The query runner process was killed, usually by the OOM killer.
    ResourceExhausted,
    /// Any other runtime or syntax error.
    Execution,
}

/// Marker the service puts in the error text when the runner was killed.
const KILLED_MARKER: &str = "signal 9";

impl FailureHint {
    pub fn classify(error_text: &str) -> Self {
        if error_text.contains(KILLED_MARKER) {
            FailureHint::ResourceExhausted
        } else {
            FailureHint::Execution
        }
    }
}

impl fmt::Display for FailureHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureHint::ResourceExhausted => {
                write!(f, "the query runner may have run out of memory")
            }
            FailureHint::Execution => write!(
                f,
                "the query syntax may be incorrect or a parameter value is missing; fix it in Redash and run it again"
            ),
        }
    }
}

/// Errors that can occur while talking to a Redash instance.
#[derive(Debug, thiserror::Error)]
pub enum RedashError {
    /// Missing or invalid endpoint/API key, or the service rejected them.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A caller-supplied argument was rejected before any request was sent.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Transport-level failure or an unexpected HTTP status.
    #[error("Request failed: {0}")]
    Request(String),

    /// A single HTTP request exceeded its configured timeout.
    #[error("Request timed out: {0}")]
    RequestTimeout(String),

    /// The job did not reach a terminal state within the job-wait timeout.
    #[error("Job {job_id} for query {query_id} did not finish within {timeout:?}")]
    JobTimeout {
        query_id: String,
        job_id: String,
        timeout: Duration,
    },

    /// The job finished with FAILURE.
    #[error("Query {query_id} failed: {reason} ({hint}) {url}")]
    JobFailed {
        query_id: String,
        reason: String,
        hint: FailureHint,
        url: String,
    },

    /// The job finished with CANCELLED.
    #[error("Query {query_id} was cancelled: {reason}")]
    JobCancelled { query_id: String, reason: String },

    /// The result payload did not have the expected columns/rows structure.
    #[error("Unexpected result shape: {0}")]
    DataShape(String),

    /// The service answered with something the job protocol does not allow.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),
}

impl From<reqwest::Error> for RedashError {
    fn from(err: reqwest::Error) -> Self {
        // The request URL carries the API key.
        let err = err.without_url();
        if err.is_timeout() {
            RedashError::RequestTimeout(err.to_string())
        } else {
            RedashError::Request(err.to_string())
        }
    }
}

impl RedashError {
    /// `true` for the job-level failures reported by the service itself.
    pub fn is_job_error(&self) -> bool {
        matches!(
            self,
            RedashError::JobTimeout { .. }
                | RedashError::JobFailed { .. }
                | RedashError::JobCancelled { .. }
        )
    }
}
