//! Run saved Redash queries and get their rows back as tabular frames.
//!
//! [`RedashClient::execute`] submits a query, polls its job until it is
//! terminal and materializes the result. [`RedashClient::fetch_paginated`]
//! and [`RedashClient::fetch_by_range`] split large retrievals into several
//! executions and concatenate the pieces.

pub mod client;
pub mod config;
pub mod dataframe;
pub mod error;
pub mod export;
pub mod job;
pub mod materialize;
pub mod paginate;
pub mod partition;
mod poller;
mod progress;
pub mod request;
pub mod transport;
pub mod uri;

pub use client::RedashClient;
pub use config::{load_dotenv, BadGatewayPolicy, ClientConfig, Credential, MIN_POLL_INTERVAL};
pub use dataframe::{Column, DataFrame};
pub use error::{FailureHint, RedashError, Result};
pub use export::{to_record_batch, write_parquet, write_parquet_bytes, ExportError};
pub use job::{Job, JobStatus};
pub use materialize::materialize;
pub use paginate::{PagedFrame, StopReason};
pub use partition::{partition_dates, plan_range, Granularity, SubRange};
pub use request::{Parameters, QueryId, QueryRequest};
pub use transport::{HttpResponse, HttpTransport, Transport};
