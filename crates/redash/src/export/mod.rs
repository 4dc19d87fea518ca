//! Convert a [`DataFrame`](crate::DataFrame) to Apache Arrow and Parquet.
//!
//! Redash column types (`integer`, `float`, `boolean`, `datetime`, ...) map
//! to typed Arrow columns. Columns without a declared type are inferred from
//! their JSON values. Parquet output uses Zstd compression.

mod builders;
mod error;
pub(crate) mod schema;
mod writer;


pub use error::ExportError;
pub use writer::{to_record_batch, write_parquet, write_parquet_bytes};
