use std::path::Path;
use std::sync::Arc;

use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use parquet::format::KeyValue;
use tracing::debug;

use super::builders::build_arrays;
use super::error::ExportError;
use super::schema::build_schema;
use crate::dataframe::DataFrame;

/// Convert a frame into an Arrow [`RecordBatch`].
pub fn to_record_batch(frame: &DataFrame) -> Result<RecordBatch, ExportError> {
    let schema = Arc::new(build_schema(frame));
    let arrays = build_arrays(frame.rows(), &schema)?;
    let options = RecordBatchOptions::new().with_row_count(Some(frame.row_count()));
    let batch = RecordBatch::try_new_with_options(schema, arrays, &options)?;
    Ok(batch)
}

fn writer_properties(metadata: &[(&str, &str)]) -> WriterProperties {
    let kv = metadata
        .iter()
        .map(|(k, v)| KeyValue::new(format!("redash.{k}"), Some(v.to_string())))
        .collect::<Vec<_>>();
    WriterProperties::builder()
        .set_compression(Compression::ZSTD(Default::default()))
        .set_key_value_metadata((!kv.is_empty()).then_some(kv))
        .build()
}

/// Write a frame to a Parquet file, creating parent directories.
///
/// `metadata` pairs are stored in the file footer under a `redash.` prefix,
/// e.g. `[("query_id", "42")]`. Returns the number of rows written.
pub fn write_parquet(
    frame: &DataFrame,
    path: &Path,
    metadata: &[(&str, &str)],
) -> Result<u64, ExportError> {
    let batch = to_record_batch(frame)?;
    let row_count = batch.num_rows() as u64;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(path)?;

    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(writer_properties(metadata)))?;
    writer.write(&batch)?;
    writer.close()?;

    debug!(path = %path.display(), rows = row_count, "Wrote Parquet file");

    Ok(row_count)
}

/// Write a frame to an in-memory Parquet buffer.
pub fn write_parquet_bytes(
    frame: &DataFrame,
    metadata: &[(&str, &str)],
) -> Result<Vec<u8>, ExportError> {
    let batch = to_record_batch(frame)?;

    let mut buf = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buf, batch.schema(), Some(writer_properties(metadata)))?;
    writer.write(&batch)?;
    writer.close()?;

    Ok(buf)
}
