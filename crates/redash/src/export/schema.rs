//! Redash column type to Arrow type mapping.

use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use serde_json::Value;

use crate::dataframe::DataFrame;

fn timestamp_type() -> DataType {
    DataType::Timestamp(TimeUnit::Millisecond, Some("UTC".into()))
}

/// Map a Redash column type to an Arrow type.
///
/// Dates stay UTF-8 (`2024-01-15`); anything unknown is UTF-8 too.
pub(crate) fn redash_type_to_arrow(redash_type: &str) -> DataType {
    match redash_type.to_lowercase().as_str() {
        "integer" => DataType::Int64,
        "float" => DataType::Float64,
        "boolean" => DataType::Boolean,
        "datetime" => timestamp_type(),
        _ => DataType::Utf8,
    }
}

/// Pick a type from the non-null values of an untyped column.
pub(crate) fn infer_type<'a>(values: impl Iterator<Item = &'a Value>) -> DataType {
    let mut all_bool = true;
    let mut all_int = true;
    let mut all_number = true;
    let mut seen = false;

    for value in values.filter(|v| !v.is_null()) {
        seen = true;
        all_bool &= value.is_boolean();
        all_int &= value.is_i64();
        all_number &= value.is_number();
    }

    match (seen, all_bool, all_int, all_number) {
        (false, ..) => DataType::Utf8,
        (true, true, ..) => DataType::Boolean,
        (true, _, true, _) => DataType::Int64,
        (true, _, _, true) => DataType::Float64,
        _ => DataType::Utf8,
    }
}

/// Build an Arrow [`Schema`] for a frame. Every field is nullable.
pub(crate) fn build_schema(frame: &DataFrame) -> Schema {
    let fields: Vec<Field> = frame
        .columns()
        .iter()
        .enumerate()
        .map(|(idx, col)| {
            let data_type = match col.data_type.as_deref() {
                Some(t) => redash_type_to_arrow(t),
                None => infer_type(frame.rows().iter().filter_map(|r| r.get(idx))),
            };
            Field::new(&col.name, data_type, true)
        })
        .collect();
    Schema::new(fields)
}
