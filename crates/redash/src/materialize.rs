//! Turn a `query_result` payload into a [`DataFrame`].
//!
//! Expected shape:
//!
//! ```json
//! { "query_result": { "data": {
//!     "columns": [{ "name": "a", "type": "integer" }, { "name": "b" }],
//!     "rows": [[1, "x"], { "a": 2, "b": "y" }]
//! } } }
//! ```
//!
//! Rows may be positional arrays or objects keyed by column name. Values
//! are taken as-is; no type coercion happens here.

use serde_json::{Map, Value};

use crate::dataframe::{Column, DataFrame};
use crate::error::{RedashError, Result};

/// Build a frame from a full result payload.
pub fn materialize(payload: &Value) -> Result<DataFrame> {
    let data = payload
        .get("query_result")
        .ok_or_else(|| shape("payload has no `query_result`"))?
        .get("data")
        .ok_or_else(|| shape("`query_result` has no `data`"))?;

    let columns = data
        .get("columns")
        .and_then(Value::as_array)
        .ok_or_else(|| shape("`data.columns` is missing or not an array"))?
        .iter()
        .enumerate()
        .map(|(idx, col)| parse_column(idx, col))
        .collect::<Result<Vec<Column>>>()?;

    let rows = data
        .get("rows")
        .and_then(Value::as_array)
        .ok_or_else(|| shape("`data.rows` is missing or not an array"))?
        .iter()
        .enumerate()
        .map(|(idx, row)| parse_row(idx, row, &columns))
        .collect::<Result<Vec<Vec<Value>>>>()?;

    DataFrame::new(columns, rows)
}

fn shape(msg: &str) -> RedashError {
    RedashError::DataShape(msg.to_string())
}

fn parse_column(idx: usize, col: &Value) -> Result<Column> {
    let name = col
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| RedashError::DataShape(format!("column {idx} has no string `name`")))?;
    let data_type = col.get("type").and_then(Value::as_str).map(str::to_string);
    Ok(Column {
        name: name.to_string(),
        data_type,
    })
}

fn parse_row(idx: usize, row: &Value, columns: &[Column]) -> Result<Vec<Value>> {
    match row {
        Value::Array(values) => Ok(values.clone()),
        Value::Object(map) => Ok(row_from_object(map, columns)),
        other => Err(RedashError::DataShape(format!(
            "row {idx} is neither an array nor an object: {other}"
        ))),
    }
}

/// Keys not among the columns are dropped; absent columns become `null`.
fn row_from_object(map: &Map<String, Value>, columns: &[Column]) -> Vec<Value> {
    columns
        .iter()
        .map(|c| map.get(&c.name).cloned().unwrap_or(Value::Null))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(columns: Value, rows: Value) -> Value {
        json!({"query_result": {"id": 1, "data": {"columns": columns, "rows": rows}}})
    }

    #[test]
    fn positional_rows_roundtrip() {
        let df = materialize(&payload(
            json!([{"name": "a"}, {"name": "b"}]),
            json!([[1, "x"], [2, "y"]]),
        ))
        .unwrap();

        assert_eq!(df.row_count(), 2);
        assert_eq!(df.column_names(), ["a", "b"]);
        assert_eq!(df.rows()[0], [json!(1), json!("x")]);
        assert_eq!(df.rows()[1], [json!(2), json!("y")]);
    }

    #[test]
    fn object_rows_follow_column_order() {
        let df = materialize(&payload(
            json!([
                {"name": "day", "type": "date", "friendly_name": "Day"},
                {"name": "count", "type": "integer"}
            ]),
            json!([{"count": 3, "day": "2024-01-01"}, {"day": "2024-01-02", "extra": true}]),
        ))
        .unwrap();

        assert_eq!(df.columns()[0].data_type.as_deref(), Some("date"));
        assert_eq!(df.rows()[0], [json!("2024-01-01"), json!(3)]);
        assert_eq!(df.rows()[1], [json!("2024-01-02"), Value::Null]);
    }

    #[test]
    fn empty_rows_keep_columns() {
        let df = materialize(&payload(json!([{"name": "a"}]), json!([]))).unwrap();
        assert!(df.is_empty());
        assert_eq!(df.column_count(), 1);
    }

    #[test]
    fn missing_structure_is_data_shape_error() {
        let cases = [
            json!({}),
            json!({"query_result": {}}),
            json!({"query_result": {"data": {"rows": []}}}),
            json!({"query_result": {"data": {"columns": []}}}),
            payload(json!([{"title": "a"}]), json!([])),
            payload(json!([{"name": "a"}]), json!([5])),
            payload(json!([{"name": "a"}]), json!([[1, 2]])),
        ];
        for case in cases {
            let err = materialize(&case).unwrap_err();
            assert!(
                matches!(err, RedashError::DataShape(_)),
                "expected DataShape for {case}, got {err:?}"
            );
        }
    }
}
