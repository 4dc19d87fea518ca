use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Template parameters, always transmitted as strings.
pub type Parameters = IndexMap<String, String>;

/// Identifier of a saved query: numeric id or slug.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryId {
    Number(i64),
    Name(String),
}

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryId::Number(n) => write!(f, "{n}"),
            QueryId::Name(s) => f.write_str(s),
        }
    }
}

impl From<i64> for QueryId {
    fn from(v: i64) -> Self {
        QueryId::Number(v)
    }
}

impl From<i32> for QueryId {
    fn from(v: i32) -> Self {
        QueryId::Number(v.into())
    }
}

impl From<u32> for QueryId {
    fn from(v: u32) -> Self {
        QueryId::Number(v.into())
    }
}

impl From<&str> for QueryId {
    fn from(v: &str) -> Self {
        QueryId::Name(v.to_string())
    }
}

impl From<String> for QueryId {
    fn from(v: String) -> Self {
        QueryId::Name(v)
    }
}

/// One execution request for a saved query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    pub query_id: QueryId,
    pub parameters: Parameters,
    /// Maximum age in seconds of a cached result the service may reuse.
    /// `0` forces a fresh execution.
    pub max_age: u64,
}

impl QueryRequest {
    pub fn new(query_id: impl Into<QueryId>) -> Self {
        Self {
            query_id: query_id.into(),
            parameters: Parameters::new(),
            max_age: 0,
        }
    }

    /// Add a parameter; the value is stringified.
    pub fn param(mut self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        self.set_param(key, value);
        self
    }

    /// Replace every parameter with `params`.
    pub fn params<K, V>(mut self, params: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: fmt::Display,
    {
        self.parameters = params
            .into_iter()
            .map(|(k, v)| (k.into(), v.to_string()))
            .collect();
        self
    }

    pub fn max_age(mut self, seconds: u64) -> Self {
        self.max_age = seconds;
        self
    }

    /// Insert or overwrite a parameter, keeping its original position.
    pub fn set_param(&mut self, key: impl Into<String>, value: impl fmt::Display) {
        self.parameters.insert(key.into(), value.to_string());
    }

    pub(crate) fn body(&self) -> SubmitBody<'_> {
        SubmitBody {
            parameters: &self.parameters,
            max_age: self.max_age,
        }
    }
}

/// JSON body of the submission `POST`.
#[derive(Debug, Serialize)]
pub(crate) struct SubmitBody<'a> {
    parameters: &'a Parameters,
    max_age: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_id_display() {
        assert_eq!(QueryId::from(2600).to_string(), "2600");
        assert_eq!(QueryId::from("daily-sales").to_string(), "daily-sales");
    }

    #[test]
    fn parameters_are_stringified() {
        let req = QueryRequest::new(200)
            .param("station", "Ikebukuro")
            .param("limit", 10)
            .param("ratio", 0.5);
        assert_eq!(req.parameters["limit"], "10");
        assert_eq!(req.parameters["ratio"], "0.5");

        let body = serde_json::to_value(req.body()).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "parameters": {"station": "Ikebukuro", "limit": "10", "ratio": "0.5"},
                "max_age": 0
            })
        );
    }

    #[test]
    fn set_param_overwrites_in_place() {
        let mut req = QueryRequest::new(1).params([("offset_rows", 5), ("x", 1)]);
        req.set_param("offset_rows", 100);
        let keys: Vec<&str> = req.parameters.keys().map(String::as_str).collect();
        assert_eq!(keys, ["offset_rows", "x"]);
        assert_eq!(req.parameters["offset_rows"], "100");
    }

    #[test]
    fn query_id_deserializes_untagged() {
        let n: QueryId = serde_json::from_str("42").unwrap();
        assert_eq!(n, QueryId::Number(42));
        let s: QueryId = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(s, QueryId::Name("abc".into()));
    }
}
