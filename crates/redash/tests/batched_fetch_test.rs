//! End-to-end batching flows over the scripted transport.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use redash_frame::transport::mock::{Method, ScriptedTransport};
use redash_frame::{
    write_parquet_bytes, ClientConfig, Credential, HttpResponse, QueryRequest, RedashClient,
    RedashError,
};

/// Every submission goes through one PENDING poll before succeeding. The
/// result echoes the submitted `start_date` so slices can be told apart.
fn daily_source() -> Arc<ScriptedTransport> {
    Arc::new(ScriptedTransport::from_fn(|call| {
        Ok(match call.method {
            Method::Post => {
                let start = call
                    .body
                    .as_ref()
                    .and_then(|b| b["parameters"]["start_date"].as_str())
                    .unwrap_or("none")
                    .to_string();
                HttpResponse::ok_json(&json!({"job": {"id": start, "status": 1}}))
            }
            Method::Get if call.path().starts_with("/api/jobs/") => {
                let job_id = call.path().trim_start_matches("/api/jobs/").to_string();
                HttpResponse::ok_json(&json!({"job": {
                    "id": job_id, "status": 3, "query_result_id": job_id
                }}))
            }
            Method::Get => {
                let day = call.path().trim_start_matches("/api/query_results/").to_string();
                HttpResponse::ok_json(&json!({"query_result": {"data": {
                    "columns": [
                        {"name": "slice_start", "type": "date"},
                        {"name": "orders", "type": "integer"}
                    ],
                    "rows": [[day, 5]]
                }}}))
            }
        })
    }))
}

fn client(transport: Arc<ScriptedTransport>) -> RedashClient {
    let config = ClientConfig {
        poll_interval: Duration::from_millis(5),
        ..ClientConfig::default()
    };
    RedashClient::with_transport(
        Credential::new("https://redash.example.com", "key").unwrap(),
        config,
        transport,
    )
}

#[tokio::test(start_paused = true)]
async fn weekly_range_is_fetched_in_order_and_exports() {
    let transport = daily_source();
    let client = client(transport.clone());

    let df = client
        .fetch_by_range(&QueryRequest::new(300), "2024-01-03", "2024-01-20", "week", 1)
        .await
        .unwrap();

    let starts: Vec<&str> = df
        .column("slice_start")
        .unwrap()
        .filter_map(|v| v.as_str())
        .collect();
    assert_eq!(starts, ["2024-01-03", "2024-01-08", "2024-01-15"]);
    assert_eq!(transport.count_path("/api/queries/300/results"), 3);

    let bytes = write_parquet_bytes(&df, &[("query_id", "300")]).unwrap();
    assert_eq!(&bytes[..4], b"PAR1");
}

#[tokio::test(start_paused = true)]
async fn one_client_serves_concurrent_callers() {
    let transport = daily_source();
    let client = Arc::new(client(transport.clone()));

    let tasks: Vec<_> = ["2024-01-01", "2024-02-01", "2024-03-01"]
        .into_iter()
        .map(|day| {
            let client = Arc::clone(&client);
            tokio::spawn(async move {
                client
                    .execute(&QueryRequest::new(1).param("start_date", day))
                    .await
            })
        })
        .collect();

    for (task, day) in tasks.into_iter().zip(["2024-01-01", "2024-02-01", "2024-03-01"]) {
        let df = task.await.unwrap().unwrap();
        assert_eq!(df.get(0, "slice_start"), Some(&json!(day)));
    }
    assert_eq!(transport.count_path("/api/queries/1/results"), 3);
}

#[tokio::test]
async fn paginated_fetch_rejects_zero_page_size() {
    let transport = daily_source();
    let err = client(transport.clone())
        .fetch_paginated(&QueryRequest::new(1), 0, 5)
        .await
        .unwrap_err();
    assert!(matches!(err, RedashError::InvalidArgument(_)));
    assert_eq!(transport.call_count(), 0);
}
