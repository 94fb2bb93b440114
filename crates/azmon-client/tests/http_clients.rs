//! End-to-end client tests against a local mock of the Azure endpoints.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use azmon_client::*;
use azmon_core::QueryOptions;
use serde_json::{Value, json};

async fn spawn(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == "Bearer test-token")
}

async fn resource_graph(headers: HeaderMap, Json(body): Json<Value>) -> impl IntoResponse {
    if !authorized(&headers) {
        return (
            StatusCode::UNAUTHORIZED,
            [("x-ms-user-quota-remaining", "QueriesPerHour:0")],
            Json(json!({"error": {"code": "InvalidAuthenticationToken", "message": "no token"}})),
        );
    }
    let page = body["options"]["$skipToken"].as_str().unwrap_or("");
    let response = if page.is_empty() {
        json!({
            "totalRecords": 2, "count": 1, "resultTruncated": "false", "$skipToken": "page2",
            "data": [{"id": "/r/1", "subscriptionId": "s1", "location": "westeurope"}]
        })
    } else {
        json!({
            "totalRecords": 2, "count": 1, "resultTruncated": "false",
            "data": [{"id": "/r/2", "subscriptionId": "s1", "location": "westeurope"}]
        })
    };
    (
        StatusCode::OK,
        [("x-ms-user-quota-remaining", "QueriesPerHour:496,QueriesPerMin:37")],
        Json(response),
    )
}

async fn metrics_batch(
    Path((sub, action)): Path<(String, String)>,
    Query(params): Query<Vec<(String, String)>>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    assert_eq!(action, "metrics:getBatch");
    let param = |k: &str| {
        params
            .iter()
            .find(|(key, _)| key == k)
            .map(|(_, v)| v.clone())
            .unwrap_or_default()
    };
    let ids = body["resourceids"].as_array().cloned().unwrap_or_default();
    let values: Vec<Value> = ids
        .iter()
        .map(|id| {
            json!({
                "namespace": param("metricnamespace"),
                "resourceregion": "westeurope",
                "resourceid": id,
                "value": [{
                    "name": {"value": param("metricnames"), "localizedValue": param("metricnames")},
                    "displayDescription": format!("sub {sub}, aggregation {}", param("aggregation")),
                    "errorCode": "Success",
                    "unit": "Count",
                    "timeseries": [{"metadatavalues": [], "data": [
                        {"timeStamp": "2024-01-01T00:00:00Z", "average": 1.0}
                    ]}]
                }]
            })
        })
        .collect();
    (
        [("x-ms-ratelimit-remaining-subscription-reads", "11999")],
        Json(json!({ "values": values })),
    )
}

async fn subscriptions(Query(params): Query<Vec<(String, String)>>, headers: HeaderMap) -> Json<Value> {
    let host = headers
        .get("host")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    if params.iter().any(|(k, _)| k == "page") {
        Json(json!({"value": [{"subscriptionId": "s2"}]}))
    } else {
        Json(json!({
            "value": [{"subscriptionId": "s1", "displayName": "one"}],
            "nextLink": format!("http://{host}/subscriptions?api-version=2022-12-01&page=2")
        }))
    }
}

async fn slow() -> Json<Value> {
    tokio::time::sleep(Duration::from_secs(5)).await;
    Json(json!({}))
}

fn mock() -> Router {
    Router::new()
        .route("/providers/Microsoft.ResourceGraph/resources", post(resource_graph))
        .route("/subscriptions/{sub}/{action}", post(metrics_batch))
        .route("/subscriptions", get(subscriptions))
}

fn transport(token: StaticToken, recorder: &Arc<RateLimitRecorder>) -> Transport {
    Transport::new(Transport::default_http_client().unwrap(), Arc::new(token)).with_recorder(recorder.clone())
}

fn deadline() -> Deadline {
    Deadline::after(Duration::from_secs(5))
}

#[tokio::test]
async fn resource_graph_pages_and_records_quota() {
    let base = spawn(mock()).await;
    let recorder = Arc::new(RateLimitRecorder::new());
    let client = ResourceGraphClient::new(transport(StaticToken::new("test-token"), &recorder), &base).unwrap();

    let first = client
        .query(&QueryRequest::new("Resources", vec!["s1".into()], None), deadline())
        .await
        .unwrap();
    assert_eq!(first.count, Some(1));
    assert_eq!(first.result_truncated, Some(ResultTruncated::False));
    assert_eq!(first.skip_token.as_deref(), Some("page2"));

    let second = client
        .query(&QueryRequest::new("Resources", vec!["s1".into()], first.skip_token), deadline())
        .await
        .unwrap();
    assert!(second.skip_token.is_none());
    assert_eq!(second.data.unwrap()[0]["id"], "/r/2");

    assert_eq!(recorder.quota("127.0.0.1", "", "resourcegraph", "quota.QueriesPerMin"), Some(37.0));
    assert!(recorder.render_prometheus().contains(r#"azurerm_api_http_request_duration_seconds_count{code="200",method="POST"} 2"#));
}

#[tokio::test]
async fn api_error_envelope_mapped() {
    let base = spawn(mock()).await;
    let recorder = Arc::new(RateLimitRecorder::new());
    let client = ResourceGraphClient::new(transport(StaticToken::anonymous(), &recorder), &base).unwrap();

    let err = client
        .query(&QueryRequest::new("Resources", vec![], None), deadline())
        .await
        .unwrap_err();
    match err {
        ClientError::Api { status, code, .. } => {
            assert_eq!(status, 401);
            assert_eq!(code, "InvalidAuthenticationToken");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(recorder.render_prometheus().contains(r#"code="401""#));
}

#[tokio::test]
async fn metrics_batch_sends_ids_and_options() {
    let base = spawn(mock()).await;
    let recorder = Arc::new(RateLimitRecorder::new());
    let factory = HttpMetricsFactory::new(
        transport(StaticToken::new("test-token"), &recorder),
        format!("{base}/?region={{region}}"),
    );
    let client = factory.build("westeurope").unwrap();

    let query = MetricsQuery {
        subscription_id: "s1".into(),
        metric_namespace: "Microsoft.Compute/virtualMachines".into(),
        metric_names: vec!["VmAvailabilityMetric".into()],
        resource_ids: vec!["/r/1".into(), "/r/2".into()],
        options: QueryOptions {
            aggregation: Some("average".into()),
            ..Default::default()
        },
    };
    let results = client.query_resources(&query, deadline()).await.unwrap();

    assert_eq!(results.values.len(), 2);
    let metric = &results.values[1].values[0];
    assert_eq!(results.values[1].resourceid, "/r/2");
    assert_eq!(metric.name.value, "VmAvailabilityMetric");
    assert_eq!(metric.display_description, "sub s1, aggregation average");
    assert_eq!(metric.timeseries[0].data[0].average, Some(1.0));

    assert_eq!(recorder.quota("127.0.0.1", "s1", "subscription", "reads"), Some(11999.0));
}

#[tokio::test]
async fn subscriptions_follow_next_link() {
    let base = spawn(mock()).await;
    let recorder = Arc::new(RateLimitRecorder::new());
    let client = SubscriptionsClient::new(transport(StaticToken::new("test-token"), &recorder), &base).unwrap();

    let ids = client.list_ids(deadline()).await.unwrap();
    assert_eq!(ids, vec!["s1", "s2"]);
}

#[tokio::test]
async fn slow_upstream_hits_deadline() {
    let base = spawn(Router::new().route("/providers/Microsoft.ResourceGraph/resources", post(slow))).await;
    let recorder = Arc::new(RateLimitRecorder::new());
    let client = ResourceGraphClient::new(transport(StaticToken::anonymous(), &recorder), &base).unwrap();

    let err = client
        .query(
            &QueryRequest::new("Resources", vec![], None),
            Deadline::after(Duration::from_millis(200)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::DeadlineExceeded));
}

/// Answers the first `failures` calls with `status` and `Retry-After`, then 200.
#[derive(Clone)]
struct Flaky {
    calls: Arc<AtomicUsize>,
    failures: usize,
    status: StatusCode,
    retry_after: &'static str,
}

impl Flaky {
    fn new(failures: usize, status: StatusCode, retry_after: &'static str) -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            failures,
            status,
            retry_after,
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

async fn flaky_resource_graph(State(flaky): State<Flaky>) -> impl IntoResponse {
    let call = flaky.calls.fetch_add(1, Ordering::SeqCst);
    if call < flaky.failures {
        return (
            flaky.status,
            [("retry-after", flaky.retry_after)],
            Json(json!({"error": {"code": "TooManyRequests", "message": "slow down"}})),
        );
    }
    (
        StatusCode::OK,
        [("retry-after", "0")],
        Json(json!({"totalRecords": 0, "count": 0, "resultTruncated": "false", "data": []})),
    )
}

async fn flaky_client(flaky: &Flaky, recorder: &Arc<RateLimitRecorder>) -> ResourceGraphClient {
    let router = Router::new()
        .route("/providers/Microsoft.ResourceGraph/resources", post(flaky_resource_graph))
        .with_state(flaky.clone());
    let base = spawn(router).await;
    ResourceGraphClient::new(transport(StaticToken::anonymous(), recorder), &base).unwrap()
}

#[tokio::test]
async fn throttled_call_is_retried() {
    let flaky = Flaky::new(1, StatusCode::TOO_MANY_REQUESTS, "0");
    let recorder = Arc::new(RateLimitRecorder::new());
    let client = flaky_client(&flaky, &recorder).await;

    let response = client
        .query(&QueryRequest::new("Resources", vec![], None), deadline())
        .await
        .unwrap();

    assert_eq!(response.count, Some(0));
    assert_eq!(flaky.calls(), 2);
    let out = recorder.render_prometheus();
    assert!(out.contains(r#"azurerm_api_http_request_duration_seconds_count{code="429",method="POST"} 1"#));
    assert!(out.contains(r#"azurerm_api_http_request_duration_seconds_count{code="200",method="POST"} 1"#));
}

#[tokio::test]
async fn retries_are_bounded() {
    let flaky = Flaky::new(usize::MAX, StatusCode::SERVICE_UNAVAILABLE, "0");
    let recorder = Arc::new(RateLimitRecorder::new());
    let client = flaky_client(&flaky, &recorder).await;

    let err = client
        .query(&QueryRequest::new("Resources", vec![], None), deadline())
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::Api { status: 503, .. }));
    assert_eq!(flaky.calls(), MAX_ATTEMPTS as usize);
}

#[tokio::test]
async fn retry_wait_past_deadline_is_skipped() {
    let flaky = Flaky::new(1, StatusCode::TOO_MANY_REQUESTS, "60");
    let recorder = Arc::new(RateLimitRecorder::new());
    let client = flaky_client(&flaky, &recorder).await;

    let err = client
        .query(&QueryRequest::new("Resources", vec![], None), deadline())
        .await
        .unwrap_err();

    match err {
        ClientError::Api { status, code, .. } => {
            assert_eq!(status, 429);
            assert_eq!(code, "TooManyRequests");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(flaky.calls(), 1);
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let flaky = Flaky::new(1, StatusCode::BAD_REQUEST, "0");
    let recorder = Arc::new(RateLimitRecorder::new());
    let client = flaky_client(&flaky, &recorder).await;

    let err = client
        .query(&QueryRequest::new("Resources", vec![], None), deadline())
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::Api { status: 400, .. }));
    assert_eq!(flaky.calls(), 1);
}
