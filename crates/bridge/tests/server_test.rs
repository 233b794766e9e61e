use async_trait::async_trait;
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use grafana_bridge::{
    backend::{LabelQuery, MetricMetadata, MetricsBackend, QueryResult, RangeSeries},
    dashboard::{DashboardStore, DashboardWithMeta, SaveDashboard, SavedDashboardRef},
    prompts::PromptCatalog,
    server::Server,
    tools::{Services, ToolCategory, ToolRegistry},
    Error, Result,
};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Dashboards keyed by UID.
#[derive(Default)]
struct MemoryDashboards {
    dashboards: Mutex<HashMap<String, Value>>,
}

#[async_trait]
impl DashboardStore for MemoryDashboards {
    async fn get_by_uid(&self, uid: &str, _cancel: &CancellationToken) -> Result<DashboardWithMeta> {
        let dashboards = self.dashboards.lock().unwrap();
        let dashboard = dashboards
            .get(uid)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("dashboard {}", uid)))?;
        Ok(DashboardWithMeta {
            dashboard,
            meta: json!({"slug": uid}),
        })
    }

    async fn save(&self, request: &SaveDashboard, _cancel: &CancellationToken) -> Result<SavedDashboardRef> {
        let uid = request.dashboard["uid"].as_str().unwrap_or("generated").to_string();
        self.dashboards.lock().unwrap().insert(uid.clone(), request.dashboard.clone());
        Ok(SavedDashboardRef {
            uid,
            status: "success".into(),
            version: 1,
            ..Default::default()
        })
    }
}

/// Records every range query and answers with one empty series.
#[derive(Default)]
struct RecordingBackend {
    queries: Mutex<Vec<(String, String, Duration)>>,
}

#[async_trait]
impl MetricsBackend for RecordingBackend {
    async fn query_range(
        &self,
        datasource_uid: &str,
        expr: &str,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
        step: Duration,
        _cancel: &CancellationToken,
    ) -> Result<QueryResult> {
        self.queries
            .lock()
            .unwrap()
            .push((datasource_uid.to_string(), expr.to_string(), step));
        Ok(QueryResult::Matrix(vec![RangeSeries {
            metric: BTreeMap::from([("job".to_string(), "api".to_string())]),
            values: vec![(1715342400.0, "1".to_string())],
        }]))
    }

    async fn query_instant(
        &self,
        _datasource_uid: &str,
        _expr: &str,
        _at: DateTime<Utc>,
        _cancel: &CancellationToken,
    ) -> Result<QueryResult> {
        Err(Error::Backend("instant queries are not recorded".into()))
    }

    async fn label_names(&self, _uid: &str, _query: &LabelQuery, _cancel: &CancellationToken) -> Result<Vec<String>> {
        Ok(vec!["__name__".into(), "job".into()])
    }

    async fn label_values(
        &self,
        _uid: &str,
        _label: &str,
        _query: &LabelQuery,
        _cancel: &CancellationToken,
    ) -> Result<Vec<String>> {
        Ok(vec!["up".into(), "http_requests_total".into()])
    }

    async fn metric_metadata(
        &self,
        _uid: &str,
        _metric: &str,
        _limit: usize,
        _limit_per_metric: usize,
        _cancel: &CancellationToken,
    ) -> Result<BTreeMap<String, Vec<MetricMetadata>>> {
        Ok(BTreeMap::new())
    }
}

fn test_server() -> (axum_test::TestServer, Arc<RecordingBackend>) {
    let dashboards = Arc::new(MemoryDashboards::default());
    dashboards.dashboards.lock().unwrap().insert(
        "api".into(),
        json!({
            "uid": "api",
            "panels": [{
                "type": "row",
                "title": "Traffic",
                "panels": [{
                    "title": "Requests",
                    "datasource": {"uid": "prom", "type": "prometheus"},
                    "targets": [{"expr": "rate(http_requests_total{job=\"$job\"}[5m])"}]
                }]
            }]
        }),
    );
    let backend = Arc::new(RecordingBackend::default());

    let services = Services::new(dashboards, backend.clone()).with_request_timeout(Duration::from_secs(5));
    let registry = Arc::new(ToolRegistry::from_categories(&[
        ToolCategory::Prometheus,
        ToolCategory::Dashboard,
    ]));
    let prompts = Arc::new(PromptCatalog::new().unwrap());

    let app = Server::new(registry, services, prompts).build_router();
    (axum_test::TestServer::new(app).unwrap(), backend)
}

#[tokio::test]
async fn test_health_and_listing() {
    let (client, _) = test_server();

    let response = client.get("/health").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");

    let response = client.get("/tools").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let tools: Vec<Value> = response.json();
    assert_eq!(tools.len(), 8);
    let query = tools.iter().find(|t| t["name"] == "query_prometheus").unwrap();
    assert!(query["inputSchema"]["properties"]["datasourceUid"].is_object());

    let prompts: Vec<Value> = client.get("/prompts").await.json();
    assert_eq!(prompts[0]["name"], "extract_promql_from_grafana");
}

#[tokio::test]
async fn test_panel_queries_then_query() {
    let (client, backend) = test_server();

    let response = client
        .post("/tools/get_dashboard_panel_queries")
        .json(&json!({"uid": "api"}))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["success"], true);
    let panel = &body["output"][0];
    assert_eq!(panel["title"], "Requests");
    assert_eq!(panel["variables"], json!(["job"]));

    // Without a value for $job the backend is never contacted
    let response = client
        .post("/tools/query_prometheus")
        .json(&json!({"datasourceUid": "prom", "expr": panel["query"], "from": "now-1h"}))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["success"], false);
    assert_eq!(body["metadata"]["missing"], json!(["$job"]));
    assert!(backend.queries.lock().unwrap().is_empty());

    let response = client
        .post("/tools/query_prometheus")
        .json(&json!({
            "datasourceUid": "prom",
            "expr": panel["query"],
            "from": "now-1h",
            "stepSeconds": 60,
            "variables": {"job": "api"}
        }))
        .await;
    let body: Value = response.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["output"]["resultType"], "matrix");
    assert_eq!(
        backend.queries.lock().unwrap().clone(),
        vec![(
            "prom".to_string(),
            "rate(http_requests_total{job=\"api\"}[5m])".to_string(),
            Duration::from_secs(60)
        )]
    );
}

#[tokio::test]
async fn test_error_statuses() {
    let (client, _) = test_server();

    let response = client.post("/tools/no_such_tool").json(&json!({})).await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);

    let response = client.post("/tools/query_prometheus").json(&json!({"expr": 1})).await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

    // Tool failures are reported in the body
    let response = client
        .post("/tools/get_dashboard_panel_queries")
        .json(&json!({"uid": "missing"}))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().starts_with("malformed dashboard"));

    let response = client
        .post("/prompts/extract_promql_from_grafana")
        .json(&json!({"dashboardUID": "api"}))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_metrics_endpoint_counts_calls() {
    let (client, _) = test_server();

    client
        .post("/tools/list_prometheus_metric_names")
        .json(&json!({"datasourceUid": "prom", "regex": "^up$"}))
        .await;

    let text = client.get("/metrics").await.text();
    assert!(text.contains("tool=\"list_prometheus_metric_names\""));
}
