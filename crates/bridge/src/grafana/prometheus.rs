//! Prometheus datasources through the Grafana proxy
//!
//! Requests go to `/api/datasources/proxy/uid/{uid}/api/v1/...`, so the
//! bridge only ever needs Grafana credentials.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::GrafanaClient;
use crate::backend::{cancellable, LabelQuery, MetricMetadata, MetricsBackend, QueryResult};
use crate::{Error, Result};

/// Prometheus API client scoped to Grafana's datasource proxy
#[derive(Clone)]
pub struct PrometheusProxy {
    grafana: GrafanaClient,
}

impl PrometheusProxy {
    pub fn new(grafana: GrafanaClient) -> Self {
        Self { grafana }
    }

    /// GET a Prometheus API path for datasource `uid` and unwrap the
    /// `{status, data}` envelope.
    async fn api_get<T: DeserializeOwned>(
        &self,
        uid: &str,
        path: &[&str],
        params: &[(&str, String)],
        what: &str,
    ) -> Result<T> {
        self.grafana.ensure_datasource(uid).await?;

        let mut segments = vec!["api", "datasources", "proxy", "uid", uid, "api", "v1"];
        segments.extend_from_slice(path);
        let url = self.grafana.endpoint(&segments);

        let response = self.grafana.request(Method::GET, url).query(params).send().await?;
        let status = response.status();
        let body = response.text().await?;

        // Prometheus reports query errors in the envelope with a 4xx/5xx status
        match serde_json::from_str::<ApiResponse<T>>(&body) {
            Ok(envelope) if envelope.status == "success" => envelope
                .data
                .ok_or_else(|| Error::Backend(format!("{}: response has no data", what))),
            Ok(envelope) => Err(Error::Backend(format!(
                "{}: {}: {}",
                what,
                envelope.error_type.unwrap_or_else(|| "error".into()),
                envelope.error.unwrap_or_default()
            ))),
            Err(_) if !status.is_success() => {
                Err(Error::Backend(format!("{} failed ({}): {}", what, status, body)))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl MetricsBackend for PrometheusProxy {
    async fn query_range(
        &self,
        datasource_uid: &str,
        expr: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step: Duration,
        cancel: &CancellationToken,
    ) -> Result<QueryResult> {
        let params = [
            ("query", expr.to_string()),
            ("start", format_time(start)),
            ("end", format_time(end)),
            ("step", step.as_secs_f64().to_string()),
        ];
        cancellable(
            cancel,
            self.api_get(datasource_uid, &["query_range"], &params, "Prometheus range query"),
        )
        .await
    }

    async fn query_instant(
        &self,
        datasource_uid: &str,
        expr: &str,
        at: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<QueryResult> {
        let params = [("query", expr.to_string()), ("time", format_time(at))];
        cancellable(
            cancel,
            self.api_get(datasource_uid, &["query"], &params, "Prometheus instant query"),
        )
        .await
    }

    async fn label_names(
        &self,
        datasource_uid: &str,
        query: &LabelQuery,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>> {
        let params = label_params(query);
        cancellable(
            cancel,
            self.api_get(datasource_uid, &["labels"], &params, "listing Prometheus label names"),
        )
        .await
    }

    async fn label_values(
        &self,
        datasource_uid: &str,
        label: &str,
        query: &LabelQuery,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>> {
        let params = label_params(query);
        cancellable(
            cancel,
            self.api_get(
                datasource_uid,
                &["label", label, "values"],
                &params,
                "listing Prometheus label values",
            ),
        )
        .await
    }

    async fn metric_metadata(
        &self,
        datasource_uid: &str,
        metric: &str,
        limit: usize,
        limit_per_metric: usize,
        cancel: &CancellationToken,
    ) -> Result<BTreeMap<String, Vec<MetricMetadata>>> {
        let mut params = vec![("limit", limit.to_string())];
        if !metric.is_empty() {
            params.push(("metric", metric.to_string()));
        }
        if limit_per_metric > 0 {
            params.push(("limit_per_metric", limit_per_metric.to_string()));
        }
        cancellable(
            cancel,
            self.api_get(datasource_uid, &["metadata"], &params, "listing Prometheus metric metadata"),
        )
        .await
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    status: String,
    data: Option<T>,
    #[serde(rename = "errorType")]
    error_type: Option<String>,
    error: Option<String>,
}

/// Unix seconds with millisecond precision, as the Prometheus API accepts.
fn format_time(t: DateTime<Utc>) -> String {
    format!("{:.3}", t.timestamp_millis() as f64 / 1000.0)
}

fn label_params(query: &LabelQuery) -> Vec<(&'static str, String)> {
    let mut params: Vec<(&'static str, String)> = query
        .matchers
        .iter()
        .map(|m| ("match[]", m.clone()))
        .collect();
    if let Some(start) = query.start {
        params.push(("start", format_time(start)));
    }
    if let Some(end) = query.end {
        params.push(("end", format_time(end)));
    }
    params
}
