//! Metrics backend interface
//!
//! The query engine talks to Prometheus-compatible datasources only through
//! [`MetricsBackend`]. The production implementation proxies through Grafana
//! (see [`crate::grafana::prometheus`]).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[cfg(test)]
use mockall::automock;

use crate::query::selector::Labels;
use crate::{Error, Result};

/// `[unix_seconds, "value"]` as returned by the Prometheus HTTP API.
pub type SamplePair = (f64, String);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeSeries {
    #[serde(default)]
    pub metric: Labels,
    #[serde(default)]
    pub values: Vec<SamplePair>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstantSample {
    #[serde(default)]
    pub metric: Labels,
    pub value: SamplePair,
}

/// Result of an instant or range query, tagged like the Prometheus API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "resultType", content = "result", rename_all = "lowercase")]
pub enum QueryResult {
    Matrix(Vec<RangeSeries>),
    Vector(Vec<InstantSample>),
    Scalar(SamplePair),
    String(SamplePair),
}

impl QueryResult {
    pub fn result_type(&self) -> &'static str {
        match self {
            QueryResult::Matrix(_) => "matrix",
            QueryResult::Vector(_) => "vector",
            QueryResult::Scalar(_) => "scalar",
            QueryResult::String(_) => "string",
        }
    }

    /// Number of series (or 1 for scalar/string results).
    pub fn len(&self) -> usize {
        match self {
            QueryResult::Matrix(series) => series.len(),
            QueryResult::Vector(samples) => samples.len(),
            QueryResult::Scalar(_) | QueryResult::String(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricMetadata {
    #[serde(rename = "type")]
    pub metric_type: String,
    #[serde(default)]
    pub help: String,
    #[serde(default)]
    pub unit: String,
}

/// Series selectors and optional time bounds for label listings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelQuery {
    /// Rendered selectors, sent as `match[]`.
    pub matchers: Vec<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait MetricsBackend: Send + Sync {
    async fn query_range(
        &self,
        datasource_uid: &str,
        expr: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step: Duration,
        cancel: &CancellationToken,
    ) -> Result<QueryResult>;

    async fn query_instant(
        &self,
        datasource_uid: &str,
        expr: &str,
        at: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<QueryResult>;

    async fn label_names(
        &self,
        datasource_uid: &str,
        query: &LabelQuery,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>>;

    async fn label_values(
        &self,
        datasource_uid: &str,
        label: &str,
        query: &LabelQuery,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>>;

    /// `metric` empty means all metrics.
    async fn metric_metadata(
        &self,
        datasource_uid: &str,
        metric: &str,
        limit: usize,
        limit_per_metric: usize,
        cancel: &CancellationToken,
    ) -> Result<BTreeMap<String, Vec<MetricMetadata>>>;
}

/// Race `fut` against `cancel`. A cancelled call yields [`Error::Cancelled`]
/// and the in-flight future is dropped.
pub async fn cancellable<F, T>(cancel: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        res = fut => res,
    }
}
