//! Prometheus query and listing tools

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use super::{ToolContext, ToolRegistry, TypedTool};
use crate::backend::{LabelQuery, MetricMetadata, QueryResult};
use crate::query::{
    filter_and_page, parse_time, resolve, Dispatcher, Page, Selector, TimeWindow, LABEL_LIMIT, METRIC_NAME_LIMIT,
};
use crate::{Error, Result};

pub fn register(registry: &mut ToolRegistry) {
    registry.register(QueryPrometheus);
    registry.register(ListMetricNames);
    registry.register(ListLabelNames);
    registry.register(ListLabelValues);
    registry.register(ListMetricMetadata);
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueryPrometheusParams {
    /// The UID of the datasource to query
    pub datasource_uid: String,
    /// The PromQL expression to query
    pub expr: String,
    /// The start time of the query. Either RFC3339, epoch milliseconds, 'now' or a relative time like 'now-1h'
    pub from: String,
    /// The end time of the range query, same forms as 'from'. Defaults to 'now'
    #[serde(default)]
    pub to: Option<String>,
    /// The step size in seconds for range queries
    #[serde(default)]
    pub step_seconds: Option<u64>,
    /// The type of query: 'range' (default) or 'instant'
    #[serde(default)]
    pub query_type: Option<String>,
    /// Values for the $variables used in 'expr'
    #[serde(default)]
    pub variables: HashMap<String, String>,
}

pub struct QueryPrometheus;

#[async_trait]
impl TypedTool for QueryPrometheus {
    const NAME: &'static str = "query_prometheus";
    const TITLE: &'static str = "Query Prometheus metrics";
    const DESCRIPTION: &'static str = "Query Prometheus using a range or instant request. \
        Dashboard variables such as $job must be given values in 'variables'; \
        the call fails listing any that are missing.";

    type Args = QueryPrometheusParams;
    type Output = QueryResult;

    async fn call(&self, ctx: &ToolContext, args: QueryPrometheusParams) -> Result<QueryResult> {
        let expr = resolve(&args.expr, &args.variables)?;
        let window = TimeWindow {
            from: args.from,
            to: args.to.filter(|t| !t.is_empty()),
            step: args.step_seconds.map(Duration::from_secs),
        };

        Dispatcher::new(ctx.metrics.as_ref())
            .with_default_step(ctx.default_step)
            .dispatch(
                &expr,
                &args.datasource_uid,
                args.query_type.as_deref(),
                &window,
                ctx.now,
                &ctx.cancel,
            )
            .await
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListMetricNamesParams {
    /// The UID of the datasource to query
    pub datasource_uid: String,
    /// The regex to match against the metric names
    #[serde(default)]
    pub regex: Option<String>,
    /// The maximum number of results to return
    #[serde(default)]
    pub limit: Option<usize>,
    /// The page number to return
    #[serde(default)]
    pub page: Option<usize>,
}

pub struct ListMetricNames;

#[async_trait]
impl TypedTool for ListMetricNames {
    const NAME: &'static str = "list_prometheus_metric_names";
    const TITLE: &'static str = "List Prometheus metric names";
    const DESCRIPTION: &'static str = "List metric names in a Prometheus datasource that match the given regex";

    type Args = ListMetricNamesParams;
    type Output = Vec<String>;

    async fn call(&self, ctx: &ToolContext, args: ListMetricNamesParams) -> Result<Vec<String>> {
        let names = ctx
            .metrics
            .label_values(&args.datasource_uid, "__name__", &LabelQuery::default(), &ctx.cancel)
            .await?;
        filter_and_page(
            names,
            args.regex.as_deref(),
            Page::new(args.page, args.limit, METRIC_NAME_LIMIT),
        )
    }
}

/// Selectors and time bounds shared by the two label listings.
#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LabelFilter {
    /// Optionally, a list of label matchers to filter the results by
    #[serde(default)]
    pub matches: Vec<Selector>,
    /// Optionally, the start time of the time range to filter the results by
    #[serde(default, rename = "startRfc3339")]
    pub start: Option<String>,
    /// Optionally, the end time of the time range to filter the results by
    #[serde(default, rename = "endRfc3339")]
    pub end: Option<String>,
}

impl LabelFilter {
    fn to_query(&self, ctx: &ToolContext) -> Result<LabelQuery> {
        let mut matchers = Vec::with_capacity(self.matches.len());
        for selector in &self.matches {
            selector.validate()?;
            matchers.push(selector.render());
        }

        let bound = |raw: &Option<String>| -> Result<_> {
            match raw.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
                Some(s) => parse_time(s, ctx.now).map(Some),
                None => Ok(None),
            }
        };
        let start = bound(&self.start)?;
        let end = bound(&self.end)?;
        if let (Some(s), Some(e)) = (start, end) {
            if e < s {
                return Err(Error::InvalidTimeRange {
                    start: s.to_rfc3339(),
                    end: e.to_rfc3339(),
                });
            }
        }

        Ok(LabelQuery { matchers, start, end })
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListLabelNamesParams {
    /// The UID of the datasource to query
    pub datasource_uid: String,
    #[serde(flatten)]
    pub filter: LabelFilter,
    /// Optionally, the maximum number of results to return
    #[serde(default)]
    pub limit: Option<usize>,
    /// The page number to return
    #[serde(default)]
    pub page: Option<usize>,
}

pub struct ListLabelNames;

#[async_trait]
impl TypedTool for ListLabelNames {
    const NAME: &'static str = "list_prometheus_label_names";
    const TITLE: &'static str = "List Prometheus label names";
    const DESCRIPTION: &'static str =
        "List the label names in a Prometheus datasource, optionally filtered by series selectors and a time range";

    type Args = ListLabelNamesParams;
    type Output = Vec<String>;

    async fn call(&self, ctx: &ToolContext, args: ListLabelNamesParams) -> Result<Vec<String>> {
        let query = args.filter.to_query(ctx)?;
        let names = ctx.metrics.label_names(&args.datasource_uid, &query, &ctx.cancel).await?;
        filter_and_page(names, None, Page::new(args.page, args.limit, LABEL_LIMIT))
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListLabelValuesParams {
    /// The UID of the datasource to query
    pub datasource_uid: String,
    /// The name of the label to query
    pub label_name: String,
    #[serde(flatten)]
    pub filter: LabelFilter,
    /// Optionally, the maximum number of results to return
    #[serde(default)]
    pub limit: Option<usize>,
    /// The page number to return
    #[serde(default)]
    pub page: Option<usize>,
}

pub struct ListLabelValues;

#[async_trait]
impl TypedTool for ListLabelValues {
    const NAME: &'static str = "list_prometheus_label_values";
    const TITLE: &'static str = "List Prometheus label values";
    const DESCRIPTION: &'static str =
        "Get the values for a specific label name, optionally filtered by series selectors and a time range";

    type Args = ListLabelValuesParams;
    type Output = Vec<String>;

    async fn call(&self, ctx: &ToolContext, args: ListLabelValuesParams) -> Result<Vec<String>> {
        if args.label_name.is_empty() {
            return Err(Error::Validation("labelName must not be empty".into()));
        }
        let query = args.filter.to_query(ctx)?;
        let values = ctx
            .metrics
            .label_values(&args.datasource_uid, &args.label_name, &query, &ctx.cancel)
            .await?;
        filter_and_page(values, None, Page::new(args.page, args.limit, LABEL_LIMIT))
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListMetricMetadataParams {
    /// The UID of the datasource to query
    pub datasource_uid: String,
    /// The metric to query
    #[serde(default)]
    pub metric: Option<String>,
    /// The maximum number of metrics to return
    #[serde(default)]
    pub limit: Option<usize>,
    /// The maximum number of metadata records to return per metric
    #[serde(default)]
    pub limit_per_metric: Option<usize>,
}

pub struct ListMetricMetadata;

#[async_trait]
impl TypedTool for ListMetricMetadata {
    const NAME: &'static str = "list_prometheus_metric_metadata";
    const TITLE: &'static str = "List Prometheus metric metadata";
    const DESCRIPTION: &'static str = "List Prometheus metric metadata. Returns metadata about metrics currently scraped from targets.";

    type Args = ListMetricMetadataParams;
    type Output = BTreeMap<String, Vec<MetricMetadata>>;

    async fn call(
        &self,
        ctx: &ToolContext,
        args: ListMetricMetadataParams,
    ) -> Result<BTreeMap<String, Vec<MetricMetadata>>> {
        ctx.metrics
            .metric_metadata(
                &args.datasource_uid,
                args.metric.as_deref().unwrap_or_default(),
                args.limit.filter(|l| *l > 0).unwrap_or(METRIC_NAME_LIMIT),
                args.limit_per_metric.unwrap_or(0),
                &ctx.cancel,
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockMetricsBackend;
    use crate::dashboard::MockDashboardStore;
    use crate::query::DEFAULT_STEP;
    use crate::tools::test_support::context;
    use crate::tools::Tool;
    use chrono::Duration as ChronoDuration;
    use serde_json::json;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("metric_{:02}", i)).collect()
    }

    #[tokio::test]
    async fn test_query_reports_missing_variables_without_querying() {
        let mut metrics = MockMetricsBackend::new();
        metrics.expect_query_range().never();
        let ctx = context(MockDashboardStore::new(), metrics);

        let out = QueryPrometheus
            .execute(
                &ctx,
                json!({
                    "datasourceUid": "prom",
                    "expr": "rate(http_requests_total{job=\"$job\", ns=\"$ns\"}[5m])",
                    "from": "now-1h",
                    "variables": {"job": "api"}
                }),
            )
            .await;
        assert!(matches!(out, Err(Error::UnresolvedVariables(v)) if v == vec!["$ns".to_string()]));
    }

    #[tokio::test]
    async fn test_query_defaults_to_range_with_default_step() {
        let mut metrics = MockMetricsBackend::new();
        let now = context(MockDashboardStore::new(), MockMetricsBackend::new()).now;
        metrics
            .expect_query_range()
            .withf(move |uid, expr, start, end, step, _| {
                uid == "prom"
                    && expr == "up{job=\"api\"}"
                    && *start == now - ChronoDuration::hours(1)
                    && *end == now
                    && *step == DEFAULT_STEP
            })
            .times(1)
            .returning(|_, _, _, _, _, _| Ok(QueryResult::Matrix(vec![])));
        let ctx = context(MockDashboardStore::new(), metrics);

        let out = QueryPrometheus
            .execute(
                &ctx,
                json!({
                    "datasourceUid": "prom",
                    "expr": "up{job=\"$job\"}",
                    "from": "now-1h",
                    "stepSeconds": 0,
                    "variables": {"job": "api"}
                }),
            )
            .await
            .unwrap();
        assert_eq!(out, json!({"resultType": "matrix", "result": []}));
    }

    #[tokio::test]
    async fn test_metric_names_are_filtered_and_paged() {
        let mut metrics = MockMetricsBackend::new();
        metrics
            .expect_label_values()
            .withf(|uid, label, query, _| uid == "prom" && label == "__name__" && query.matchers.is_empty())
            .times(2)
            .returning(|_, _, _, _| Ok(names(25)));
        let ctx = context(MockDashboardStore::new(), metrics);

        let first = ListMetricNames
            .call(
                &ctx,
                ListMetricNamesParams {
                    datasource_uid: "prom".into(),
                    regex: None,
                    limit: None,
                    page: Some(3),
                },
            )
            .await
            .unwrap();
        assert_eq!(first, names(25)[20..].to_vec());

        let filtered = ListMetricNames
            .call(
                &ctx,
                ListMetricNamesParams {
                    datasource_uid: "prom".into(),
                    regex: Some("_1".into()),
                    limit: Some(3),
                    page: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(filtered, vec!["metric_10", "metric_11", "metric_12"]);
    }

    #[tokio::test]
    async fn test_label_values_renders_selectors_and_times() {
        let mut metrics = MockMetricsBackend::new();
        let now = context(MockDashboardStore::new(), MockMetricsBackend::new()).now;
        metrics
            .expect_label_values()
            .withf(move |uid, label, query, _| {
                uid == "prom"
                    && label == "pod"
                    && query.matchers == vec!["{job='api', ns=~'prod.*'}".to_string()]
                    && query.start == Some(now - ChronoDuration::hours(6))
                    && query.end.is_none()
            })
            .times(1)
            .returning(|_, _, _, _| Ok(vec!["a".into(), "b".into()]));
        let ctx = context(MockDashboardStore::new(), metrics);

        let out = ListLabelValues
            .execute(
                &ctx,
                json!({
                    "datasourceUid": "prom",
                    "labelName": "pod",
                    "matches": [{"filters": [
                        {"name": "job", "value": "api", "type": "="},
                        {"name": "ns", "value": "prod.*", "type": "=~"}
                    ]}],
                    "startRfc3339": "now-6h"
                }),
            )
            .await
            .unwrap();
        assert_eq!(out, json!(["a", "b"]));
    }

    #[tokio::test]
    async fn test_label_names_reject_bad_matcher_before_backend() {
        let mut metrics = MockMetricsBackend::new();
        metrics.expect_label_names().never();
        let ctx = context(MockDashboardStore::new(), metrics);

        let out = ListLabelNames
            .execute(
                &ctx,
                json!({
                    "datasourceUid": "prom",
                    "matches": [{"filters": [{"name": "job", "value": "api", "type": "=="}]}]
                }),
            )
            .await;
        assert!(matches!(out, Err(Error::InvalidMatcher(op)) if op == "=="));
    }

    #[tokio::test]
    async fn test_label_names_time_bounds_checked_before_backend() {
        let mut metrics = MockMetricsBackend::new();
        metrics.expect_label_names().never();
        let ctx = context(MockDashboardStore::new(), metrics);

        let inverted = ListLabelNames
            .execute(
                &ctx,
                json!({"datasourceUid": "prom", "startRfc3339": "now", "endRfc3339": "now-1h"}),
            )
            .await;
        assert!(matches!(inverted, Err(Error::InvalidTimeRange { .. })));

        let garbage = ListLabelNames
            .execute(&ctx, json!({"datasourceUid": "prom", "startRfc3339": "yesterday"}))
            .await;
        assert!(matches!(garbage, Err(Error::Parse { input, .. }) if input == "yesterday"));
    }

    #[tokio::test]
    async fn test_label_names_allow_equal_bounds() {
        let mut metrics = MockMetricsBackend::new();
        let now = context(MockDashboardStore::new(), MockMetricsBackend::new()).now;
        metrics
            .expect_label_names()
            .withf(move |uid, query, _| uid == "prom" && query.start == Some(now) && query.end == Some(now))
            .times(1)
            .returning(|_, _, _| Ok(vec!["job".into()]));
        let ctx = context(MockDashboardStore::new(), metrics);

        let out = ListLabelNames
            .execute(
                &ctx,
                json!({"datasourceUid": "prom", "startRfc3339": "now", "endRfc3339": "now"}),
            )
            .await
            .unwrap();
        assert_eq!(out, json!(["job"]));
    }

    #[tokio::test]
    async fn test_metadata_default_limit() {
        let mut metrics = MockMetricsBackend::new();
        metrics
            .expect_metric_metadata()
            .withf(|uid, metric, limit, per_metric, _| {
                uid == "prom" && metric.is_empty() && *limit == 10 && *per_metric == 0
            })
            .times(1)
            .returning(|_, _, _, _, _| Ok(BTreeMap::new()));
        let ctx = context(MockDashboardStore::new(), metrics);

        let out = ListMetricMetadata
            .execute(&ctx, json!({"datasourceUid": "prom"}))
            .await
            .unwrap();
        assert_eq!(out, json!({}));
    }
}
