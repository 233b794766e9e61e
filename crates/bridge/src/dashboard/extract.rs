//! Panel query extraction
//!
//! Walks a dashboard's panel tree, including rows that nest other panels,
//! and flattens every target with a non-empty `expr` into a [`PanelQuery`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::node::Node;
use super::DashboardStore;
use crate::query::variables::variable_names;
use crate::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasourceRef {
    pub uid: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelQuery {
    pub title: String,
    pub query: String,
    pub datasource: DatasourceRef,
    /// Variable names referenced by `query`, first-seen order, no `$`.
    pub variables: Vec<String>,
}

/// Fetch dashboard `uid` and extract its panel queries.
pub async fn fetch_panel_queries(
    store: &dyn DashboardStore,
    uid: &str,
    cancel: &CancellationToken,
) -> Result<Vec<PanelQuery>> {
    let dashboard = store.get_by_uid(uid, cancel).await.map_err(|e| match e {
        Error::Cancelled => Error::Cancelled,
        other => Error::MalformedDashboard(format!("get dashboard by uid {}: {}", uid, other)),
    })?;

    let queries = extract_panel_queries(&dashboard.dashboard)?;
    debug!("Extracted {} panel queries from dashboard {}", queries.len(), uid);
    Ok(queries)
}

/// Extract panel queries from a dashboard document, depth first in
/// document order.
pub fn extract_panel_queries(document: &Value) -> Result<Vec<PanelQuery>> {
    if !document.is_object() {
        return Err(Error::MalformedDashboard("dashboard is not a JSON object".into()));
    }
    let panels = document
        .seq_field("panels")
        .ok_or_else(|| Error::MalformedDashboard("panels is not a JSON array".into()))?;

    let mut out = Vec::new();
    walk(panels, &mut out);
    Ok(out)
}

fn walk(panels: &[Value], out: &mut Vec<PanelQuery>) {
    for panel in panels {
        if !panel.is_object() {
            continue;
        }

        // Rows carry their children either under `collapsed` or `panels`;
        // children are emitted before the row's own targets.
        if let Some(children) = panel.seq_field("collapsed") {
            walk(children, out);
        }
        if let Some(children) = panel.seq_field("panels") {
            walk(children, out);
        }

        let Some(targets) = panel.seq_field("targets") else {
            continue;
        };

        let title = panel.str_field("title").unwrap_or_default();
        let datasource = datasource_of(panel);

        for target in targets {
            let Some(expr) = target.str_field("expr").filter(|e| !e.is_empty()) else {
                continue;
            };
            out.push(PanelQuery {
                title: title.to_string(),
                query: expr.to_string(),
                datasource: datasource.clone(),
                variables: variable_names(expr),
            });
        }
    }
}

fn datasource_of(panel: &Value) -> DatasourceRef {
    match panel.map_field("datasource") {
        Some(ds) => DatasourceRef {
            uid: ds.str_field("uid").unwrap_or_default().to_string(),
            kind: ds.str_field("type").unwrap_or_default().to_string(),
        },
        None => DatasourceRef::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dashboard::{DashboardWithMeta, MockDashboardStore};
    use serde_json::json;

    fn target(expr: &str) -> Value {
        json!({"refId": "A", "expr": expr})
    }

    #[test]
    fn test_collapsed_row_children_in_order() {
        let dashboard = json!({
            "panels": [
                {
                    "type": "row",
                    "title": "Pods",
                    "collapsed": [
                        {
                            "title": "CPU",
                            "datasource": {"uid": "prom", "type": "prometheus"},
                            "targets": [target("rate(cpu{namespace=\"$ns\"}[5m])")]
                        },
                        {
                            "title": "Memory",
                            "datasource": {"uid": "prom", "type": "prometheus"},
                            "targets": [target("mem{namespace=\"$ns\"} / on() group_left mem{namespace=\"$ns\"}")]
                        }
                    ]
                }
            ]
        });

        let queries = extract_panel_queries(&dashboard).unwrap();
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[0].title, "CPU");
        assert_eq!(queries[1].title, "Memory");
        for q in &queries {
            assert_eq!(q.variables, vec!["ns"]);
            assert_eq!(q.datasource, DatasourceRef { uid: "prom".into(), kind: "prometheus".into() });
        }
    }

    #[test]
    fn test_nested_panels_and_depth_first_order() {
        let dashboard = json!({
            "panels": [
                {"title": "first", "targets": [target("a")]},
                {
                    "title": "row",
                    "collapsed": false,
                    "panels": [
                        {"title": "inner", "targets": [target("b")]},
                        {"title": "deeper", "panels": [{"title": "deepest", "targets": [target("c")]}]}
                    ],
                    "targets": [target("row_own")]
                },
                {"title": "last", "targets": [target("d")]}
            ]
        });

        let queries: Vec<String> = extract_panel_queries(&dashboard)
            .unwrap()
            .into_iter()
            .map(|q| q.query)
            .collect();
        assert_eq!(queries, vec!["a", "b", "c", "row_own", "d"]);
    }

    #[test]
    fn test_one_record_per_target_sharing_panel_fields() {
        let dashboard = json!({
            "panels": [{
                "title": "Latency",
                "datasource": {"uid": "$datasource"},
                "targets": [target("p50"), {"expr": ""}, {"refId": "C"}, target("p99 + $q")]
            }]
        });

        let queries = extract_panel_queries(&dashboard).unwrap();
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[0].query, "p50");
        assert!(queries[0].variables.is_empty());
        assert_eq!(queries[1].variables, vec!["q"]);
        assert_eq!(queries[1].datasource.uid, "$datasource");
        assert_eq!(queries[1].datasource.kind, "");
    }

    #[test]
    fn test_mistyped_fields_are_ignored() {
        let dashboard = json!({
            "panels": [
                "not a panel",
                42,
                {"title": 7, "datasource": "Prometheus", "targets": [target("up")]},
                {"title": "broken", "targets": "up"},
                {"title": "bad targets", "targets": [null, "up", {"expr": 5}]}
            ]
        });

        let queries = extract_panel_queries(&dashboard).unwrap();
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].title, "");
        assert_eq!(queries[0].datasource, DatasourceRef::default());
    }

    #[test]
    fn test_empty_dashboard_is_not_an_error() {
        assert!(extract_panel_queries(&json!({"panels": []})).unwrap().is_empty());
        assert!(extract_panel_queries(&json!({"panels": [{"title": "text"}]}))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_malformed_documents() {
        for doc in [json!({}), json!({"panels": {}}), json!([]), json!(null)] {
            assert!(
                matches!(extract_panel_queries(&doc), Err(Error::MalformedDashboard(_))),
                "{}",
                doc
            );
        }
    }

    #[tokio::test]
    async fn test_fetch_failure_is_malformed_dashboard() {
        let mut store = MockDashboardStore::new();
        store
            .expect_get_by_uid()
            .returning(|uid, _| Err(Error::NotFound(format!("dashboard {}", uid))));

        let err = fetch_panel_queries(&store, "abc", &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            Error::MalformedDashboard(msg) => assert!(msg.contains("abc")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_and_extract() {
        let mut store = MockDashboardStore::new();
        store.expect_get_by_uid().times(1).returning(|_, _| {
            Ok(DashboardWithMeta {
                dashboard: json!({"panels": [{"title": "Up", "targets": [{"expr": "up{job=\"$job\"}"}]}]}),
                meta: json!({}),
            })
        });

        let queries = fetch_panel_queries(&store, "abc", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(queries[0].variables, vec!["job"]);
    }

    #[tokio::test]
    async fn test_fetch_cancelled_stays_cancelled() {
        let mut store = MockDashboardStore::new();
        store.expect_get_by_uid().returning(|_, _| Err(Error::Cancelled));

        let err = fetch_panel_queries(&store, "abc", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }
}
