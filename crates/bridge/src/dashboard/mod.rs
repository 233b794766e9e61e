//! Dashboards
//!
//! The [`DashboardStore`] trait is the only way the bridge reads or writes
//! dashboards; [`extract`] pulls query targets out of a fetched document.

pub mod extract;
pub mod node;

pub use extract::{extract_panel_queries, fetch_panel_queries, DatasourceRef, PanelQuery};

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

#[cfg(test)]
use mockall::automock;

use crate::Result;

/// A dashboard document together with its store metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardWithMeta {
    pub dashboard: Value,
    #[serde(default)]
    pub meta: Value,
}

/// Create or update request, shaped like Grafana's save command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SaveDashboard {
    /// The full dashboard JSON
    pub dashboard: Value,
    /// The UID of the dashboard's folder
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_uid: Option<String>,
    /// Commit message for the version history
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Overwrite the dashboard if it exists, otherwise create one
    #[serde(default)]
    pub overwrite: bool,
    /// ID of the user making the change
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedDashboardRef {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub version: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait DashboardStore: Send + Sync {
    /// Fails with `NotFound` when no dashboard has `uid`.
    async fn get_by_uid(&self, uid: &str, cancel: &CancellationToken) -> Result<DashboardWithMeta>;

    async fn save(&self, request: &SaveDashboard, cancel: &CancellationToken) -> Result<SavedDashboardRef>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_save_command_shape() {
        let cmd: SaveDashboard = serde_json::from_value(json!({
            "dashboard": {"title": "API"},
            "folderUid": "ops",
            "overwrite": true
        }))
        .unwrap();
        assert_eq!(cmd.folder_uid.as_deref(), Some("ops"));
        assert!(cmd.overwrite);

        let out = serde_json::to_value(&cmd).unwrap();
        assert_eq!(out, json!({"dashboard": {"title": "API"}, "folderUid": "ops", "overwrite": true}));
    }
}
