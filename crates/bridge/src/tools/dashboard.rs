//! Dashboard tools

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;

use super::{ToolContext, ToolRegistry, TypedTool};
use crate::dashboard::{fetch_panel_queries, DashboardWithMeta, PanelQuery, SaveDashboard, SavedDashboardRef};
use crate::Result;

pub fn register(registry: &mut ToolRegistry) {
    registry.register(GetDashboardByUid);
    registry.register(UpdateDashboard);
    registry.register(GetDashboardPanelQueries);
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DashboardUidParams {
    /// The UID of the dashboard
    pub uid: String,
}

pub struct GetDashboardByUid;

#[async_trait]
impl TypedTool for GetDashboardByUid {
    const NAME: &'static str = "get_dashboard_by_uid";
    const TITLE: &'static str = "Get dashboard details";
    const DESCRIPTION: &'static str = "Retrieves the complete dashboard, including panels, variables, and settings, for a specific dashboard identified by its UID.";

    type Args = DashboardUidParams;
    type Output = DashboardWithMeta;

    async fn call(&self, ctx: &ToolContext, args: DashboardUidParams) -> Result<DashboardWithMeta> {
        ctx.dashboards.get_by_uid(&args.uid, &ctx.cancel).await
    }
}

pub struct UpdateDashboard;

#[async_trait]
impl TypedTool for UpdateDashboard {
    const NAME: &'static str = "update_dashboard";
    const TITLE: &'static str = "Create or update dashboard";
    const DESCRIPTION: &'static str = "Create or update a dashboard";
    const READ_ONLY: bool = false;

    type Args = SaveDashboard;
    type Output = SavedDashboardRef;

    async fn call(&self, ctx: &ToolContext, args: SaveDashboard) -> Result<SavedDashboardRef> {
        ctx.dashboards.save(&args, &ctx.cancel).await
    }
}

pub struct GetDashboardPanelQueries;

#[async_trait]
impl TypedTool for GetDashboardPanelQueries {
    const NAME: &'static str = "get_dashboard_panel_queries";
    const TITLE: &'static str = "Get dashboard panel queries";
    const DESCRIPTION: &'static str = "Get the title, query string, datasource and referenced variables of every panel target in a dashboard. \
        Rows and nested panels are included.";

    type Args = DashboardUidParams;
    type Output = Vec<PanelQuery>;

    async fn call(&self, ctx: &ToolContext, args: DashboardUidParams) -> Result<Vec<PanelQuery>> {
        fetch_panel_queries(ctx.dashboards.as_ref(), &args.uid, &ctx.cancel).await
    }
}
