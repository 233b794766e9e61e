//! HTTP transport
//!
//! Exposes the tool registry and prompt catalog as a small JSON API.

mod routes;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::prompts::PromptCatalog;
use crate::tools::{Services, ToolRegistry};
use crate::Result;

pub struct AppState {
    pub registry: Arc<ToolRegistry>,
    pub services: Services,
    pub prompts: Arc<PromptCatalog>,
}

pub struct Server {
    state: Arc<AppState>,
}

impl Server {
    pub fn new(registry: Arc<ToolRegistry>, services: Services, prompts: Arc<PromptCatalog>) -> Self {
        Self {
            state: Arc::new(AppState {
                registry,
                services,
                prompts,
            }),
        }
    }

    pub fn build_router(self) -> Router {
        Router::new()
            .route("/health", get(routes::health))
            .route("/tools", get(routes::list_tools))
            .route("/tools/{name}", post(routes::call_tool))
            .route("/prompts", get(routes::list_prompts))
            .route("/prompts/{name}", post(routes::get_prompt))
            .route("/metrics", get(routes::metrics))
            .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
            .with_state(self.state)
    }

    pub async fn start(self, addr: &str) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("Listening on http://{}", listener.local_addr()?);
        axum::serve(listener, self.build_router()).await?;
        Ok(())
    }
}
