use axum::{
    body::Bytes,
    extract::{Path, State},
    response::{IntoResponse, Response},
    Json,
};
use http::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info};

use super::AppState;
use crate::metrics::gather_metrics;
use crate::prompts::{PromptDescriptor, PromptResult};
use crate::tools::{ToolDescriptor, ToolResult};
use crate::Error;

/// Maps crate errors onto HTTP status codes.
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Validation(_)
            | Error::Parse { .. }
            | Error::InvalidMode(_)
            | Error::InvalidMatcher(_)
            | Error::InvalidTimeRange { .. }
            | Error::Pattern { .. }
            | Error::SerdeJson(_) => StatusCode::BAD_REQUEST,
            _ => {
                error!("Request failed: {}", self.0);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

/// Decode an optional JSON body; an empty body decodes from `null`.
fn decode<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    let value: Value = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(body).map_err(|e| Error::Validation(format!("request body is not JSON: {}", e)))?
    };
    serde_json::from_value(value).map_err(|e| ApiError(Error::Validation(e.to_string())))
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

pub async fn list_tools(State(state): State<Arc<AppState>>) -> Json<Vec<ToolDescriptor>> {
    Json(state.registry.descriptors())
}

pub async fn call_tool(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<Json<ToolResult>, ApiError> {
    let input: Value = decode(&body)?;
    info!("Calling tool {}", name);
    let result = state.registry.invoke(&state.services, &name, input).await?;
    Ok(Json(result))
}

pub async fn list_prompts(State(state): State<Arc<AppState>>) -> Json<Vec<PromptDescriptor>> {
    Json(state.prompts.list())
}

pub async fn get_prompt(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<Json<PromptResult>, ApiError> {
    let arguments: Option<HashMap<String, String>> = decode(&body)?;
    let result = state.prompts.get(&name, &arguments.unwrap_or_default())?;
    Ok(Json(result))
}

pub async fn metrics() -> Result<String, ApiError> {
    Ok(gather_metrics()?)
}
